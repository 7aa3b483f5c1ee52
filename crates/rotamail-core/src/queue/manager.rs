//! Queue manager - polls the jobs table and drives the send worker

use crate::dispatch::SendWorker;
use crate::queue::{EnqueueOptions, JobTransport, SendJob};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rotamail_common::config::QueueConfig;
use rotamail_common::{Error, Result};
use rotamail_storage::db::DatabasePool;
use rotamail_storage::models::Job;
use std::sync::Arc;
use tokio::time::{interval, Duration as TokioDuration};
use tracing::{debug, error, info, warn};

const SEND_QUEUE: &str = "send";

/// Postgres-backed job queue.
///
/// Jobs are processed one at a time per poller. Sequential processing is
/// what keeps the rotation pointer honest: concurrent workers on the same
/// campaign would race its read-modify-write document update.
pub struct JobQueue {
    db_pool: DatabasePool,
    config: QueueConfig,
}

impl JobQueue {
    pub fn new(db_pool: DatabasePool, config: QueueConfig) -> Self {
        Self { db_pool, config }
    }

    /// Run the queue processor until the task is aborted
    pub async fn run(&self, worker: Arc<SendWorker>) {
        let mut ticker = interval(TokioDuration::from_secs(self.config.poll_interval_secs));

        info!("Queue processor started");

        loop {
            ticker.tick().await;

            if let Err(e) = self.process_pending_jobs(&worker).await {
                error!("Error processing queue: {}", e);
            }
        }
    }

    /// Fetch due jobs and process them sequentially
    async fn process_pending_jobs(&self, worker: &SendWorker) -> Result<()> {
        let jobs: Vec<Job> = sqlx::query_as(
            r#"
            SELECT * FROM jobs
            WHERE status = 'pending'
            AND queue = $1
            AND scheduled_at <= NOW()
            ORDER BY scheduled_at ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(SEND_QUEUE)
        .bind(self.config.batch_size)
        .fetch_all(self.db_pool.pool())
        .await
        .map_err(|e| Error::Queue(e.to_string()))?;

        for job in jobs {
            self.process_job(worker, job).await;
        }

        Ok(())
    }

    /// Process a single job
    async fn process_job(&self, worker: &SendWorker, job: Job) {
        let job_id = job.id.clone();
        debug!("Processing job {}", job_id);

        if let Err(e) = self.mark_job_started(&job_id).await {
            error!("Failed to mark job {} as started: {}", job_id, e);
            return;
        }

        let send_job: SendJob = match serde_json::from_value(job.payload) {
            Ok(j) => j,
            Err(e) => {
                error!("Failed to parse job {} payload: {}", job_id, e);
                let _ = self.mark_job_failed(&job_id, &e.to_string()).await;
                return;
            }
        };

        match worker.process_send_job(send_job.campaign_id, &send_job.to).await {
            Ok(()) => {
                debug!("Job {} completed", job_id);
                if let Err(e) = self.mark_job_completed(&job_id).await {
                    error!("Failed to mark job {} as completed: {}", job_id, e);
                }
            }
            Err(e) => {
                warn!("Job {} failed: {}", job_id, e);

                let attempts = job.attempts + 1;
                if attempts >= job.max_attempts {
                    error!("Job {} exceeded max attempts, marking as failed", job_id);
                    let _ = self.mark_job_failed(&job_id, &e.to_string()).await;
                } else {
                    let delay = calculate_backoff(attempts);
                    let _ = self
                        .schedule_retry(&job_id, attempts, &e.to_string(), delay)
                        .await;
                }
            }
        }
    }

    async fn mark_job_started(&self, job_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'processing', started_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(self.db_pool.pool())
        .await
        .map_err(|e| Error::Queue(e.to_string()))?;

        Ok(())
    }

    async fn mark_job_completed(&self, job_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'completed', completed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(self.db_pool.pool())
        .await
        .map_err(|e| Error::Queue(e.to_string()))?;

        Ok(())
    }

    async fn mark_job_failed(&self, job_id: &str, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed', last_error = $2, completed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(error)
        .execute(self.db_pool.pool())
        .await
        .map_err(|e| Error::Queue(e.to_string()))?;

        Ok(())
    }

    async fn schedule_retry(
        &self,
        job_id: &str,
        attempts: i32,
        error: &str,
        delay: Duration,
    ) -> Result<()> {
        let scheduled_at = Utc::now() + delay;

        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending',
                attempts = $2,
                last_error = $3,
                scheduled_at = $4
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(attempts)
        .bind(error)
        .bind(scheduled_at)
        .execute(self.db_pool.pool())
        .await
        .map_err(|e| Error::Queue(e.to_string()))?;

        info!(
            "Job {} scheduled for retry at {} (attempt {})",
            job_id,
            scheduled_at,
            attempts + 1
        );

        Ok(())
    }

    /// Get queue statistics
    pub async fn get_stats(&self) -> Result<QueueStats> {
        let pool = self.db_pool.pool();

        let pending: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM jobs WHERE status = 'pending' AND queue = $1")
                .bind(SEND_QUEUE)
                .fetch_one(pool)
                .await
                .map_err(|e| Error::Queue(e.to_string()))?;

        let processing: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM jobs WHERE status = 'processing' AND queue = $1")
                .bind(SEND_QUEUE)
                .fetch_one(pool)
                .await
                .map_err(|e| Error::Queue(e.to_string()))?;

        let failed: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM jobs WHERE status = 'failed' AND queue = $1")
                .bind(SEND_QUEUE)
                .fetch_one(pool)
                .await
                .map_err(|e| Error::Queue(e.to_string()))?;

        Ok(QueueStats {
            pending: pending.0 as u64,
            processing: processing.0 as u64,
            failed: failed.0 as u64,
        })
    }
}

#[async_trait]
impl JobTransport for JobQueue {
    /// Insert a job, dropping duplicates on the idempotency key
    async fn enqueue(&self, job: SendJob, opts: EnqueueOptions) -> Result<()> {
        let scheduled_at = match opts.delay {
            Some(delay) => {
                Utc::now() + Duration::milliseconds(delay.as_millis().min(i64::MAX as u128) as i64)
            }
            None => Utc::now(),
        };

        let payload = serde_json::to_value(&job)
            .map_err(|e| Error::Queue(format!("Failed to encode job payload: {}", e)))?;

        let result = sqlx::query(
            r#"
            INSERT INTO jobs (id, queue, payload, status, attempts, max_attempts, scheduled_at, created_at)
            VALUES ($1, $2, $3, 'pending', 0, $4, $5, NOW())
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&opts.idempotency_key)
        .bind(SEND_QUEUE)
        .bind(&payload)
        .bind(self.config.max_attempts)
        .bind(scheduled_at)
        .execute(self.db_pool.pool())
        .await
        .map_err(|e| Error::Queue(e.to_string()))?;

        if result.rows_affected() == 0 {
            debug!("Job {} already enqueued, skipping", opts.idempotency_key);
        } else {
            debug!("Enqueued job {}", opts.idempotency_key);
        }

        Ok(())
    }
}

/// Exponential backoff for transport-level job failures
fn calculate_backoff(attempts: i32) -> Duration {
    // Base: 1 minute, max: 4 hours
    let minutes = std::cmp::min(2_i64.pow(attempts as u32), 240);
    Duration::minutes(minutes)
}

/// Queue statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_backoff() {
        assert_eq!(calculate_backoff(0), Duration::minutes(1));
        assert_eq!(calculate_backoff(1), Duration::minutes(2));
        assert_eq!(calculate_backoff(2), Duration::minutes(4));
        assert_eq!(calculate_backoff(3), Duration::minutes(8));
        assert_eq!(calculate_backoff(10), Duration::minutes(240));
    }
}

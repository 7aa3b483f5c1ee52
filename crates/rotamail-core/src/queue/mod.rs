//! Job queue - durable, idempotent per-recipient dispatch jobs

pub mod manager;

pub use manager::{JobQueue, QueueStats};

use async_trait::async_trait;
use rotamail_common::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// One unit of dispatch work: a single recipient of a single campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendJob {
    pub campaign_id: Uuid,
    pub to: String,
}

impl SendJob {
    /// Idempotency key for the initial enqueue of this recipient
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.campaign_id, self.to)
    }

    /// Idempotency key for retry pass `retries` of this recipient
    pub fn retry_key(&self, retries: u32) -> String {
        format!("{}:{}:retry:{}", self.campaign_id, self.to, retries)
    }
}

/// Enqueue parameters
#[derive(Debug, Clone)]
pub struct EnqueueOptions {
    /// Duplicate keys are dropped, making re-enqueues harmless
    pub idempotency_key: String,
    pub delay: Option<Duration>,
}

impl EnqueueOptions {
    pub fn immediate(idempotency_key: String) -> Self {
        Self {
            idempotency_key,
            delay: None,
        }
    }

    pub fn delayed(idempotency_key: String, delay: Duration) -> Self {
        Self {
            idempotency_key,
            delay: Some(delay),
        }
    }
}

/// Enqueue seam between producers (API, worker retries) and the queue
#[async_trait]
pub trait JobTransport: Send + Sync {
    async fn enqueue(&self, job: SendJob, opts: EnqueueOptions) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_job_keys() {
        let id = Uuid::new_v4();
        let job = SendJob {
            campaign_id: id,
            to: "a@x.com".to_string(),
        };
        assert_eq!(job.idempotency_key(), format!("{}:a@x.com", id));
        assert_eq!(job.retry_key(2), format!("{}:a@x.com:retry:2", id));
    }
}

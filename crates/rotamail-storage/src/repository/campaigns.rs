//! Campaign store

use crate::db::DatabasePool;
use crate::models::{Campaign, CampaignPatch};
use async_trait::async_trait;
use rotamail_common::{Error, Result};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

/// Campaign store trait
#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn insert(&self, campaign: &Campaign) -> Result<()>;
    async fn load(&self, id: Uuid) -> Result<Option<Campaign>>;
    async fn list(&self) -> Result<Vec<Campaign>>;
    /// Partial update, last-write-wins per present field
    async fn patch(&self, id: Uuid, patch: CampaignPatch) -> Result<()>;
    /// Returns true when a campaign was actually deleted
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// PostgreSQL campaign store
pub struct DbCampaignStore {
    pool: DatabasePool,
}

impl DbCampaignStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn to_json<T: serde::Serialize>(value: &T, what: &str) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| Error::Internal(format!("Failed to encode {}: {}", what, e)))
}

#[async_trait]
impl CampaignStore for DbCampaignStore {
    async fn insert(&self, campaign: &Campaign) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO campaigns (
                id, subject, template, template_data, recipients, accounts,
                pointer, status, total_count, sent_count, failed_count,
                opens, clicks, completed_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(campaign.id)
        .bind(&campaign.subject)
        .bind(&campaign.template)
        .bind(&campaign.template_data)
        .bind(to_json(&campaign.recipients, "recipients")?)
        .bind(to_json(&campaign.accounts, "account snapshot")?)
        .bind(campaign.pointer)
        .bind(&campaign.status)
        .bind(campaign.total_count)
        .bind(campaign.sent_count)
        .bind(campaign.failed_count)
        .bind(campaign.opens)
        .bind(campaign.clicks)
        .bind(campaign.completed_at)
        .bind(campaign.created_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list(&self) -> Result<Vec<Campaign>> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns ORDER BY created_at ASC")
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn patch(&self, id: Uuid, patch: CampaignPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE campaigns SET ");
        let mut fields = qb.separated(", ");

        if let Some(recipients) = &patch.recipients {
            let value = to_json(recipients, "recipients")?;
            fields.push("recipients = ").push_bind_unseparated(value);
        }
        if let Some(accounts) = &patch.accounts {
            let value = to_json(accounts, "account snapshot")?;
            fields.push("accounts = ").push_bind_unseparated(value);
        }
        if let Some(pointer) = patch.pointer {
            fields.push("pointer = ").push_bind_unseparated(pointer);
        }
        if let Some(status) = &patch.status {
            fields.push("status = ").push_bind_unseparated(status.clone());
        }
        if let Some(sent_count) = patch.sent_count {
            fields.push("sent_count = ").push_bind_unseparated(sent_count);
        }
        if let Some(failed_count) = patch.failed_count {
            fields
                .push("failed_count = ")
                .push_bind_unseparated(failed_count);
        }
        if let Some(opens) = patch.opens {
            fields.push("opens = ").push_bind_unseparated(opens);
        }
        if let Some(clicks) = patch.clicks {
            fields.push("clicks = ").push_bind_unseparated(clicks);
        }
        if let Some(completed_at) = patch.completed_at {
            // set-once: never clobber an existing completion timestamp
            fields
                .push("completed_at = COALESCE(completed_at, ")
                .push_bind_unseparated(completed_at)
                .push_unseparated(")");
        }

        qb.push(" WHERE id = ").push_bind(id);

        qb.build()
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM campaigns WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

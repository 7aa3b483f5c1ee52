//! Account store

use crate::db::DatabasePool;
use crate::models::{Account, AccountPatch};
use async_trait::async_trait;
use rotamail_common::{Error, Result};
use sqlx::{Postgres, QueryBuilder};

/// Account store trait
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn insert(&self, account: &Account) -> Result<Account>;
    async fn load_all(&self) -> Result<Vec<Account>>;
    async fn find(&self, email: &str) -> Result<Option<Account>>;
    /// Partial update, last-write-wins per present field.
    /// Returns the updated account, or None when the email is unknown.
    async fn patch(&self, email: &str, patch: AccountPatch) -> Result<Option<Account>>;
}

/// PostgreSQL account store
pub struct DbAccountStore {
    pool: DatabasePool,
}

impl DbAccountStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for DbAccountStore {
    async fn insert(&self, account: &Account) -> Result<Account> {
        let credential = serde_json::to_value(&account.credential)
            .map_err(|e| Error::Internal(format!("Failed to encode credential: {}", e)))?;

        sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (email, host, port, secure, credential, max_per_cycle, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&account.email)
        .bind(&account.host)
        .bind(account.port)
        .bind(account.secure)
        .bind(&credential)
        .bind(account.max_per_cycle)
        .bind(account.created_at)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn load_all(&self) -> Result<Vec<Account>> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts ORDER BY created_at ASC")
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn find(&self, email: &str) -> Result<Option<Account>> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE email = $1")
            .bind(email)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn patch(&self, email: &str, patch: AccountPatch) -> Result<Option<Account>> {
        if patch.is_empty() {
            return self.find(email).await;
        }

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE accounts SET ");
        let mut fields = qb.separated(", ");

        if let Some(host) = &patch.host {
            fields.push("host = ").push_bind_unseparated(host.clone());
        }
        if let Some(port) = patch.port {
            fields.push("port = ").push_bind_unseparated(port);
        }
        if let Some(secure) = patch.secure {
            fields.push("secure = ").push_bind_unseparated(secure);
        }
        if let Some(credential) = &patch.credential {
            let value = serde_json::to_value(credential)
                .map_err(|e| Error::Internal(format!("Failed to encode credential: {}", e)))?;
            fields.push("credential = ").push_bind_unseparated(value);
        }
        if let Some(max_per_cycle) = patch.max_per_cycle {
            fields
                .push("max_per_cycle = ")
                .push_bind_unseparated(max_per_cycle);
        }

        qb.push(" WHERE email = ").push_bind(email.to_string());
        qb.push(" RETURNING *");

        qb.build_query_as::<Account>()
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}

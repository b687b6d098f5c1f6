//! Postgres key-value backend
//!
//! Both namespaces live in one `kv_entries` table keyed by
//! `(namespace, key)`; values are stored as serialized JSON text.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;
use tracing::warn;

use super::{Entries, KeyValueStore, StoreError, StoreResult};

/// Database connection pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {}", e)))?;
        Ok(())
    }

    /// A namespace view over this database
    pub fn namespace(&self, namespace: &'static str) -> PgStore {
        PgStore {
            pool: self.pool.clone(),
            namespace,
        }
    }
}

/// One namespace of the `kv_entries` table
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    namespace: &'static str,
}

fn parse_rows(namespace: &str, rows: Vec<sqlx::postgres::PgRow>) -> Entries {
    let mut entries = Entries::new();
    for row in rows {
        let key: String = row.get("key");
        let raw: String = row.get("value");
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => {
                entries.insert(key, value);
            }
            Err(e) => warn!("{}: skipping unreadable value for {}: {}", namespace, key, e),
        }
    }
    entries
}

#[async_trait]
impl KeyValueStore for PgStore {
    fn name(&self) -> &'static str {
        self.namespace
    }

    async fn get_all(&self) -> StoreResult<Entries> {
        let rows = sqlx::query("SELECT key, value FROM kv_entries WHERE namespace = $1")
            .bind(self.namespace)
            .fetch_all(&self.pool)
            .await?;

        Ok(parse_rows(self.namespace, rows))
    }

    async fn get(&self, keys: &[String]) -> StoreResult<Entries> {
        let rows = sqlx::query(
            "SELECT key, value FROM kv_entries WHERE namespace = $1 AND key = ANY($2)",
        )
        .bind(self.namespace)
        .bind(keys)
        .fetch_all(&self.pool)
        .await?;

        Ok(parse_rows(self.namespace, rows))
    }

    async fn set(&self, entries: Entries) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        for (key, value) in &entries {
            sqlx::query(
                r#"
                INSERT INTO kv_entries (namespace, key, value, updated_at)
                VALUES ($1, $2, $3, CURRENT_TIMESTAMP)
                ON CONFLICT (namespace, key) DO UPDATE SET
                    value = EXCLUDED.value,
                    updated_at = CURRENT_TIMESTAMP
                "#,
            )
            .bind(self.namespace)
            .bind(key)
            .bind(serde_json::to_string(value)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> StoreResult<()> {
        sqlx::query("DELETE FROM kv_entries WHERE namespace = $1 AND key = ANY($2)")
            .bind(self.namespace)
            .bind(keys)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear(&self) -> StoreResult<()> {
        sqlx::query("DELETE FROM kv_entries WHERE namespace = $1")
            .bind(self.namespace)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("health check failed: {}", e)))?;
        Ok(())
    }
}

//! Key-value persistence
//!
//! Two namespaces share one async key-value interface: `sync`, which holds
//! series data and settings under a per-item and total byte quota, and
//! `local`, which holds the availability cache. Backends are an in-memory
//! map and a Postgres table keyed by namespace.

pub mod episodes;
pub mod layout;
pub mod memory;
pub mod postgres;

pub use episodes::{EpisodeStore, RemoveOutcome, UpsertOutcome};
pub use layout::{locate, LayoutHandle};
pub use memory::{MemoryStore, Quota};
pub use postgres::{Database, PgStore};

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Key to JSON value mapping, as read from or written to a namespace
pub type Entries = Map<String, Value>;

/// Storage-related errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Failed to serialize value: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Async key-value namespace
///
/// Every `set` and `remove` batch is applied as a unit: either all entries
/// land or none do.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Short identifier used in logs and health output
    fn name(&self) -> &'static str;

    /// Every entry in the namespace
    async fn get_all(&self) -> StoreResult<Entries>;

    /// Entries for the given keys; missing keys are left out
    async fn get(&self, keys: &[String]) -> StoreResult<Entries>;

    /// Insert or overwrite a batch of entries
    async fn set(&self, entries: Entries) -> StoreResult<()>;

    /// Delete a batch of keys; unknown keys are ignored
    async fn remove(&self, keys: &[String]) -> StoreResult<()>;

    /// Delete every entry in the namespace
    async fn clear(&self) -> StoreResult<()>;

    /// Check the backend is reachable
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Value for a single key
    async fn get_value(&self, key: &str) -> StoreResult<Option<Value>> {
        let mut entries = self.get(&[key.to_string()]).await?;
        Ok(entries.remove(key))
    }

    /// Insert or overwrite a single entry
    async fn set_value(&self, key: &str, value: Value) -> StoreResult<()> {
        let mut entries = Entries::new();
        entries.insert(key.to_string(), value);
        self.set(entries).await
    }
}

//! In-memory key-value backend

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::warn;

use super::{Entries, KeyValueStore, StoreError, StoreResult};
use crate::constants::{SYNC_QUOTA_BYTES, SYNC_QUOTA_BYTES_PER_ITEM};

/// Byte limits enforced on writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    /// Maximum size of one item, key plus serialized value
    pub per_item: usize,
    /// Maximum size of the whole namespace
    pub total: usize,
}

impl Quota {
    /// Limits of the synced namespace
    pub fn sync() -> Self {
        Self {
            per_item: SYNC_QUOTA_BYTES_PER_ITEM,
            total: SYNC_QUOTA_BYTES,
        }
    }
}

/// Serialized size of one item as counted against a quota
pub fn item_size(key: &str, value: &Value) -> usize {
    key.len() + value.to_string().len()
}

/// Map-backed namespace, optionally quota-limited
pub struct MemoryStore {
    name: &'static str,
    entries: RwLock<Entries>,
    quota: Option<Quota>,
    writes: AtomicUsize,
}

impl MemoryStore {
    /// Unlimited namespace
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: RwLock::new(Entries::new()),
            quota: None,
            writes: AtomicUsize::new(0),
        }
    }

    /// Namespace that rejects writes beyond `quota`
    pub fn with_quota(name: &'static str, quota: Quota) -> Self {
        Self {
            quota: Some(quota),
            ..Self::new(name)
        }
    }

    /// Namespace pre-populated with `entries`, bypassing the quota
    pub fn seeded(name: &'static str, entries: Entries) -> Self {
        Self {
            entries: RwLock::new(entries),
            ..Self::new(name)
        }
    }

    /// Number of successful `set` batches so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_quota(&self, current: &Entries, incoming: &Entries) -> StoreResult<()> {
        let Some(quota) = self.quota else {
            return Ok(());
        };

        for (key, value) in incoming {
            let size = item_size(key, value);
            if size > quota.per_item {
                warn!(
                    "{}: item {} is {} bytes, over the {} byte limit",
                    self.name, key, size, quota.per_item
                );
                return Err(StoreError::QuotaExceeded(format!(
                    "item {} is {} bytes (limit {})",
                    key, size, quota.per_item
                )));
            }
        }

        let total: usize = current
            .iter()
            .filter(|(key, _)| !incoming.contains_key(*key))
            .chain(incoming.iter())
            .map(|(key, value)| item_size(key, value))
            .sum();
        if total > quota.total {
            warn!("{}: namespace would grow to {} bytes", self.name, total);
            return Err(StoreError::QuotaExceeded(format!(
                "namespace would be {} bytes (limit {})",
                total, quota.total
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn get_all(&self) -> StoreResult<Entries> {
        Ok(self.entries.read().await.clone())
    }

    async fn get(&self, keys: &[String]) -> StoreResult<Entries> {
        let entries = self.entries.read().await;
        Ok(keys
            .iter()
            .filter_map(|key| entries.get(key).map(|v| (key.clone(), v.clone())))
            .collect())
    }

    async fn set(&self, incoming: Entries) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        self.check_quota(&entries, &incoming)?;
        entries.extend(incoming);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn clear(&self) -> StoreResult<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries(pairs: &[(&str, Value)]) -> Entries {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = MemoryStore::new("test");
        store
            .set(entries(&[("a", json!(1)), ("b", json!({"x": true}))]))
            .await
            .unwrap();

        let got = store.get(&["a".into(), "missing".into()]).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got["a"], json!(1));

        store.remove(&["a".into()]).await.unwrap();
        assert_eq!(store.get_value("a").await.unwrap(), None);
        assert_eq!(store.get_value("b").await.unwrap(), Some(json!({"x": true})));
        assert_eq!(store.write_count(), 1);

        store.clear().await.unwrap();
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_per_item_quota_rejects_whole_batch() {
        let store = MemoryStore::with_quota("sync", Quota { per_item: 32, total: 1024 });
        let big = "x".repeat(64);

        let result = store
            .set(entries(&[("small", json!(1)), ("big", json!(big))]))
            .await;
        assert!(matches!(result, Err(StoreError::QuotaExceeded(_))));
        // Nothing from the rejected batch landed
        assert!(store.get_all().await.unwrap().is_empty());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_total_quota_counts_overwrites_once() {
        let store = MemoryStore::with_quota("sync", Quota { per_item: 100, total: 60 });
        let value = json!("y".repeat(20));

        store.set(entries(&[("k1", value.clone())])).await.unwrap();
        // Overwriting the same key does not double count it
        store.set(entries(&[("k1", value.clone())])).await.unwrap();
        store.set(entries(&[("k2", value.clone())])).await.unwrap();

        let result = store.set(entries(&[("k3", value)])).await;
        assert!(matches!(result, Err(StoreError::QuotaExceeded(_))));
    }

    #[test]
    fn test_item_size_includes_key() {
        assert_eq!(item_size("ab", &json!("cd")), 2 + 4);
    }
}

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{RecordStore, StoreResult};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Default)]
struct Inner {
    values: HashMap<String, Entry>,
    sets: HashMap<String, BTreeSet<String>>,
}

/// Process-local store for development and tests. Same semantics as the
/// Redis backend, including expiry of locks and processed-event markers.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let inner = self.inner.read().await;
        let now = Instant::now();
        Ok(inner
            .values
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.values.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.values.remove(key);
        inner.sets.remove(key);
        Ok(())
    }

    async fn compare_and_set(&self, key: &str, expected: &str, value: &str) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let now = Instant::now();
        match inner.values.get_mut(key) {
            Some(entry) if entry.is_live(now) && entry.value == expected => {
                entry.value = value.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let now = Instant::now();
        if inner.values.get(key).map_or(false, |entry| entry.is_live(now)) {
            return Ok(false);
        }
        inner.values.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl_secs.map(|ttl| now + Duration::from_secs(ttl)),
            },
        );
        Ok(true)
    }

    async fn set_add(&self, set: &str, member: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.sets.entry(set.to_string()).or_default().insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, set: &str, member: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(members) = inner.sets.get_mut(set) {
            members.remove(member);
        }
        Ok(())
    }

    async fn set_members(&self, set: &str) -> StoreResult<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .sets
            .get(set)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn acquire_lock(&self, key: &str, token: &str, ttl_ms: u64) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let now = Instant::now();
        if inner.values.get(key).map_or(false, |entry| entry.is_live(now)) {
            return Ok(false);
        }
        inner.values.insert(
            key.to_string(),
            Entry {
                value: token.to_string(),
                expires_at: Some(now + Duration::from_millis(ttl_ms)),
            },
        );
        Ok(true)
    }

    async fn release_lock(&self, key: &str, token: &str) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let owned = inner.values.get(key).map_or(false, |entry| entry.value == token);
        if owned {
            inner.values.remove(key);
        }
        Ok(owned)
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_compare_and_set_detects_concurrent_write() {
        let store = MemoryStore::new();
        store.set("k", "v1").await.unwrap();

        assert!(store.compare_and_set("k", "v1", "v2").await.unwrap());
        // a second writer still holding "v1" loses
        assert!(!store.compare_and_set("k", "v1", "v3").await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_and_token_checked() {
        let store = MemoryStore::new();
        assert!(store.acquire_lock("lock", "a", 5_000).await.unwrap());
        assert!(!store.acquire_lock("lock", "b", 5_000).await.unwrap());
        assert!(!store.release_lock("lock", "b").await.unwrap());
        assert!(store.release_lock("lock", "a").await.unwrap());
        assert!(store.acquire_lock("lock", "b", 5_000).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_if_absent_only_once() {
        let store = MemoryStore::new();
        assert!(store.set_if_absent("evt_1", "1", Some(60)).await.unwrap());
        assert!(!store.set_if_absent("evt_1", "1", Some(60)).await.unwrap());
    }

    #[tokio::test]
    async fn test_sets() {
        let store = MemoryStore::new();
        store.set_add("s", "a").await.unwrap();
        store.set_add("s", "b").await.unwrap();
        store.set_add("s", "a").await.unwrap();
        store.set_remove("s", "b").await.unwrap();
        assert_eq!(store.set_members("s").await.unwrap(), vec!["a".to_string()]);
        assert!(store.set_members("missing").await.unwrap().is_empty());
    }
}

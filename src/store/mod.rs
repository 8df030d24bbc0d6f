//! Record store
//!
//! Key/value persistence for cars, bookings, promos and the payment-intent
//! cross-reference. Values are JSON documents; secondary indexes are sets.
//! There are no cross-key transactions: callers get per-key compare-and-set
//! and short-lived named locks instead.

pub mod keys;
pub mod memory_store;
pub mod redis_store;

pub use memory_store::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Operations every backend must provide
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Write `value` only if the stored value is still exactly `expected`.
    /// Returns `false` when another writer got there first.
    async fn compare_and_set(&self, key: &str, expected: &str, value: &str) -> StoreResult<bool>;

    /// Write `value` only if `key` does not exist. Returns `true` when written.
    async fn set_if_absent(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> StoreResult<bool>;

    async fn set_add(&self, set: &str, member: &str) -> StoreResult<()>;

    async fn set_remove(&self, set: &str, member: &str) -> StoreResult<()>;

    async fn set_members(&self, set: &str) -> StoreResult<Vec<String>>;

    /// Take a named lock held by `token` for at most `ttl_ms`.
    async fn acquire_lock(&self, key: &str, token: &str, ttl_ms: u64) -> StoreResult<bool>;

    /// Release a lock, but only if `token` still owns it.
    async fn release_lock(&self, key: &str, token: &str) -> StoreResult<bool>;

    async fn ping(&self) -> bool;
}

/// A decoded record together with the exact bytes it was read from, so a
/// later write can be made conditional on nobody having changed it since.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub record: T,
    pub raw: String,
}

pub async fn get_json<T: DeserializeOwned>(store: &dyn RecordStore, key: &str) -> StoreResult<Option<T>> {
    Ok(get_snapshot(store, key).await?.map(|snapshot| snapshot.record))
}

pub async fn get_snapshot<T: DeserializeOwned>(store: &dyn RecordStore, key: &str) -> StoreResult<Option<Snapshot<T>>> {
    match store.get(key).await? {
        Some(raw) => {
            let record = serde_json::from_str(&raw)?;
            Ok(Some(Snapshot { record, raw }))
        }
        None => Ok(None),
    }
}

pub async fn set_json<T: Serialize + Sync>(store: &dyn RecordStore, key: &str, value: &T) -> StoreResult<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw).await
}

/// Conditional write of `value` over `previous`; `Ok(false)` on a lost race.
pub async fn replace_json<T: Serialize + Sync>(
    store: &dyn RecordStore,
    key: &str,
    previous: &str,
    value: &T,
) -> StoreResult<bool> {
    let raw = serde_json::to_string(value)?;
    store.compare_and_set(key, previous, &raw).await
}

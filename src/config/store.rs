//! Record store configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub redis_url: String,
    pub key_prefix: String,
    /// Upper bound on how long a per-car booking lock may be held
    pub booking_lock_ttl_ms: u64,
    /// How long processed webhook event ids are remembered
    pub processed_event_ttl_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "rental".to_string(),
            booking_lock_ttl_ms: 5_000,
            processed_event_ttl_secs: 7 * 24 * 3600, // 7 días
        }
    }
}

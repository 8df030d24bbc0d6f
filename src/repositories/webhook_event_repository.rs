use std::sync::Arc;

use chrono::Utc;

use crate::store::{keys, RecordStore};
use crate::utils::errors::AppResult;

/// Processed-event markers (with TTL) and the failed-event set
#[derive(Clone)]
pub struct WebhookEventRepository {
    store: Arc<dyn RecordStore>,
    processed_ttl_secs: u64,
}

impl WebhookEventRepository {
    pub fn new(store: Arc<dyn RecordStore>, processed_ttl_secs: u64) -> Self {
        Self {
            store,
            processed_ttl_secs,
        }
    }

    /// `true` the first time an event id is seen
    pub async fn mark_processed(&self, event_id: &str) -> AppResult<bool> {
        Ok(self
            .store
            .set_if_absent(
                &keys::webhook_event(event_id),
                &Utc::now().to_rfc3339(),
                Some(self.processed_ttl_secs),
            )
            .await?)
    }

    /// Drop the marker so a later delivery of the same event is applied
    pub async fn forget(&self, event_id: &str) -> AppResult<()> {
        self.store.delete(&keys::webhook_event(event_id)).await?;
        Ok(())
    }

    pub async fn flag_failed(&self, event_id: &str) -> AppResult<()> {
        self.store.set_add(keys::FAILED_WEBHOOK_EVENTS, event_id).await?;
        Ok(())
    }

    pub async fn failed_events(&self) -> AppResult<Vec<String>> {
        Ok(self.store.set_members(keys::FAILED_WEBHOOK_EVENTS).await?)
    }
}

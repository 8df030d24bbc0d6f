use std::sync::Arc;

use chrono::Utc;

use crate::models::payment_intent::{IntentPurpose, PaymentIntentLink};
use crate::store::{get_json, keys, set_json, RecordStore};
use crate::utils::errors::AppResult;

/// Intent id → booking cross-reference used by the webhook reconciler
#[derive(Clone)]
pub struct PaymentIntentRepository {
    store: Arc<dyn RecordStore>,
}

impl PaymentIntentRepository {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn link(&self, payment_intent_id: &str, booking_id: &str, purpose: IntentPurpose) -> AppResult<()> {
        let link = PaymentIntentLink {
            payment_intent_id: payment_intent_id.to_string(),
            booking_id: booking_id.to_string(),
            purpose,
            created_at: Utc::now(),
        };
        set_json(self.store.as_ref(), &keys::payment_intent(payment_intent_id), &link).await?;
        Ok(())
    }

    pub async fn find(&self, payment_intent_id: &str) -> AppResult<Option<PaymentIntentLink>> {
        Ok(get_json(self.store.as_ref(), &keys::payment_intent(payment_intent_id)).await?)
    }
}

//! Payment-intent cross-reference
//!
//! Webhook events are keyed by the processor's intent id; this record points
//! an intent back at the booking (and the ledger slot) it belongs to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntentPurpose {
    Deposit,
    FinalPayment,
    AdditionalPayment {
        #[serde(rename = "paymentId")]
        payment_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentLink {
    pub payment_intent_id: String,
    pub booking_id: String,
    pub purpose: IntentPurpose,
    pub created_at: DateTime<Utc>,
}

//! Webhook reconciliation
//!
//! Applies processor events to bookings. Events are matched to bookings
//! through the payment-intent cross-reference, deduplicated by event id, and
//! every transition goes through the same guards as admin actions, so a
//! replayed or reordered event cannot move a booking twice.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::clients::from_minor_units;
use crate::models::booking::{
    Actor, Booking, BookingStatus, DepositStatus, PaymentStatus, TransitionCheck,
};
use crate::models::payment_intent::{IntentPurpose, PaymentIntentLink};
use crate::repositories::{BookingRepository, PaymentIntentRepository, WebhookEventRepository};
use crate::utils::errors::{AppError, AppResult};
use crate::utils::signature::WebhookVerifier;

pub const PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const AMOUNT_CAPTURABLE_UPDATED: &str = "payment_intent.amount_capturable_updated";
pub const PAYMENT_FAILED: &str = "payment_intent.payment_failed";
pub const REQUIRES_ACTION: &str = "payment_intent.requires_action";
pub const CANCELED: &str = "payment_intent.canceled";

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: IntentObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntentObject {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub amount_received: Option<i64>,
    #[serde(default)]
    pub last_payment_error: Option<LastPaymentError>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LastPaymentError {
    pub message: Option<String>,
}

/// How an accepted event was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookDisposition {
    Applied,
    Unchanged,
    Duplicate,
    Ignored,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub disposition: WebhookDisposition,
}

#[derive(Clone)]
pub struct WebhookService {
    verifier: WebhookVerifier,
    bookings: BookingRepository,
    intents: PaymentIntentRepository,
    events: WebhookEventRepository,
}

impl WebhookService {
    pub fn new(
        verifier: WebhookVerifier,
        bookings: BookingRepository,
        intents: PaymentIntentRepository,
        events: WebhookEventRepository,
    ) -> Self {
        Self {
            verifier,
            bookings,
            intents,
            events,
        }
    }

    /// Verify, deduplicate and apply one delivery. Only a bad signature or an
    /// unreadable body is an error; anything that goes wrong while applying
    /// the event is logged, flagged and still acknowledged.
    pub async fn handle(&self, payload: &[u8], signature: Option<&str>) -> AppResult<WebhookAck> {
        let signature =
            signature.ok_or_else(|| AppError::BadRequest("missing webhook signature".to_string()))?;
        self.verifier.verify(payload, signature).map_err(|e| {
            warn!("⚠️ Rejected webhook: {}", e);
            AppError::BadRequest(format!("invalid webhook signature: {}", e))
        })?;

        let event: WebhookEvent = serde_json::from_slice(payload)
            .map_err(|e| AppError::BadRequest(format!("malformed webhook payload: {}", e)))?;

        debug!("📥 Webhook {} ({}) for {}", event.id, event.event_type, event.data.object.id);

        if !self.events.mark_processed(&event.id).await? {
            info!("♻️ Webhook {} already processed", event.id);
            return Ok(ack(WebhookDisposition::Duplicate));
        }

        match self.apply(&event).await {
            Ok(Some(disposition)) => Ok(ack(disposition)),
            Ok(None) => {
                // nothing to apply it to yet, a redelivery gets another chance
                if let Err(e) = self.events.forget(&event.id).await {
                    error!("❌ Could not clear marker for webhook {}: {}", event.id, e);
                }
                Ok(ack(WebhookDisposition::Ignored))
            }
            Err(e) => {
                error!("❌ Webhook {} ({}) failed: {}", event.id, event.event_type, e);
                if let Err(flag_error) = self.events.flag_failed(&event.id).await {
                    error!("❌ Could not flag webhook {}: {}", event.id, flag_error);
                }
                Ok(ack(WebhookDisposition::Failed))
            }
        }
    }

    /// `Ok(None)` when no booking could be matched to the intent
    async fn apply(&self, event: &WebhookEvent) -> AppResult<Option<WebhookDisposition>> {
        let intent = &event.data.object;

        let handled = matches!(
            event.event_type.as_str(),
            PAYMENT_SUCCEEDED | AMOUNT_CAPTURABLE_UPDATED | PAYMENT_FAILED | REQUIRES_ACTION | CANCELED
        );
        if !handled {
            debug!("Ignoring webhook type {}", event.event_type);
            return Ok(Some(WebhookDisposition::Ignored));
        }

        let Some(link) = self.resolve_link(intent).await? else {
            warn!(
                "⚠️ No booking for payment intent {} ({}), dropping",
                intent.id, event.event_type
            );
            return Ok(None);
        };

        if event.event_type == REQUIRES_ACTION {
            info!(
                "🔔 Payment intent {} for booking {} requires customer action",
                intent.id, link.booking_id
            );
            return Ok(Some(WebhookDisposition::Unchanged));
        }

        let before = self.bookings.get(&link.booking_id).await?;
        let after = self
            .bookings
            .update(&link.booking_id, |b| Ok(reconcile(b, &event.event_type, intent, &link)))
            .await?;

        if after == before {
            Ok(Some(WebhookDisposition::Unchanged))
        } else {
            if after.status != before.status {
                info!(
                    "➡️ Booking {} {} → {} ({})",
                    after.id, before.status, after.status, event.event_type
                );
            }
            Ok(Some(WebhookDisposition::Applied))
        }
    }

    /// The stored cross-reference, or one rebuilt from the intent's metadata
    /// when the event beat the code that stores it
    async fn resolve_link(&self, intent: &IntentObject) -> AppResult<Option<PaymentIntentLink>> {
        if let Some(link) = self.intents.find(&intent.id).await? {
            return Ok(Some(link));
        }

        let Some((booking_id, purpose)) = link_from_metadata(&intent.metadata) else {
            return Ok(None);
        };
        if self.bookings.find_by_id(&booking_id).await?.is_none() {
            return Ok(None);
        }

        info!("🔗 Payment intent {} matched to booking {} by metadata", intent.id, booking_id);
        self.intents.link(&intent.id, &booking_id, purpose.clone()).await?;
        Ok(Some(PaymentIntentLink {
            payment_intent_id: intent.id.clone(),
            booking_id,
            purpose,
            created_at: Utc::now(),
        }))
    }

    /// Events that could not be applied, sorted by id
    pub async fn failed_events(&self) -> AppResult<Vec<String>> {
        let mut events = self.events.failed_events().await?;
        events.sort();
        Ok(events)
    }
}

fn link_from_metadata(metadata: &HashMap<String, String>) -> Option<(String, IntentPurpose)> {
    let booking_id = metadata.get("booking_id")?.clone();
    let purpose = match metadata.get("purpose").map(String::as_str) {
        Some("deposit") => IntentPurpose::Deposit,
        Some("final_payment") => IntentPurpose::FinalPayment,
        Some("additional_payment") => IntentPurpose::AdditionalPayment {
            payment_id: metadata.get("payment_id")?.clone(),
        },
        _ => return None,
    };
    Some((booking_id, purpose))
}

fn ack(disposition: WebhookDisposition) -> WebhookAck {
    WebhookAck {
        received: true,
        disposition,
    }
}

/// Apply one event to a booking. Returns whether anything changed.
fn reconcile(
    booking: &mut Booking,
    event_type: &str,
    intent: &IntentObject,
    link: &PaymentIntentLink,
) -> bool {
    match &link.purpose {
        IntentPurpose::Deposit => reconcile_deposit(booking, event_type, intent),
        IntentPurpose::FinalPayment => reconcile_final(booking, event_type, intent),
        IntentPurpose::AdditionalPayment { payment_id } => {
            reconcile_additional(booking, event_type, intent, payment_id)
        }
    }
}

fn reconcile_deposit(booking: &mut Booking, event_type: &str, intent: &IntentObject) -> bool {
    let actor = Actor::stripe_webhook();

    // a replaced hold no longer speaks for the booking
    if let Some(current) = &booking.payment.deposit_payment_intent_id {
        if current != &intent.id {
            warn!(
                "⚠️ Event {} for superseded deposit intent {} on booking {}",
                event_type, intent.id, booking.id
            );
            return false;
        }
    }

    match event_type {
        PAYMENT_SUCCEEDED | AMOUNT_CAPTURABLE_UPDATED => {
            let mut changed = false;
            let settled = matches!(
                booking.payment.deposit_status,
                Some(DepositStatus::Authorized) | Some(DepositStatus::Captured) | Some(DepositStatus::Released)
            );
            if !settled {
                booking.payment.deposit_payment_intent_id = Some(intent.id.clone());
                booking.payment.deposit_status = Some(DepositStatus::Authorized);
                booking.record(
                    "deposit_authorized",
                    "Deposit hold authorized",
                    &actor,
                    json!({ "paymentIntentId": intent.id }),
                );
                changed = true;
            }
            match booking.transition_to(BookingStatus::Confirmed, &actor, "Deposit authorized") {
                TransitionCheck::Allowed => changed = true,
                TransitionCheck::AlreadyInTarget => {}
                TransitionCheck::Rejected => {
                    if booking.status == BookingStatus::Cancelled {
                        warn!("⚠️ Deposit authorized on cancelled booking {}, hold needs release", booking.id);
                    }
                }
            }
            changed
        }
        PAYMENT_FAILED => {
            if booking.payment.deposit_status == Some(DepositStatus::Failed) {
                return false;
            }
            let message = failure_message(intent);
            booking.payment.deposit_status = Some(DepositStatus::Failed);
            booking.record(
                "deposit_failed",
                format!("Deposit authorization failed: {}", message),
                &actor,
                json!({ "paymentIntentId": intent.id }),
            );
            booking.cancel(&actor, "deposit authorization failed", None);
            true
        }
        CANCELED => {
            // releases we started ourselves already updated the booking
            if booking.payment.deposit_status == Some(DepositStatus::Released) {
                return false;
            }
            booking.payment.deposit_status = Some(DepositStatus::Released);
            booking.record(
                "deposit_canceled",
                "Deposit hold canceled by the processor",
                &actor,
                json!({ "paymentIntentId": intent.id }),
            );
            booking.cancel(&actor, "deposit hold canceled", None);
            true
        }
        _ => false,
    }
}

fn reconcile_final(booking: &mut Booking, event_type: &str, intent: &IntentObject) -> bool {
    let actor = Actor::stripe_webhook();

    match event_type {
        PAYMENT_SUCCEEDED => {
            if booking.payment.final_payment_status == Some(PaymentStatus::Succeeded) {
                return false;
            }
            if let Some(received) = intent.amount_received.filter(|cents| *cents > 0) {
                booking.payment.final_payment_amount = Some(from_minor_units(received));
            }
            booking.payment.final_payment_intent_id = Some(intent.id.clone());
            booking.payment.final_payment_status = Some(PaymentStatus::Succeeded);
            booking.record(
                "final_payment_succeeded",
                "Final payment succeeded",
                &actor,
                json!({ "paymentIntentId": intent.id }),
            );
            booking.transition_to(BookingStatus::Completed, &actor, "Final payment collected");
            booking.recompute_totals();
            true
        }
        PAYMENT_FAILED | CANCELED => {
            if matches!(
                booking.payment.final_payment_status,
                Some(PaymentStatus::Failed) | Some(PaymentStatus::Succeeded)
            ) {
                return false;
            }
            // the rental has usually happened already, status stays put
            booking.payment.final_payment_status = Some(PaymentStatus::Failed);
            booking.record(
                "final_payment_failed",
                format!("Final payment failed: {}", failure_message(intent)),
                &actor,
                json!({ "paymentIntentId": intent.id }),
            );
            true
        }
        _ => false,
    }
}

fn reconcile_additional(
    booking: &mut Booking,
    event_type: &str,
    intent: &IntentObject,
    payment_id: &str,
) -> bool {
    let actor = Actor::stripe_webhook();
    let message = failure_message(intent);
    let booking_id = booking.id.clone();

    let Some(payment) = booking.find_additional_payment_mut(payment_id) else {
        warn!("⚠️ Booking {} has no additional payment {}", booking_id, payment_id);
        return false;
    };

    let next = match event_type {
        PAYMENT_SUCCEEDED => PaymentStatus::Succeeded,
        PAYMENT_FAILED | CANCELED => PaymentStatus::Failed,
        _ => return false,
    };
    if payment.status == next || payment.status == PaymentStatus::Succeeded {
        return false;
    }

    payment.status = next;
    payment.payment_intent_id = Some(intent.id.clone());
    payment.failure_message = (next == PaymentStatus::Failed).then(|| message.clone());
    payment.updated_at = Utc::now();

    booking.recompute_totals();
    let action = if next == PaymentStatus::Succeeded {
        "additional_payment_succeeded"
    } else {
        "additional_payment_failed"
    };
    booking.record(
        action,
        format!("Additional payment {}", action.trim_start_matches("additional_payment_")),
        &actor,
        json!({ "paymentId": payment_id, "paymentIntentId": intent.id }),
    );
    true
}

fn failure_message(intent: &IntentObject) -> String {
    intent
        .last_payment_error
        .as_ref()
        .and_then(|e| e.message.clone())
        .unwrap_or_else(|| "no reason given".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::booking::{CustomerSnapshot, DateRange};
    use crate::services::pricing_service;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn booking() -> Booking {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2030, 8, 1).unwrap(),
            NaiveDate::from_ymd_opt(2030, 8, 4).unwrap(),
        );
        let customer = CustomerSnapshot {
            name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
            phone: "+15555550100".into(),
            license_number: "D1234567".into(),
        };
        let mut booking = Booking::new("car-1", customer, range, pricing_service::quote(Decimal::from(450), &range));
        booking.payment.deposit_payment_intent_id = Some("pi_dep".into());
        booking.payment.deposit_status = Some(DepositStatus::Pending);
        booking
    }

    fn intent(id: &str) -> IntentObject {
        IntentObject {
            id: id.into(),
            status: None,
            amount: None,
            amount_received: None,
            last_payment_error: None,
            metadata: HashMap::new(),
        }
    }

    fn link(purpose: IntentPurpose) -> PaymentIntentLink {
        PaymentIntentLink {
            payment_intent_id: "pi_dep".into(),
            booking_id: "b".into(),
            purpose,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_deposit_success_confirms_once() {
        let mut b = booking();
        let deposit = link(IntentPurpose::Deposit);

        assert!(reconcile(&mut b, PAYMENT_SUCCEEDED, &intent("pi_dep"), &deposit));
        assert_eq!(b.status, BookingStatus::Confirmed);
        assert_eq!(b.payment.deposit_status, Some(DepositStatus::Authorized));

        let entries = b.history.len();
        assert!(!reconcile(&mut b, PAYMENT_SUCCEEDED, &intent("pi_dep"), &deposit));
        assert!(!reconcile(&mut b, AMOUNT_CAPTURABLE_UPDATED, &intent("pi_dep"), &deposit));
        assert_eq!(b.history.len(), entries);
    }

    #[test]
    fn test_deposit_failure_cancels() {
        let mut b = booking();
        assert!(reconcile(&mut b, PAYMENT_FAILED, &intent("pi_dep"), &link(IntentPurpose::Deposit)));
        assert_eq!(b.status, BookingStatus::Cancelled);
        assert_eq!(b.payment.deposit_status, Some(DepositStatus::Failed));
        assert!(b.cancellation.is_some());
    }

    #[test]
    fn test_final_failure_keeps_status() {
        let mut b = booking();
        b.status = BookingStatus::Active;
        assert!(reconcile(&mut b, PAYMENT_FAILED, &intent("pi_final"), &link(IntentPurpose::FinalPayment)));
        assert_eq!(b.status, BookingStatus::Active);
        assert_eq!(b.payment.final_payment_status, Some(PaymentStatus::Failed));
    }

    #[test]
    fn test_superseded_deposit_intent_is_ignored() {
        let mut b = booking();
        assert!(!reconcile(&mut b, CANCELED, &intent("pi_old"), &link(IntentPurpose::Deposit)));
        assert_eq!(b.status, BookingStatus::Pending);
    }

    #[test]
    fn test_cancel_event_after_completion_does_not_reopen() {
        let mut b = booking();
        b.status = BookingStatus::Completed;
        reconcile(&mut b, CANCELED, &intent("pi_dep"), &link(IntentPurpose::Deposit));
        assert_eq!(b.status, BookingStatus::Completed);
    }

    #[test]
    fn test_link_from_metadata() {
        let metadata = HashMap::from([
            ("booking_id".to_string(), "b1".to_string()),
            ("purpose".to_string(), "additional_payment".to_string()),
            ("payment_id".to_string(), "p1".to_string()),
        ]);
        let (booking_id, purpose) = link_from_metadata(&metadata).unwrap();
        assert_eq!(booking_id, "b1");
        assert_eq!(purpose, IntentPurpose::AdditionalPayment { payment_id: "p1".into() });

        let unlabeled = HashMap::from([("booking_id".to_string(), "b1".to_string())]);
        assert!(link_from_metadata(&unlabeled).is_none());
        assert!(link_from_metadata(&HashMap::new()).is_none());
    }
}

//! Booking (rental) model
//!
//! A booking owns the customer snapshot, the pricing, the full payment and
//! adjustment ledger and an append-only audit history. Status changes go
//! through [`BookingStatus::check_transition`].

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

/// Booking status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Active,
    Completed,
    Cancelled,
}

/// Result of checking a requested transition against the current status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCheck {
    Allowed,
    AlreadyInTarget,
    Rejected,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 5] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Active,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Active => "active",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|status| status.as_str() == value)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// Bookings in these states occupy the car's calendar
    pub fn blocks_calendar(&self) -> bool {
        matches!(
            self,
            BookingStatus::Pending | BookingStatus::Confirmed | BookingStatus::Active
        )
    }

    pub fn check_transition(self, target: BookingStatus) -> TransitionCheck {
        use BookingStatus::*;

        if self == target {
            return TransitionCheck::AlreadyInTarget;
        }

        let allowed = match (self, target) {
            (Pending, Confirmed) => true,
            (Confirmed, Active) => true,
            (Active, Completed) | (Confirmed, Completed) => true,
            (Pending, Cancelled) | (Confirmed, Cancelled) | (Active, Cancelled) => true,
            _ => false,
        };

        if allowed {
            TransitionCheck::Allowed
        } else {
            TransitionCheck::Rejected
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who performed an action recorded in the history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Actor {
    Admin { id: String, email: String },
    System { source: String },
}

impl Actor {
    pub fn stripe_webhook() -> Self {
        Actor::System {
            source: "stripe-webhook".to_string(),
        }
    }

    pub fn system(source: &str) -> Self {
        Actor::System {
            source: source.to_string(),
        }
    }

    pub fn customer() -> Self {
        Actor::system("customer-booking")
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Admin { email, .. } => write!(f, "admin:{}", email),
            Actor::System { source } => write!(f, "system:{}", source),
        }
    }
}

/// Inclusive calendar-day range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl DateRange {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self { start_date, end_date }
    }

    /// Both ranges occupy at least one common calendar day
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start_date <= other.end_date && other.start_date <= self.end_date
    }
}

/// Customer details copied into the booking at creation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSnapshot {
    #[validate(length(min = 2, max = 120))]
    pub name: String,

    #[validate(email)]
    pub email: String,

    #[validate(length(min = 7, max = 25))]
    pub phone: String,

    #[validate(length(min = 3, max = 40))]
    pub license_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    pub daily_rate: Decimal,
    pub total_days: i64,
    pub subtotal: Decimal,
    pub deposit_amount: Decimal,
    pub final_amount: Decimal,
    /// Signed sum of every posted adjustment
    pub additional_charges: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    Pending,
    RequiresAction,
    Authorized,
    Captured,
    Released,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Processing,
    RequiresAction,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    Charge,
    Credit,
    PromoDiscount,
}

/// A signed correction to the booking's final amount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalCharge {
    pub id: String,
    pub kind: AdjustmentKind,
    pub amount: Decimal,
    pub description: String,
    pub created_by: Actor,
    pub created_at: DateTime<Utc>,
}

/// One attempt to collect money for an adjustment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalPayment {
    pub id: String,
    pub charge_id: String,
    pub amount: Decimal,
    pub payment_intent_id: Option<String>,
    pub status: PaymentStatus,
    pub failure_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRecord {
    pub id: String,
    pub amount: Decimal,
    pub reason: String,
    pub recorded_by: Actor,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLedger {
    pub deposit_payment_intent_id: Option<String>,
    pub deposit_status: Option<DepositStatus>,
    pub deposit_captured_amount: Option<Decimal>,
    pub final_payment_intent_id: Option<String>,
    pub final_payment_status: Option<PaymentStatus>,
    pub final_payment_amount: Option<Decimal>,
    pub stripe_customer_id: Option<String>,
    pub saved_payment_method_id: Option<String>,
    pub additional_payments: Vec<AdditionalPayment>,
    pub additional_charges: Vec<AdditionalCharge>,
    pub refunds: Vec<RefundRecord>,
    pub total_paid: Decimal,
    /// Processor calls whose outcome is not known yet
    #[serde(default)]
    pub open_attempts: Vec<PaymentAttempt>,
}

/// Idempotency key reserved for one processor call. It stays open while the
/// outcome is ambiguous (timeout, outage) so a retry replays the same call;
/// any definite answer closes it and the next attempt gets a fresh key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAttempt {
    pub operation: String,
    pub idempotency_key: String,
    pub started_at: DateTime<Utc>,
}

impl PaymentLedger {
    pub fn attempt_key(&self, operation: &str) -> Option<&str> {
        self.open_attempts
            .iter()
            .find(|a| a.operation == operation)
            .map(|a| a.idempotency_key.as_str())
    }

    /// Reserve a key for `operation`. Returns `false` when one was already open.
    pub fn open_attempt(&mut self, booking_id: &str, operation: &str) -> bool {
        if self.attempt_key(operation).is_some() {
            return false;
        }
        self.open_attempts.push(PaymentAttempt {
            operation: operation.to_string(),
            idempotency_key: format!("{}:{}:{}", operation, booking_id, Uuid::new_v4()),
            started_at: Utc::now(),
        });
        true
    }

    pub fn close_attempt(&mut self, operation: &str) {
        self.open_attempts.retain(|a| a.operation != operation);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub action: String,
    pub description: String,
    pub performed_by: Actor,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleEntry {
    pub previous_dates: DateRange,
    pub new_dates: DateRange,
    pub previous_subtotal: Decimal,
    pub new_subtotal: Decimal,
    pub reason: String,
    pub performed_by: Actor,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    pub cancelled_at: DateTime<Utc>,
    pub cancelled_by: Actor,
    pub reason: String,
    pub refund_amount: Option<Decimal>,
    pub refund_processed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    pub car_id: String,
    pub customer: CustomerSnapshot,
    pub rental_dates: DateRange,
    pub pricing: Pricing,
    pub payment: PaymentLedger,
    pub status: BookingStatus,
    pub promo_code: Option<String>,
    pub history: Vec<HistoryEntry>,
    pub reschedule_history: Vec<RescheduleEntry>,
    pub cancellation: Option<Cancellation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(
        car_id: &str,
        customer: CustomerSnapshot,
        rental_dates: DateRange,
        pricing: Pricing,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            car_id: car_id.to_string(),
            customer,
            rental_dates,
            pricing,
            payment: PaymentLedger::default(),
            status: BookingStatus::Pending,
            promo_code: None,
            history: Vec::new(),
            reschedule_history: Vec::new(),
            cancellation: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append an audit entry
    pub fn record(
        &mut self,
        action: &str,
        description: impl Into<String>,
        actor: &Actor,
        metadata: serde_json::Value,
    ) {
        let now = Utc::now();
        self.history.push(HistoryEntry {
            action: action.to_string(),
            description: description.into(),
            performed_by: actor.clone(),
            metadata,
            created_at: now,
        });
        self.updated_at = now;
    }

    /// Move to `target` if the state machine allows it, appending a history
    /// entry named after the new status. Nothing changes unless the result is
    /// [`TransitionCheck::Allowed`].
    pub fn transition_to(
        &mut self,
        target: BookingStatus,
        actor: &Actor,
        description: impl Into<String>,
    ) -> TransitionCheck {
        let check = self.status.check_transition(target);
        if check == TransitionCheck::Allowed {
            let from = self.status;
            self.status = target;
            self.record(
                target.as_str(),
                description,
                actor,
                serde_json::json!({ "from": from, "to": target }),
            );
        }
        check
    }

    /// Cancel with the given reason. The cancellation record is only written
    /// when the transition is allowed.
    pub fn cancel(
        &mut self,
        actor: &Actor,
        reason: &str,
        refund_amount: Option<Decimal>,
    ) -> TransitionCheck {
        let description = format!("Booking cancelled: {}", reason);
        let check = self.transition_to(BookingStatus::Cancelled, actor, description);
        if check == TransitionCheck::Allowed {
            self.cancellation = Some(Cancellation {
                cancelled_at: Utc::now(),
                cancelled_by: actor.clone(),
                reason: reason.to_string(),
                refund_amount,
                refund_processed: false,
            });
        }
        check
    }

    /// Deposit money actually taken from the customer
    pub fn captured_deposit(&self) -> Decimal {
        match self.payment.deposit_status {
            Some(DepositStatus::Captured) => self.payment.deposit_captured_amount.unwrap_or(Decimal::ZERO),
            _ => Decimal::ZERO,
        }
    }

    /// Money already collected through succeeded additional payments
    pub fn collected_additional(&self) -> Decimal {
        self.payment
            .additional_payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Succeeded)
            .map(|p| p.amount)
            .sum()
    }

    /// Recompute every cached total from the ledgers.
    ///
    /// `finalAmount = subtotal + Σ adjustments` and
    /// `totalPaid = captured deposit + succeeded final payment + succeeded extras`.
    pub fn recompute_totals(&mut self) {
        let adjustments: Decimal = self.payment.additional_charges.iter().map(|c| c.amount).sum();
        self.pricing.additional_charges = adjustments;
        self.pricing.final_amount = self.pricing.subtotal + adjustments;

        let captured_deposit = self.captured_deposit();
        let final_payment = match self.payment.final_payment_status {
            Some(PaymentStatus::Succeeded) => self.payment.final_payment_amount.unwrap_or(Decimal::ZERO),
            _ => Decimal::ZERO,
        };

        self.payment.total_paid = captured_deposit + final_payment + self.collected_additional();
    }

    pub fn find_additional_payment_mut(&mut self, payment_id: &str) -> Option<&mut AdditionalPayment> {
        self.payment
            .additional_payments
            .iter_mut()
            .find(|p| p.id == payment_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(value: i64) -> Decimal {
        Decimal::from(value)
    }

    fn sample_booking() -> Booking {
        let customer = CustomerSnapshot {
            name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
            phone: "+15555550100".into(),
            license_number: "D1234567".into(),
        };
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2030, 1, 4).unwrap(),
        );
        let pricing = Pricing {
            daily_rate: dec(450),
            total_days: 3,
            subtotal: dec(1350),
            deposit_amount: dec(500),
            final_amount: dec(1350),
            additional_charges: Decimal::ZERO,
        };
        Booking::new("car-1", customer, range, pricing)
    }

    #[test]
    fn test_transition_table() {
        use BookingStatus::*;

        assert_eq!(Pending.check_transition(Confirmed), TransitionCheck::Allowed);
        assert_eq!(Confirmed.check_transition(Confirmed), TransitionCheck::AlreadyInTarget);
        assert_eq!(Cancelled.check_transition(Confirmed), TransitionCheck::Rejected);
        assert_eq!(Completed.check_transition(Confirmed), TransitionCheck::Rejected);
        assert_eq!(Confirmed.check_transition(Active), TransitionCheck::Allowed);
        assert_eq!(Active.check_transition(Completed), TransitionCheck::Allowed);
        assert_eq!(Confirmed.check_transition(Completed), TransitionCheck::Allowed);
        assert_eq!(Pending.check_transition(Completed), TransitionCheck::Rejected);
        assert_eq!(Completed.check_transition(Cancelled), TransitionCheck::Rejected);
        assert_eq!(Active.check_transition(Cancelled), TransitionCheck::Allowed);
        assert_eq!(Active.check_transition(Pending), TransitionCheck::Rejected);
    }

    #[test]
    fn test_inclusive_overlap() {
        let d = |day| NaiveDate::from_ymd_opt(2030, 3, day).unwrap();
        let base = DateRange::new(d(10), d(12));

        assert!(base.overlaps(&DateRange::new(d(12), d(15))));
        assert!(base.overlaps(&DateRange::new(d(1), d(10))));
        assert!(base.overlaps(&DateRange::new(d(11), d(11))));
        assert!(!base.overlaps(&DateRange::new(d(13), d(15))));
        assert!(!base.overlaps(&DateRange::new(d(1), d(9))));
    }

    #[test]
    fn test_actor_display() {
        let admin = Actor::Admin {
            id: "u1".into(),
            email: "ops@example.com".into(),
        };
        assert_eq!(admin.to_string(), "admin:ops@example.com");
        assert_eq!(Actor::stripe_webhook().to_string(), "system:stripe-webhook");
    }

    #[test]
    fn test_recompute_totals_counts_each_source_once() {
        let mut booking = sample_booking();
        let now = Utc::now();

        booking.payment.additional_charges.push(AdditionalCharge {
            id: "adj-1".into(),
            kind: AdjustmentKind::Charge,
            amount: dec(150),
            description: "late return".into(),
            created_by: Actor::stripe_webhook(),
            created_at: now,
        });
        booking.payment.additional_payments.push(AdditionalPayment {
            id: "pay-1".into(),
            charge_id: "adj-1".into(),
            amount: dec(150),
            payment_intent_id: Some("pi_extra".into()),
            status: PaymentStatus::Succeeded,
            failure_message: None,
            created_at: now,
            updated_at: now,
        });
        booking.payment.deposit_status = Some(DepositStatus::Captured);
        booking.payment.deposit_captured_amount = Some(dec(500));
        booking.payment.final_payment_status = Some(PaymentStatus::Failed);
        booking.payment.final_payment_amount = Some(dec(1350));

        booking.recompute_totals();

        assert_eq!(booking.pricing.additional_charges, dec(150));
        assert_eq!(booking.pricing.final_amount, dec(1500));
        // failed final payment does not count
        assert_eq!(booking.payment.total_paid, dec(650));
    }

    #[test]
    fn test_transition_to_records_only_real_changes() {
        let mut booking = sample_booking();
        let actor = Actor::stripe_webhook();

        assert_eq!(
            booking.transition_to(BookingStatus::Confirmed, &actor, "deposit authorized"),
            TransitionCheck::Allowed
        );
        assert_eq!(
            booking.transition_to(BookingStatus::Confirmed, &actor, "deposit authorized"),
            TransitionCheck::AlreadyInTarget
        );
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.history.len(), 1);
        assert_eq!(booking.history[0].action, "confirmed");
    }

    #[test]
    fn test_record_appends_history() {
        let mut booking = sample_booking();
        booking.record("confirmed", "Booking confirmed", &Actor::stripe_webhook(), serde_json::json!({}));
        assert_eq!(booking.history.len(), 1);
        assert_eq!(booking.history[0].performed_by.to_string(), "system:stripe-webhook");
    }

    #[test]
    fn test_attempt_key_survives_until_closed() {
        let mut ledger = PaymentLedger::default();
        assert!(ledger.open_attempt("b1", "final"));
        let key = ledger.attempt_key("final").map(str::to_string);

        // still open after an ambiguous failure: same key again
        assert!(!ledger.open_attempt("b1", "final"));
        assert_eq!(ledger.attempt_key("final").map(str::to_string), key);

        ledger.close_attempt("final");
        assert!(ledger.open_attempt("b1", "final"));
        assert_ne!(ledger.attempt_key("final").map(str::to_string), key);
    }
}

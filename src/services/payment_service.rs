//! Payment orchestration
//!
//! Deposit holds, captures, re-authorization, ad hoc charges and the final
//! charge. Each operation makes its processor call with no lock held and then
//! persists the outcome with a single optimistic booking write. Declines are
//! persisted before they are returned as errors; an off-session charge that
//! needs customer authentication is an outcome, not an error.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clients::{
    from_minor_units, to_minor_units, CaptureMethod, CreateIntentParams, IntentStatus, PaymentProcessor,
    ProcessorError,
};
use crate::models::booking::{
    Actor, AdditionalCharge, AdditionalPayment, AdjustmentKind, Booking, BookingStatus, DepositStatus, PaymentStatus,
    RefundRecord, TransitionCheck,
};
use crate::models::payment_intent::IntentPurpose;
use crate::repositories::{BookingRepository, PaymentIntentRepository};
use crate::utils::errors::{validation_error, AppError, AppResult};

pub const NO_SAVED_PAYMENT_METHOD: &str = "no saved payment method - ask customer to re-enter card";

const REAUTHORIZE: &str = "reauthorize";
const FINAL_PAYMENT: &str = "final";

/// What happened on the processor side of an admin payment action
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Succeeded {
        #[serde(rename = "paymentIntentId")]
        payment_intent_id: Option<String>,
        amount: Decimal,
    },
    Authorized {
        #[serde(rename = "paymentIntentId")]
        payment_intent_id: String,
    },
    Captured {
        #[serde(rename = "paymentIntentId")]
        payment_intent_id: String,
        amount: Decimal,
    },
    Released {
        #[serde(rename = "paymentIntentId")]
        payment_intent_id: String,
    },
    Processing {
        #[serde(rename = "paymentIntentId")]
        payment_intent_id: String,
    },
    /// The customer must complete authentication (3-D Secure) using the
    /// client secret before the payment can go through
    RequiresAction {
        #[serde(rename = "paymentIntentId")]
        payment_intent_id: String,
        #[serde(rename = "clientSecret")]
        client_secret: Option<String>,
    },
    Failed {
        message: String,
    },
    NotAttempted,
}

impl PaymentOutcome {
    pub fn requires_action(&self) -> bool {
        matches!(self, PaymentOutcome::RequiresAction { .. })
    }
}

/// Returned to the customer after a deposit hold is set up
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositSetup {
    pub payment_intent_id: String,
    pub client_secret: Option<String>,
    pub status: DepositStatus,
}

/// Signed adjustment requested by an admin
#[derive(Debug, Clone)]
pub struct AdditionalChargeInput {
    pub amount: Decimal,
    pub description: String,
    pub charge_immediately: bool,
    pub record_refund: bool,
}

#[derive(Clone)]
pub struct PaymentService {
    processor: Arc<dyn PaymentProcessor>,
    bookings: BookingRepository,
    intents: PaymentIntentRepository,
    currency: String,
}

impl PaymentService {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        bookings: BookingRepository,
        intents: PaymentIntentRepository,
        currency: &str,
    ) -> Self {
        Self {
            processor,
            bookings,
            intents,
            currency: currency.to_lowercase(),
        }
    }

    /// Place the manual-capture deposit hold for a freshly created booking.
    /// A hold the processor authorizes on the spot confirms the booking right
    /// away; otherwise the webhook reports it later.
    pub async fn authorize_deposit(
        &self,
        booking_id: &str,
        payment_method_id: &str,
    ) -> AppResult<DepositSetup> {
        let booking = self.bookings.get(booking_id).await?;
        let customer_id = self.ensure_customer(&booking).await?;

        let intent = self
            .processor
            .create_payment_intent(CreateIntentParams {
                amount_cents: to_minor_units(booking.pricing.deposit_amount)?,
                currency: self.currency.clone(),
                customer_id: Some(customer_id.clone()),
                payment_method_id: Some(payment_method_id.to_string()),
                capture_method: CaptureMethod::Manual,
                confirm: true,
                off_session: false,
                save_payment_method: true,
                description: Some(format!("Security deposit for booking {}", booking_id)),
                metadata: intent_metadata(booking_id, "deposit"),
                idempotency_key: Some(format!("deposit:{}", booking_id)),
            })
            .await?;

        self.intents.link(&intent.id, booking_id, IntentPurpose::Deposit).await?;

        let status = deposit_status_for(intent.status);
        let deposit = booking.pricing.deposit_amount;
        let actor = Actor::customer();
        let authorizer = Actor::system("deposit-authorization");

        let updated = self
            .bookings
            .update(booking_id, |b| {
                b.payment.deposit_payment_intent_id = Some(intent.id.clone());
                b.payment.stripe_customer_id = Some(customer_id.clone());
                b.payment.saved_payment_method_id = Some(payment_method_id.to_string());
                b.record(
                    "deposit_requested",
                    format!("Deposit hold of {} requested", deposit),
                    &actor,
                    json!({ "paymentIntentId": intent.id, "amount": deposit }),
                );

                // the webhook may already have reported the hold
                let reported = matches!(
                    b.payment.deposit_status,
                    Some(DepositStatus::Authorized)
                        | Some(DepositStatus::Captured)
                        | Some(DepositStatus::Released)
                        | Some(DepositStatus::Failed)
                );
                if reported {
                    return Ok(true);
                }

                b.payment.deposit_status = Some(status);
                if status == DepositStatus::Authorized {
                    b.record(
                        "deposit_authorized",
                        "Deposit hold authorized",
                        &authorizer,
                        json!({ "paymentIntentId": intent.id }),
                    );
                    if b.transition_to(BookingStatus::Confirmed, &authorizer, "Deposit authorized")
                        == TransitionCheck::Rejected
                    {
                        warn!("⚠️ Deposit authorized on {} booking {}, hold needs release", b.status, b.id);
                    }
                }
                Ok(true)
            })
            .await?;

        info!("💳 Deposit hold {} requested for booking {} ({:?})", intent.id, booking_id, status);

        Ok(DepositSetup {
            payment_intent_id: intent.id,
            client_secret: intent.client_secret,
            status: updated.payment.deposit_status.unwrap_or(status),
        })
    }

    /// Capture an authorized deposit, fully or partially. A confirmed booking
    /// becomes active.
    pub async fn capture_deposit(
        &self,
        booking_id: &str,
        actor: &Actor,
        amount: Option<Decimal>,
    ) -> AppResult<(Booking, PaymentOutcome)> {
        let booking = self.bookings.get(booking_id).await?;

        if booking.status == BookingStatus::Cancelled {
            return Err(AppError::InvalidTransition(
                "cannot capture the deposit of a cancelled booking".to_string(),
            ));
        }
        if booking.payment.deposit_status != Some(DepositStatus::Authorized) {
            return Err(AppError::InvalidTransition(format!(
                "deposit is {}, only an authorized deposit can be captured",
                deposit_label(booking.payment.deposit_status)
            )));
        }
        let intent_id = booking
            .payment
            .deposit_payment_intent_id
            .clone()
            .ok_or_else(|| AppError::InvalidTransition("booking has no deposit payment intent".to_string()))?;

        if let Some(amount) = amount {
            if amount <= Decimal::ZERO || amount > booking.pricing.deposit_amount {
                return Err(validation_error(
                    "amount",
                    "capture amount must be positive and no more than the deposit",
                ));
            }
        }
        let cents = amount.map(to_minor_units).transpose()?;

        let captured = self.processor.capture_payment_intent(&intent_id, cents).await?;
        let captured_amount = from_minor_units(captured.amount_received_cents);

        let updated = self
            .bookings
            .update(booking_id, |b| {
                if b.payment.deposit_status == Some(DepositStatus::Captured) {
                    return Ok(false);
                }
                b.payment.deposit_status = Some(DepositStatus::Captured);
                b.payment.deposit_captured_amount = Some(captured_amount);
                b.record(
                    "deposit_captured",
                    format!("Deposit captured: {}", captured_amount),
                    actor,
                    json!({ "paymentIntentId": intent_id, "amount": captured_amount }),
                );
                if b.status == BookingStatus::Confirmed {
                    b.transition_to(BookingStatus::Active, actor, "Rental started, deposit captured");
                }
                b.recompute_totals();
                Ok(true)
            })
            .await?;

        info!("💰 Deposit {} captured for booking {} by {}", captured_amount, booking_id, actor);
        Ok((
            updated,
            PaymentOutcome::Captured {
                payment_intent_id: captured.id,
                amount: captured_amount,
            },
        ))
    }

    /// Cancel an uncaptured hold
    pub async fn release_deposit(&self, booking_id: &str, actor: &Actor) -> AppResult<(Booking, PaymentOutcome)> {
        let booking = self.bookings.get(booking_id).await?;

        let releasable = matches!(
            booking.payment.deposit_status,
            Some(DepositStatus::Pending) | Some(DepositStatus::RequiresAction) | Some(DepositStatus::Authorized)
        );
        let intent_id = match (&booking.payment.deposit_payment_intent_id, releasable) {
            (Some(id), true) => id.clone(),
            _ => {
                return Err(AppError::InvalidTransition(format!(
                    "deposit is {}, there is no hold to release",
                    deposit_label(booking.payment.deposit_status)
                )))
            }
        };

        self.processor.cancel_payment_intent(&intent_id).await?;

        let updated = self
            .bookings
            .update(booking_id, |b| {
                if b.payment.deposit_status == Some(DepositStatus::Released) {
                    return Ok(false);
                }
                b.payment.deposit_status = Some(DepositStatus::Released);
                b.record(
                    "deposit_released",
                    "Deposit hold released",
                    actor,
                    json!({ "paymentIntentId": intent_id }),
                );
                Ok(true)
            })
            .await?;

        info!("🔓 Deposit hold {} released for booking {}", intent_id, booking_id);
        Ok((updated, PaymentOutcome::Released { payment_intent_id: intent_id }))
    }

    /// Replace an expired or failed hold with a new off-session one on the
    /// saved card. The booking is pointed at the new hold before the old one
    /// is cancelled, so events for the old hold arrive already superseded.
    pub async fn reauthorize_deposit(
        &self,
        booking_id: &str,
        actor: &Actor,
    ) -> AppResult<(Booking, PaymentOutcome)> {
        let booking = self.bookings.get(booking_id).await?;

        if booking.status.is_terminal() {
            return Err(AppError::InvalidTransition(format!(
                "cannot re-authorize the deposit of a {} booking",
                booking.status
            )));
        }
        if booking.payment.deposit_status == Some(DepositStatus::Captured) {
            return Err(AppError::InvalidTransition(
                "deposit has already been captured".to_string(),
            ));
        }

        let (customer_id, payment_method) = match (
            booking.payment.stripe_customer_id.clone(),
            booking.payment.saved_payment_method_id.clone(),
        ) {
            (Some(customer), Some(method)) => (customer, method),
            _ => return Err(validation_error("payment", NO_SAVED_PAYMENT_METHOD)),
        };

        let idempotency_key = self.begin_attempt(booking_id, REAUTHORIZE).await?;

        let result = self
            .processor
            .create_payment_intent(CreateIntentParams {
                amount_cents: to_minor_units(booking.pricing.deposit_amount)?,
                currency: self.currency.clone(),
                customer_id: Some(customer_id),
                payment_method_id: Some(payment_method),
                capture_method: CaptureMethod::Manual,
                confirm: true,
                off_session: true,
                save_payment_method: false,
                description: Some(format!(
                    "Security deposit (re-authorization) for booking {}",
                    booking_id
                )),
                metadata: intent_metadata(booking_id, "deposit"),
                idempotency_key: Some(idempotency_key),
            })
            .await;

        let (intent_id, status, outcome) = match result {
            Ok(intent) => {
                let status = deposit_status_for(intent.status);
                let outcome = match status {
                    DepositStatus::RequiresAction => PaymentOutcome::RequiresAction {
                        payment_intent_id: intent.id.clone(),
                        client_secret: intent.client_secret.clone(),
                    },
                    _ => PaymentOutcome::Authorized {
                        payment_intent_id: intent.id.clone(),
                    },
                };
                (intent.id, status, outcome)
            }
            Err(ProcessorError::AuthenticationRequired {
                payment_intent_id,
                client_secret,
            }) => {
                warn!("⚠️ Re-authorization for booking {} needs customer authentication", booking_id);
                let outcome = PaymentOutcome::RequiresAction {
                    payment_intent_id: payment_intent_id.clone(),
                    client_secret,
                };
                (payment_intent_id, DepositStatus::RequiresAction, outcome)
            }
            Err(ProcessorError::CardDeclined { message, code }) => {
                self.bookings
                    .update(booking_id, |b| {
                        let previous = b.payment.deposit_payment_intent_id.clone();
                        b.payment.close_attempt(REAUTHORIZE);
                        b.payment.deposit_status = Some(DepositStatus::Failed);
                        b.record(
                            "deposit_reauthorization_failed",
                            format!("Deposit re-authorization declined: {}", message),
                            actor,
                            json!({ "declineCode": code, "previousPaymentIntentId": previous }),
                        );
                        Ok(true)
                    })
                    .await?;
                return Err(AppError::PaymentDeclined(message));
            }
            Err(e) => return Err(self.abandon_attempt(booking_id, REAUTHORIZE, e).await),
        };

        self.intents.link(&intent_id, booking_id, IntentPurpose::Deposit).await?;

        let mut replaced: Option<String> = None;
        let persisted = self
            .bookings
            .update(booking_id, |b| {
                if b.status.is_terminal() {
                    return Err(AppError::InvalidTransition(format!(
                        "booking became {} during re-authorization",
                        b.status
                    )));
                }
                replaced = b.payment.deposit_payment_intent_id.clone();
                b.payment.close_attempt(REAUTHORIZE);
                b.payment.deposit_payment_intent_id = Some(intent_id.clone());
                b.payment.deposit_status = Some(status);
                let (action, description) = if status == DepositStatus::RequiresAction {
                    (
                        "deposit_reauthorization_requires_action",
                        "Customer must authenticate the new deposit hold",
                    )
                } else {
                    ("deposit_reauthorized", "Deposit hold re-authorized off-session")
                };
                b.record(
                    action,
                    description,
                    actor,
                    json!({ "previousPaymentIntentId": replaced, "paymentIntentId": intent_id }),
                );
                if status == DepositStatus::Authorized {
                    b.transition_to(BookingStatus::Confirmed, actor, "Deposit re-authorized");
                }
                Ok(true)
            })
            .await;

        let updated = match persisted {
            Ok(updated) => updated,
            Err(e) => {
                // nothing points at the new hold
                if let Err(cancel_error) = self.processor.cancel_payment_intent(&intent_id).await {
                    warn!("⚠️ Could not cancel orphaned deposit hold {}: {}", intent_id, cancel_error);
                }
                return Err(e);
            }
        };

        if let Some(old) = replaced.filter(|old| *old != intent_id) {
            // the old hold may already be gone
            if let Err(e) = self.processor.cancel_payment_intent(&old).await {
                warn!("⚠️ Could not cancel previous deposit hold {}: {}", old, e);
            }
        }

        info!("🔁 Deposit for booking {} re-authorized as {} ({:?})", booking_id, intent_id, status);
        Ok((updated, outcome))
    }

    /// Post a signed adjustment and, for positive amounts, optionally try to
    /// collect it right away. The ledger write and the payment attempt are
    /// persisted separately so a failed charge never undoes the adjustment.
    pub async fn charge_additional(
        &self,
        booking_id: &str,
        actor: &Actor,
        input: AdditionalChargeInput,
    ) -> AppResult<(Booking, PaymentOutcome)> {
        if input.amount.is_zero() {
            return Err(validation_error("amount", "amount must not be zero"));
        }
        let description = input.description.trim().to_string();
        if description.is_empty() {
            return Err(validation_error("description", "description is required"));
        }

        let charge_id = Uuid::new_v4().to_string();
        let payment_id = Uuid::new_v4().to_string();
        let attempt_charge = input.amount > Decimal::ZERO && input.charge_immediately;

        let booking = self
            .bookings
            .update(booking_id, |b| {
                if b.status == BookingStatus::Cancelled {
                    return Err(AppError::InvalidTransition(
                        "cannot adjust a cancelled booking".to_string(),
                    ));
                }

                let previous_final = b.pricing.final_amount;
                let new_final = previous_final + input.amount;
                let captured = b.captured_deposit();
                let now = Utc::now();

                if input.amount < Decimal::ZERO && new_final < captured {
                    if !input.record_refund {
                        return Err(AppError::BadRequest(format!(
                            "credit would bring the final amount ({}) below the captured deposit ({}); \
                             set recordRefund to record a refund",
                            new_final, captured
                        )));
                    }
                    let refund = (captured - new_final).min(-input.amount);
                    b.payment.refunds.push(RefundRecord {
                        id: Uuid::new_v4().to_string(),
                        amount: refund,
                        reason: description.clone(),
                        recorded_by: actor.clone(),
                        processed: false,
                        created_at: now,
                    });
                }

                let kind = if input.amount > Decimal::ZERO {
                    AdjustmentKind::Charge
                } else {
                    AdjustmentKind::Credit
                };
                b.payment.additional_charges.push(AdditionalCharge {
                    id: charge_id.clone(),
                    kind,
                    amount: input.amount,
                    description: description.clone(),
                    created_by: actor.clone(),
                    created_at: now,
                });
                if attempt_charge {
                    b.payment.additional_payments.push(AdditionalPayment {
                        id: payment_id.clone(),
                        charge_id: charge_id.clone(),
                        amount: input.amount,
                        payment_intent_id: None,
                        status: PaymentStatus::Processing,
                        failure_message: None,
                        created_at: now,
                        updated_at: now,
                    });
                }
                b.recompute_totals();

                let action = if kind == AdjustmentKind::Charge {
                    "additional_charge"
                } else {
                    "credit_applied"
                };
                b.record(
                    action,
                    format!("{}: {}", description, input.amount),
                    actor,
                    json!({
                        "chargeId": charge_id,
                        "amount": input.amount,
                        "previousFinalAmount": previous_final,
                        "newFinalAmount": b.pricing.final_amount,
                    }),
                );
                Ok(true)
            })
            .await?;

        info!(
            "🧾 Adjustment {} posted on booking {} by {}",
            input.amount, booking_id, actor
        );

        if !attempt_charge {
            return Ok((booking, PaymentOutcome::NotAttempted));
        }

        let attempt = self.attempt_additional_payment(&booking, &payment_id, input.amount).await;
        let (status, intent_id, failure, outcome) = match attempt {
            Ok(outcome) => {
                let (status, intent_id) = match &outcome {
                    PaymentOutcome::Succeeded { payment_intent_id, .. } => {
                        (PaymentStatus::Succeeded, payment_intent_id.clone())
                    }
                    PaymentOutcome::RequiresAction { payment_intent_id, .. } => {
                        (PaymentStatus::RequiresAction, Some(payment_intent_id.clone()))
                    }
                    PaymentOutcome::Processing { payment_intent_id } => {
                        (PaymentStatus::Processing, Some(payment_intent_id.clone()))
                    }
                    _ => (PaymentStatus::Processing, None),
                };
                (status, intent_id, None, outcome)
            }
            Err(message) => (
                PaymentStatus::Failed,
                None,
                Some(message.clone()),
                PaymentOutcome::Failed { message },
            ),
        };

        let updated = self
            .bookings
            .update(booking_id, |b| {
                let Some(payment) = b.find_additional_payment_mut(&payment_id) else {
                    return Ok(false);
                };
                // a webhook may have settled it already
                if payment.status == PaymentStatus::Succeeded {
                    return Ok(false);
                }
                payment.status = status;
                payment.payment_intent_id = intent_id.clone().or(payment.payment_intent_id.take());
                payment.failure_message = failure.clone();
                payment.updated_at = Utc::now();
                b.recompute_totals();
                b.record(
                    &format!("additional_payment_{}", payment_status_label(status)),
                    match &failure {
                        Some(message) => format!("Charge attempt failed: {}", message),
                        None => format!("Charge attempt {}", payment_status_label(status)),
                    },
                    actor,
                    json!({ "paymentId": payment_id, "paymentIntentId": intent_id }),
                );
                Ok(true)
            })
            .await?;

        Ok((updated, outcome))
    }

    /// Off-session charge for one additional payment. Errors come back as a
    /// message because a failed attempt is recorded, not raised.
    async fn attempt_additional_payment(
        &self,
        booking: &Booking,
        payment_id: &str,
        amount: Decimal,
    ) -> Result<PaymentOutcome, String> {
        let (customer_id, payment_method) = match (
            booking.payment.stripe_customer_id.clone(),
            booking.payment.saved_payment_method_id.clone(),
        ) {
            (Some(customer), Some(method)) => (customer, method),
            _ => return Err(NO_SAVED_PAYMENT_METHOD.to_string()),
        };

        let amount_cents = to_minor_units(amount).map_err(|e| e.to_string())?;
        let mut metadata = intent_metadata(&booking.id, "additional_payment");
        metadata.insert("payment_id".to_string(), payment_id.to_string());

        let result = self
            .processor
            .create_payment_intent(CreateIntentParams {
                amount_cents,
                currency: self.currency.clone(),
                customer_id: Some(customer_id),
                payment_method_id: Some(payment_method),
                capture_method: CaptureMethod::Automatic,
                confirm: true,
                off_session: true,
                save_payment_method: false,
                description: Some(format!("Additional charge for booking {}", booking.id)),
                metadata,
                idempotency_key: Some(format!("additional:{}:{}", booking.id, payment_id)),
            })
            .await;

        let purpose = IntentPurpose::AdditionalPayment {
            payment_id: payment_id.to_string(),
        };

        match result {
            Ok(intent) => {
                if let Err(e) = self.intents.link(&intent.id, &booking.id, purpose).await {
                    warn!("⚠️ Could not store cross-reference for {}: {}", intent.id, e);
                }
                if intent.status == IntentStatus::Succeeded {
                    Ok(PaymentOutcome::Succeeded {
                        payment_intent_id: Some(intent.id),
                        amount,
                    })
                } else {
                    Ok(PaymentOutcome::Processing {
                        payment_intent_id: intent.id,
                    })
                }
            }
            Err(ProcessorError::AuthenticationRequired {
                payment_intent_id,
                client_secret,
            }) => {
                if let Err(e) = self.intents.link(&payment_intent_id, &booking.id, purpose).await {
                    warn!("⚠️ Could not store cross-reference for {}: {}", payment_intent_id, e);
                }
                Ok(PaymentOutcome::RequiresAction {
                    payment_intent_id,
                    client_secret,
                })
            }
            Err(ProcessorError::CardDeclined { message, .. }) => Err(message),
            Err(e) => {
                warn!("⚠️ Additional charge for booking {} not collected: {}", booking.id, e);
                Err(e.to_string())
            }
        }
    }

    /// Charge what is still owed at the end of the rental against the most
    /// recent saved card and complete the booking.
    pub async fn charge_final(&self, booking_id: &str, actor: &Actor) -> AppResult<(Booking, PaymentOutcome)> {
        let booking = self.bookings.get(booking_id).await?;

        if booking.payment.final_payment_status == Some(PaymentStatus::Succeeded) {
            let outcome = PaymentOutcome::Succeeded {
                payment_intent_id: booking.payment.final_payment_intent_id.clone(),
                amount: booking.payment.final_payment_amount.unwrap_or(Decimal::ZERO),
            };
            return Ok((booking, outcome));
        }
        if !matches!(booking.status, BookingStatus::Confirmed | BookingStatus::Active) {
            return Err(AppError::InvalidTransition(format!(
                "cannot charge the final amount of a {} booking",
                booking.status
            )));
        }

        let amount = (booking.pricing.final_amount - booking.collected_additional()).max(Decimal::ZERO);

        if amount.is_zero() {
            let updated = self
                .record_final_payment(booking_id, actor, None, amount, PaymentStatus::Succeeded, None)
                .await?;
            return Ok((
                updated,
                PaymentOutcome::Succeeded {
                    payment_intent_id: None,
                    amount,
                },
            ));
        }

        let customer_id = booking
            .payment
            .stripe_customer_id
            .clone()
            .ok_or_else(|| validation_error("payment", NO_SAVED_PAYMENT_METHOD))?;
        let payment_method = self
            .latest_payment_method(&customer_id, booking.payment.saved_payment_method_id.as_deref())
            .await?;

        let amount_cents = to_minor_units(amount)?;
        let idempotency_key = self.begin_attempt(booking_id, FINAL_PAYMENT).await?;
        let result = self
            .processor
            .create_payment_intent(CreateIntentParams {
                amount_cents,
                currency: self.currency.clone(),
                customer_id: Some(customer_id),
                payment_method_id: Some(payment_method),
                capture_method: CaptureMethod::Automatic,
                confirm: true,
                off_session: true,
                save_payment_method: false,
                description: Some(format!("Final payment for booking {}", booking_id)),
                metadata: intent_metadata(booking_id, "final_payment"),
                idempotency_key: Some(idempotency_key),
            })
            .await;

        match result {
            Ok(intent) => {
                self.intents
                    .link(&intent.id, booking_id, IntentPurpose::FinalPayment)
                    .await?;

                if intent.status == IntentStatus::Succeeded {
                    let updated = self
                        .record_final_payment(
                            booking_id,
                            actor,
                            Some(intent.id.clone()),
                            amount,
                            PaymentStatus::Succeeded,
                            None,
                        )
                        .await?;
                    info!("✅ Final payment {} collected for booking {}", amount, booking_id);
                    Ok((
                        updated,
                        PaymentOutcome::Succeeded {
                            payment_intent_id: Some(intent.id),
                            amount,
                        },
                    ))
                } else {
                    let updated = self
                        .record_final_payment(
                            booking_id,
                            actor,
                            Some(intent.id.clone()),
                            amount,
                            PaymentStatus::Processing,
                            None,
                        )
                        .await?;
                    Ok((
                        updated,
                        PaymentOutcome::Processing {
                            payment_intent_id: intent.id,
                        },
                    ))
                }
            }
            Err(ProcessorError::AuthenticationRequired {
                payment_intent_id,
                client_secret,
            }) => {
                self.intents
                    .link(&payment_intent_id, booking_id, IntentPurpose::FinalPayment)
                    .await?;
                let updated = self
                    .record_final_payment(
                        booking_id,
                        actor,
                        Some(payment_intent_id.clone()),
                        amount,
                        PaymentStatus::RequiresAction,
                        None,
                    )
                    .await?;
                warn!("⚠️ Final payment for booking {} needs customer authentication", booking_id);
                Ok((
                    updated,
                    PaymentOutcome::RequiresAction {
                        payment_intent_id,
                        client_secret,
                    },
                ))
            }
            Err(ProcessorError::CardDeclined { message, .. }) => {
                self.record_final_payment(
                    booking_id,
                    actor,
                    None,
                    amount,
                    PaymentStatus::Failed,
                    Some(message.clone()),
                )
                .await?;
                Err(AppError::PaymentDeclined(message))
            }
            Err(e) => Err(self.abandon_attempt(booking_id, FINAL_PAYMENT, e).await),
        }
    }

    /// Idempotency key for the next `operation` call on a booking, reusing
    /// the one left open by an ambiguous failure
    async fn begin_attempt(&self, booking_id: &str, operation: &str) -> AppResult<String> {
        let booking = self
            .bookings
            .update(booking_id, |b| Ok(b.payment.open_attempt(booking_id, operation)))
            .await?;
        booking
            .payment
            .attempt_key(operation)
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::Internal(format!("no {} attempt open on booking {}", operation, booking_id))
            })
    }

    /// Close the attempt unless its outcome is unknown. A timeout or outage
    /// keeps the key so the retry cannot double-charge.
    async fn abandon_attempt(&self, booking_id: &str, operation: &str, error: ProcessorError) -> AppError {
        if matches!(error, ProcessorError::Unavailable(_)) {
            warn!("⚠️ {} for booking {} has no answer, keeping its key for the retry", operation, booking_id);
            return error.into();
        }

        let closed = self
            .bookings
            .update(booking_id, |b| {
                let open = b.payment.attempt_key(operation).is_some();
                b.payment.close_attempt(operation);
                Ok(open)
            })
            .await;
        if let Err(e) = closed {
            warn!("⚠️ Could not close {} attempt on booking {}: {}", operation, booking_id, e);
        }
        error.into()
    }

    async fn record_final_payment(
        &self,
        booking_id: &str,
        actor: &Actor,
        intent_id: Option<String>,
        amount: Decimal,
        status: PaymentStatus,
        failure: Option<String>,
    ) -> AppResult<Booking> {
        self.bookings
            .update(booking_id, |b| {
                if b.payment.final_payment_status == Some(PaymentStatus::Succeeded) {
                    return Ok(false);
                }
                b.payment.close_attempt(FINAL_PAYMENT);
                if intent_id.is_some() {
                    b.payment.final_payment_intent_id = intent_id.clone();
                }
                b.payment.final_payment_status = Some(status);
                b.payment.final_payment_amount = Some(amount);
                b.record(
                    &format!("final_payment_{}", payment_status_label(status)),
                    match &failure {
                        Some(message) => format!("Final payment of {} failed: {}", amount, message),
                        None => format!("Final payment of {} {}", amount, payment_status_label(status)),
                    },
                    actor,
                    json!({ "paymentIntentId": intent_id, "amount": amount }),
                );
                if status == PaymentStatus::Succeeded
                    && b.transition_to(BookingStatus::Completed, actor, "Final payment collected")
                        == TransitionCheck::Rejected
                {
                    warn!("⚠️ Booking {} is {}, final payment recorded without completing", b.id, b.status);
                }
                b.recompute_totals();
                Ok(true)
            })
            .await
    }

    /// Most recent card on the processor customer, falling back to the card
    /// saved at booking time
    async fn latest_payment_method(&self, customer_id: &str, saved: Option<&str>) -> AppResult<String> {
        let listed = match self.processor.list_payment_methods(customer_id).await {
            Ok(methods) => methods.into_iter().next().map(|m| m.id),
            Err(e) => {
                warn!("⚠️ Listing payment methods for {} failed: {}", customer_id, e);
                None
            }
        };

        listed
            .or_else(|| saved.map(str::to_string))
            .ok_or_else(|| validation_error("payment", NO_SAVED_PAYMENT_METHOD))
    }

    async fn ensure_customer(&self, booking: &Booking) -> AppResult<String> {
        if let Some(id) = &booking.payment.stripe_customer_id {
            return Ok(id.clone());
        }

        if let Some(existing) = self.processor.find_customer_by_email(&booking.customer.email).await? {
            return Ok(existing.id);
        }

        let customer = self
            .processor
            .create_customer(
                &booking.customer.email,
                &booking.customer.name,
                Some(booking.customer.phone.as_str()),
            )
            .await?;
        info!("👤 Processor customer {} created for {}", customer.id, booking.customer.email);
        Ok(customer.id)
    }
}

fn intent_metadata(booking_id: &str, purpose: &str) -> HashMap<String, String> {
    HashMap::from([
        ("booking_id".to_string(), booking_id.to_string()),
        ("purpose".to_string(), purpose.to_string()),
    ])
}

/// Deposit state implied by the intent status returned synchronously
fn deposit_status_for(status: IntentStatus) -> DepositStatus {
    match status {
        IntentStatus::RequiresCapture => DepositStatus::Authorized,
        IntentStatus::RequiresAction => DepositStatus::RequiresAction,
        _ => DepositStatus::Pending,
    }
}

fn payment_status_label(status: PaymentStatus) -> &'static str {
    match status {
        PaymentStatus::Processing => "processing",
        PaymentStatus::RequiresAction => "requires_action",
        PaymentStatus::Succeeded => "succeeded",
        PaymentStatus::Failed => "failed",
    }
}

fn deposit_label(status: Option<DepositStatus>) -> &'static str {
    match status {
        None => "not set up",
        Some(DepositStatus::Pending) => "pending",
        Some(DepositStatus::RequiresAction) => "awaiting customer action",
        Some(DepositStatus::Authorized) => "authorized",
        Some(DepositStatus::Captured) => "captured",
        Some(DepositStatus::Released) => "released",
        Some(DepositStatus::Failed) => "failed",
    }
}

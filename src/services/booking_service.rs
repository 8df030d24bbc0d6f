//! Booking lifecycle
//!
//! Creation, confirmation, cancellation, reschedule and completion. Creating
//! or moving a booking holds the car's lock only across "read the calendar,
//! check overlap, write"; every other change is an optimistic write through
//! [`BookingRepository::update`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::models::booking::{
    Actor, AdditionalCharge, AdjustmentKind, Booking, BookingStatus, CustomerSnapshot, DateRange, RescheduleEntry,
    TransitionCheck,
};
use crate::models::car::Car;
use crate::models::promo::PromoCode;
use crate::repositories::{BookingFilter, BookingRepository, CarRepository, PromoRepository};
use crate::services::availability_service::{Availability, AvailabilityService};
use crate::services::payment_service::{DepositSetup, PaymentService};
use crate::services::pricing_service;
use crate::store::{keys, RecordStore};
use crate::utils::errors::{not_found_error, validation_error, AppError, AppResult};
use crate::utils::validation::validate_rental_dates;

const LOCK_ATTEMPTS: u32 = 3;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct CreateBookingInput {
    pub car_id: String,
    pub rental_dates: DateRange,
    pub customer: CustomerSnapshot,
    pub promo_code: Option<String>,
    pub payment_method_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingCreated {
    pub booking: Booking,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<DepositSetup>,
}

#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn RecordStore>,
    bookings: BookingRepository,
    cars: CarRepository,
    promos: PromoRepository,
    availability: AvailabilityService,
    payments: PaymentService,
    lock_ttl_ms: u64,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        bookings: BookingRepository,
        cars: CarRepository,
        promos: PromoRepository,
        availability: AvailabilityService,
        payments: PaymentService,
        lock_ttl_ms: u64,
    ) -> Self {
        Self {
            store,
            bookings,
            cars,
            promos,
            availability,
            payments,
            lock_ttl_ms,
        }
    }

    pub async fn get(&self, id: &str) -> AppResult<Booking> {
        self.bookings.get(id).await
    }

    pub async fn list(&self, filter: &BookingFilter) -> AppResult<Vec<Booking>> {
        self.bookings.list(filter).await
    }

    /// Customer booking request. Writes a `pending` booking and, when a card
    /// was supplied, places the deposit hold.
    pub async fn create(&self, input: CreateBookingInput) -> AppResult<BookingCreated> {
        input.customer.validate()?;
        let range = input.rental_dates;
        validate_rental_dates(range.start_date, range.end_date, Utc::now().date_naive())?;

        let car = self
            .cars
            .find_by_id(&input.car_id)
            .await?
            .ok_or_else(|| not_found_error("Car", &input.car_id))?;
        if !car.available {
            return Err(AppError::Conflict(format!(
                "{} is not currently offered for rental",
                car.display_name()
            )));
        }

        let promo = match &input.promo_code {
            Some(code) => Some(self.redeemable_promo(code).await?),
            None => None,
        };

        let token = self.lock_car(&car.id).await?;
        let created = self.create_locked(&car, &input, promo.as_ref()).await;
        self.unlock_car(&car.id, &token).await;
        let booking = created?;

        info!(
            "📅 Booking {} created for {} ({} → {})",
            booking.id, car.id, range.start_date, range.end_date
        );

        let payment = match &input.payment_method_id {
            Some(payment_method) => match self.payments.authorize_deposit(&booking.id, payment_method).await {
                Ok(setup) => Some(setup),
                Err(e) => {
                    warn!("⚠️ Deposit setup failed for booking {}: {}", booking.id, e);
                    let actor = Actor::system("deposit-authorization");
                    let released = self
                        .bookings
                        .update(&booking.id, |b| {
                            Ok(b.cancel(&actor, "deposit authorization failed", None) == TransitionCheck::Allowed)
                        })
                        .await;
                    if let Err(cancel_error) = released {
                        warn!("⚠️ Could not release booking {}: {}", booking.id, cancel_error);
                    }
                    return Err(e);
                }
            },
            None => None,
        };

        let booking = self.bookings.get(&booking.id).await?;
        Ok(BookingCreated { booking, payment })
    }

    async fn create_locked(
        &self,
        car: &Car,
        input: &CreateBookingInput,
        promo: Option<&PromoCode>,
    ) -> AppResult<Booking> {
        let range = input.rental_dates;
        let availability = self.availability.is_available(&car.id, &range, None).await?;
        if !availability.available {
            let reason = describe_conflicts(&availability);
            info!("📅 Booking request for {} rejected: {}", car.id, reason);
            return Err(AppError::DatesUnavailable(reason));
        }

        let actor = Actor::customer();
        let mut booking = Booking::new(
            &car.id,
            input.customer.clone(),
            range,
            pricing_service::quote(car.daily_rate, &range),
        );
        booking.record(
            "created",
            format!("Booking requested for {}", car.display_name()),
            &actor,
            json!({
                "startDate": range.start_date,
                "endDate": range.end_date,
                "subtotal": booking.pricing.subtotal,
                "depositAmount": booking.pricing.deposit_amount,
            }),
        );

        if let Some(promo) = promo {
            let discount = promo.discount_for(booking.pricing.subtotal);
            if discount > Decimal::ZERO {
                self.promos.redeem(&promo.code, discount).await?;
                booking.promo_code = Some(promo.code.clone());
                booking.payment.additional_charges.push(AdditionalCharge {
                    id: Uuid::new_v4().to_string(),
                    kind: AdjustmentKind::PromoDiscount,
                    amount: -discount,
                    description: format!("Promo code {}", promo.code),
                    created_by: actor.clone(),
                    created_at: Utc::now(),
                });
                booking.recompute_totals();
                booking.record(
                    "promo_applied",
                    format!("Promo code {} applied: -{}", promo.code, discount),
                    &actor,
                    json!({ "code": promo.code, "discount": discount }),
                );
            }
        }

        if let Err(e) = self.bookings.create(&booking).await {
            if let Some(code) = &booking.promo_code {
                let discount = -booking.pricing.additional_charges;
                if let Err(release_error) = self.promos.release(code, discount).await {
                    warn!("⚠️ Could not release promo {} after failed write: {}", code, release_error);
                }
            }
            return Err(e);
        }
        Ok(booking)
    }

    async fn redeemable_promo(&self, code: &str) -> AppResult<PromoCode> {
        let promo = self
            .promos
            .find(code)
            .await?
            .ok_or_else(|| validation_error("promoCode", "unknown promo code"))?;
        if let Some(reason) = promo.redemption_blocker(Utc::now()) {
            return Err(validation_error("promoCode", reason));
        }
        Ok(promo)
    }

    /// `pending → confirmed`. Confirming a confirmed booking is a no-op.
    pub async fn confirm(&self, id: &str, actor: &Actor) -> AppResult<Booking> {
        let booking = self
            .bookings
            .update(id, |b| match b.transition_to(BookingStatus::Confirmed, actor, "Booking confirmed") {
                TransitionCheck::Allowed => Ok(true),
                TransitionCheck::AlreadyInTarget => Ok(false),
                TransitionCheck::Rejected => Err(AppError::InvalidTransition(format!(
                    "cannot confirm a {} booking",
                    b.status
                ))),
            })
            .await?;

        info!("✅ Booking {} confirmed by {}", id, actor);
        Ok(booking)
    }

    /// Admin cancellation. The refund amount is recorded, not paid out.
    pub async fn cancel(
        &self,
        id: &str,
        actor: &Actor,
        reason: &str,
        refund_amount: Option<Decimal>,
    ) -> AppResult<Booking> {
        if refund_amount.map_or(false, |amount| amount < Decimal::ZERO) {
            return Err(validation_error("refundAmount", "refund amount must not be negative"));
        }

        let booking = self
            .bookings
            .update(id, |b| match b.cancel(actor, reason, refund_amount) {
                TransitionCheck::Allowed => Ok(true),
                TransitionCheck::AlreadyInTarget => {
                    Err(AppError::InvalidTransition("booking is already cancelled".to_string()))
                }
                TransitionCheck::Rejected => Err(AppError::InvalidTransition(format!(
                    "cannot cancel a {} booking",
                    b.status
                ))),
            })
            .await?;

        info!("🚫 Booking {} cancelled by {}: {}", id, actor, reason);
        Ok(booking)
    }

    /// Move a live booking to new dates. Pricing is recomputed from the car's
    /// current rate, posted adjustments are kept, and the booking returns to
    /// `confirmed`.
    pub async fn reschedule(
        &self,
        id: &str,
        actor: &Actor,
        new_dates: DateRange,
        reason: &str,
    ) -> AppResult<Booking> {
        validate_rental_dates(new_dates.start_date, new_dates.end_date, Utc::now().date_naive())?;

        let current = self.bookings.get(id).await?;
        if current.status.is_terminal() {
            return Err(AppError::InvalidTransition(format!(
                "cannot reschedule a {} booking",
                current.status
            )));
        }
        let car = self
            .cars
            .find_by_id(&current.car_id)
            .await?
            .ok_or_else(|| not_found_error("Car", &current.car_id))?;

        let token = self.lock_car(&car.id).await?;
        let result = self.reschedule_locked(id, &car, actor, new_dates, reason).await;
        self.unlock_car(&car.id, &token).await;
        let booking = result?;

        info!(
            "🔄 Booking {} rescheduled to {} → {} by {}",
            id, new_dates.start_date, new_dates.end_date, actor
        );
        Ok(booking)
    }

    async fn reschedule_locked(
        &self,
        id: &str,
        car: &Car,
        actor: &Actor,
        new_dates: DateRange,
        reason: &str,
    ) -> AppResult<Booking> {
        let availability = self.availability.is_available(&car.id, &new_dates, Some(id)).await?;
        if !availability.available {
            return Err(AppError::DatesUnavailable(describe_conflicts(&availability)));
        }

        let fresh = pricing_service::quote(car.daily_rate, &new_dates);

        self.bookings
            .update(id, |b| {
                if b.status.is_terminal() {
                    return Err(AppError::InvalidTransition(format!(
                        "cannot reschedule a {} booking",
                        b.status
                    )));
                }

                let previous_dates = b.rental_dates;
                let previous_subtotal = b.pricing.subtotal;
                let previous_deposit = b.pricing.deposit_amount;
                let previous_status = b.status;

                b.rental_dates = new_dates;
                b.pricing = fresh.clone();
                b.recompute_totals();
                b.status = BookingStatus::Confirmed;
                b.reschedule_history.push(RescheduleEntry {
                    previous_dates,
                    new_dates,
                    previous_subtotal,
                    new_subtotal: b.pricing.subtotal,
                    reason: reason.to_string(),
                    performed_by: actor.clone(),
                    created_at: Utc::now(),
                });
                b.record(
                    "rescheduled",
                    format!(
                        "Rescheduled from {} to {} ({} to {}): {}",
                        previous_dates.start_date,
                        previous_dates.end_date,
                        new_dates.start_date,
                        new_dates.end_date,
                        reason
                    ),
                    actor,
                    json!({
                        "previousStatus": previous_status,
                        "previousSubtotal": previous_subtotal,
                        "newSubtotal": b.pricing.subtotal,
                        "previousDeposit": previous_deposit,
                        "newDeposit": b.pricing.deposit_amount,
                        "finalAmount": b.pricing.final_amount,
                    }),
                );
                Ok(true)
            })
            .await
    }

    /// Explicit end of rental without a final charge through this service
    pub async fn complete(&self, id: &str, actor: &Actor) -> AppResult<Booking> {
        let booking = self
            .bookings
            .update(id, |b| match b.transition_to(BookingStatus::Completed, actor, "Rental completed") {
                TransitionCheck::Allowed => Ok(true),
                TransitionCheck::AlreadyInTarget => Ok(false),
                TransitionCheck::Rejected => Err(AppError::InvalidTransition(format!(
                    "cannot complete a {} booking",
                    b.status
                ))),
            })
            .await?;

        info!("🏁 Booking {} completed by {}", id, actor);
        Ok(booking)
    }

    async fn lock_car(&self, car_id: &str) -> AppResult<String> {
        let key = keys::car_lock(car_id);
        let token = Uuid::new_v4().to_string();

        for attempt in 1..=LOCK_ATTEMPTS {
            if self.store.acquire_lock(&key, &token, self.lock_ttl_ms).await? {
                return Ok(token);
            }
            debug!("🔒 Car {} busy (attempt {}/{})", car_id, attempt, LOCK_ATTEMPTS);
            if attempt < LOCK_ATTEMPTS {
                tokio::time::sleep(LOCK_RETRY_DELAY).await;
            }
        }

        Err(AppError::DatesUnavailable(
            "dates are no longer available, another booking for this car is in progress".to_string(),
        ))
    }

    async fn unlock_car(&self, car_id: &str, token: &str) {
        match self.store.release_lock(&keys::car_lock(car_id), token).await {
            Ok(true) => {}
            Ok(false) => warn!("⚠️ Lock for car {} expired before release", car_id),
            Err(e) => warn!("⚠️ Could not release lock for car {}: {}", car_id, e),
        }
    }
}

fn describe_conflicts(availability: &Availability) -> String {
    let mut causes = Vec::new();
    if availability.conflicts.booking_conflicts {
        causes.push("overlaps an existing booking".to_string());
    }
    for block in &availability.conflicts.custom_blocks {
        causes.push(format!(
            "blocked by owner from {} to {}",
            block.start_date, block.end_date
        ));
    }
    format!("dates are no longer available: {}", causes.join("; "))
}

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::booking::{Booking, BookingStatus, CustomerSnapshot, DateRange};
use crate::repositories::BookingFilter;
use crate::services::booking_service::CreateBookingInput;
use crate::services::payment_service::{AdditionalChargeInput, PaymentOutcome};
use crate::utils::errors::{validation_error, AppResult};
use crate::utils::validation::{validate_positive_amount, validate_promo_code};

// Public booking request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    #[validate(length(min = 1, max = 64))]
    pub car_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[validate]
    pub customer: CustomerSnapshot,
    #[validate(custom = "validate_promo_code")]
    pub promo_code: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub payment_method_id: Option<String>,
}

impl From<CreateBookingRequest> for CreateBookingInput {
    fn from(request: CreateBookingRequest) -> Self {
        Self {
            car_id: request.car_id,
            rental_dates: DateRange::new(request.start_date, request.end_date),
            customer: request.customer,
            promo_code: request.promo_code,
            payment_method_id: request.payment_method_id,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CancelBookingRequest {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    pub refund_amount: Option<Decimal>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleBookingRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[validate(length(max = 500))]
    #[serde(default)]
    pub reason: String,
}

impl RescheduleBookingRequest {
    pub fn range(&self) -> DateRange {
        DateRange::new(self.start_date, self.end_date)
    }
}

// Positive amounts are charges, negative ones are credits
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChargeAdditionalRequest {
    pub amount: Decimal,
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    #[serde(default = "default_true")]
    pub charge_immediately: bool,
    #[serde(default)]
    pub record_refund: bool,
}

impl ChargeAdditionalRequest {
    pub fn into_input(self) -> AppResult<AdditionalChargeInput> {
        if self.amount.is_zero() {
            return Err(validation_error("amount", "amount must not be zero"));
        }
        Ok(AdditionalChargeInput {
            amount: self.amount.round_dp(2),
            description: self.description,
            charge_immediately: self.charge_immediately,
            record_refund: self.record_refund,
        })
    }
}

// Empty body captures the whole hold
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CaptureDepositRequest {
    #[validate(custom = "validate_positive_amount")]
    pub amount: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingListQuery {
    pub status: Option<String>,
    pub car_id: Option<String>,
}

impl BookingListQuery {
    pub fn into_filter(self) -> AppResult<BookingFilter> {
        let status = match self.status.as_deref() {
            Some(value) => Some(
                BookingStatus::parse(value).ok_or_else(|| validation_error("status", "unknown booking status"))?,
            ),
            None => None,
        };
        Ok(BookingFilter {
            status,
            car_id: self.car_id,
        })
    }
}

// Booking plus what happened at the processor
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentActionResponse {
    pub booking: Booking,
    pub payment: PaymentOutcome,
    pub requires_action: bool,
}

impl PaymentActionResponse {
    pub fn new(booking: Booking, payment: PaymentOutcome) -> Self {
        Self {
            requires_action: payment.requires_action(),
            booking,
            payment,
        }
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_request_validates_nested_customer() {
        let request: CreateBookingRequest = serde_json::from_value(json!({
            "carId": "car-a",
            "startDate": "2030-05-01",
            "endDate": "2030-05-04",
            "customer": {
                "name": "Ada Lovelace",
                "email": "not-an-email",
                "phone": "+15555550100",
                "licenseNumber": "D1234567"
            }
        }))
        .unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_charge_defaults() {
        let request: ChargeAdditionalRequest =
            serde_json::from_value(json!({ "amount": 150, "description": "Late return" })).unwrap();
        assert!(request.charge_immediately);
        assert!(!request.record_refund);

        let zero: ChargeAdditionalRequest =
            serde_json::from_value(json!({ "amount": 0, "description": "Nothing" })).unwrap();
        assert!(zero.into_input().is_err());
    }

    #[test]
    fn test_list_query_rejects_unknown_status() {
        let query = BookingListQuery {
            status: Some("archived".into()),
            car_id: None,
        };
        assert!(query.into_filter().is_err());
    }
}

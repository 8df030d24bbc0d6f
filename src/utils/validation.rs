//! Validation helpers
//!
//! Date-range rules for rentals and the custom validators used by request
//! DTOs.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use validator::ValidationError;

use crate::utils::errors::{validation_error, AppResult};

pub const MIN_RENTAL_DAYS: i64 = 1;
pub const MAX_RENTAL_DAYS: i64 = 30;

lazy_static! {
    static ref PROMO_CODE: Regex = Regex::new(r"^[A-Za-z0-9_-]{3,32}$").unwrap();
}

/// Checks a requested rental window against `today`.
///
/// Start must be strictly after today, end strictly after start, and the
/// rental no longer than [`MAX_RENTAL_DAYS`].
pub fn validate_rental_dates(start: NaiveDate, end: NaiveDate, today: NaiveDate) -> AppResult<()> {
    if start <= today {
        return Err(validation_error("startDate", "start date must be in the future"));
    }
    if end <= start {
        return Err(validation_error("endDate", "end date must be after start date"));
    }

    let days = (end - start).num_days();
    if days < MIN_RENTAL_DAYS {
        return Err(validation_error("endDate", "rentals must be at least 1 day"));
    }
    if days > MAX_RENTAL_DAYS {
        return Err(validation_error("endDate", "rentals are limited to 30 days"));
    }

    Ok(())
}

/// Range check for availability queries: only ordering matters
pub fn validate_query_range(start: NaiveDate, end: NaiveDate) -> AppResult<()> {
    if end < start {
        return Err(validation_error("endDate", "end date must not be before start date"));
    }
    Ok(())
}

pub fn validate_promo_code(code: &str) -> Result<(), ValidationError> {
    if PROMO_CODE.is_match(code) {
        Ok(())
    } else {
        let mut error = ValidationError::new("promo_code");
        error.message = Some("promo codes are 3-32 letters, digits, '-' or '_'".into());
        Err(error)
    }
}

pub fn validate_positive_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount > Decimal::ZERO {
        Ok(())
    } else {
        let mut error = ValidationError::new("positive");
        error.message = Some("amount must be greater than zero".into());
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 5, day).unwrap()
    }

    #[test]
    fn test_rental_date_rules() {
        let today = d(1);
        assert!(validate_rental_dates(d(2), d(5), today).is_ok());
        // start today is not in the future
        assert!(validate_rental_dates(d(1), d(5), today).is_err());
        assert!(validate_rental_dates(d(5), d(5), today).is_err());
        assert!(validate_rental_dates(d(6), d(5), today).is_err());
    }

    #[test]
    fn test_thirty_day_limit() {
        let today = d(1);
        let start = d(2);
        assert!(validate_rental_dates(start, start + chrono::Duration::days(30), today).is_ok());
        assert!(validate_rental_dates(start, start + chrono::Duration::days(31), today).is_err());
    }

    #[test]
    fn test_promo_code_format() {
        assert!(validate_promo_code("SUMMER-24").is_ok());
        assert!(validate_promo_code("ab").is_err());
        assert!(validate_promo_code("has space").is_err());
    }

    #[test]
    fn test_positive_amount() {
        assert!(validate_positive_amount(&Decimal::from(1)).is_ok());
        assert!(validate_positive_amount(&Decimal::ZERO).is_err());
    }
}

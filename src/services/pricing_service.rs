//! Pricing
//!
//! Subtotal, tiered deposit and final amount for a rental window. The deposit
//! is a flat hold chosen by daily rate tier, never a percentage of the
//! subtotal.

use rust_decimal::Decimal;

use crate::models::booking::{DateRange, Pricing};

/// Daily rates at or above this pay the high-tier deposit
pub const DEPOSIT_TIER_THRESHOLD: i64 = 500;
pub const STANDARD_DEPOSIT: i64 = 500;
pub const PREMIUM_DEPOSIT: i64 = 1000;

/// Billable days: whole days between start and end, at least one
pub fn rental_days(range: &DateRange) -> i64 {
    (range.end_date - range.start_date).num_days().max(1)
}

pub fn deposit_for(daily_rate: Decimal) -> Decimal {
    if daily_rate < Decimal::from(DEPOSIT_TIER_THRESHOLD) {
        Decimal::from(STANDARD_DEPOSIT)
    } else {
        Decimal::from(PREMIUM_DEPOSIT)
    }
}

/// Fresh pricing with no adjustments applied
pub fn quote(daily_rate: Decimal, range: &DateRange) -> Pricing {
    let total_days = rental_days(range);
    let subtotal = daily_rate * Decimal::from(total_days);

    Pricing {
        daily_rate,
        total_days,
        subtotal,
        deposit_amount: deposit_for(daily_rate),
        final_amount: subtotal,
        additional_charges: Decimal::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn range(days: i64) -> DateRange {
        let start = NaiveDate::from_ymd_opt(2030, 6, 1).unwrap();
        DateRange::new(start, start + chrono::Duration::days(days))
    }

    #[test]
    fn test_deposit_tiers() {
        assert_eq!(deposit_for(Decimal::from(400)), Decimal::from(500));
        assert_eq!(deposit_for(Decimal::new(49999, 2)), Decimal::from(500));
        assert_eq!(deposit_for(Decimal::from(500)), Decimal::from(1000));
        assert_eq!(deposit_for(Decimal::from(599)), Decimal::from(1000));
        assert_eq!(deposit_for(Decimal::from(5000)), Decimal::from(1000));
    }

    #[test]
    fn test_quote_three_days() {
        let pricing = quote(Decimal::from(450), &range(3));
        assert_eq!(pricing.total_days, 3);
        assert_eq!(pricing.subtotal, Decimal::from(1350));
        assert_eq!(pricing.deposit_amount, Decimal::from(500));
        assert_eq!(pricing.final_amount, Decimal::from(1350));
        assert_eq!(pricing.additional_charges, Decimal::ZERO);
    }

    #[test]
    fn test_minimum_one_day() {
        assert_eq!(rental_days(&range(0)), 1);
        assert_eq!(quote(Decimal::from(800), &range(0)).subtotal, Decimal::from(800));
    }

    #[test]
    fn test_reschedule_quote() {
        let before = quote(Decimal::from(800), &range(2));
        let after = quote(Decimal::from(800), &range(5));
        assert_eq!(before.subtotal, Decimal::from(1600));
        assert_eq!(after.subtotal, Decimal::from(4000));
        assert_eq!(after.deposit_amount, Decimal::from(1000));
    }
}

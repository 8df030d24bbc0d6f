//! Promo code model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoCode {
    pub code: String,
    /// Percentage between 0 and 100; mutually exclusive with `amount_off`
    pub percent_off: Option<Decimal>,
    pub amount_off: Option<Decimal>,
    pub active: bool,
    pub max_redemptions: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
    pub times_redeemed: u32,
    pub total_discounted: Decimal,
    pub created_at: DateTime<Utc>,
}

impl PromoCode {
    /// Reason the code cannot be redeemed right now, if any
    pub fn redemption_blocker(&self, now: DateTime<Utc>) -> Option<&'static str> {
        if !self.active {
            return Some("promo code is not active");
        }
        if self.expires_at.map_or(false, |at| at <= now) {
            return Some("promo code has expired");
        }
        if self
            .max_redemptions
            .map_or(false, |max| self.times_redeemed >= max)
        {
            return Some("promo code has reached its redemption limit");
        }
        None
    }

    /// Discount for a given subtotal, never more than the subtotal itself
    pub fn discount_for(&self, subtotal: Decimal) -> Decimal {
        let raw = match (self.percent_off, self.amount_off) {
            (Some(percent), _) => (subtotal * percent / Decimal::from(100)).round_dp(2),
            (None, Some(amount)) => amount,
            (None, None) => Decimal::ZERO,
        };
        raw.min(subtotal).max(Decimal::ZERO)
    }
}

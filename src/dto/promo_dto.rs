use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use crate::utils::validation::{validate_positive_amount, validate_promo_code};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SavePromoRequest {
    #[validate(custom = "validate_promo_code")]
    pub code: String,
    pub percent_off: Option<Decimal>,
    #[validate(custom = "validate_positive_amount")]
    pub amount_off: Option<Decimal>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[validate(range(min = 1))]
    pub max_redemptions: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

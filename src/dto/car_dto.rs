use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use crate::models::booking::DateRange;
use crate::utils::validation::validate_positive_amount;

// Create or update a car; an existing id updates in place
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SaveCarRequest {
    #[validate(length(min = 1, max = 64))]
    pub id: Option<String>,
    #[validate(length(min = 1, max = 60))]
    pub brand: String,
    #[validate(length(min = 1, max = 60))]
    pub model: String,
    #[validate(range(min = 1950, max = 2100))]
    pub year: i32,
    #[validate(custom = "validate_positive_amount")]
    pub daily_rate: Decimal,
    #[validate(custom = "validate_positive_amount")]
    pub weekly_rate: Option<Decimal>,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default)]
    pub show_on_homepage: bool,
    #[serde(default)]
    pub display_order: i32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarListQuery {
    #[serde(default)]
    pub homepage: bool,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BlockDatesRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[validate(length(max = 200))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl AvailabilityQuery {
    pub fn range(&self) -> DateRange {
        DateRange::new(self.start_date, self.end_date)
    }
}

fn default_available() -> bool {
    true
}

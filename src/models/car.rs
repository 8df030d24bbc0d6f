//! Car model
//!
//! Fleet records are owned by admin operations; bookings only reference a car
//! by id.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::booking::DateRange;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Car {
    pub id: String,
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub daily_rate: Decimal,
    pub weekly_rate: Option<Decimal>,
    pub available: bool,
    pub show_on_homepage: bool,
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Car {
    pub fn display_name(&self) -> String {
        format!("{} {} {}", self.year, self.brand, self.model)
    }
}

/// Owner-entered period during which the car cannot be rented
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedDates {
    pub id: String,
    #[serde(flatten)]
    pub range: DateRange,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

//! Availability
//!
//! A car is free for a window when no pending/confirmed/active booking and no
//! owner blackout touches any day of it. Booking conflicts and blackouts are
//! reported separately.

use serde::Serialize;

use crate::models::booking::{Booking, DateRange};
use crate::models::car::BlockedDates;
use crate::repositories::{BookingRepository, CarRepository};
use crate::utils::errors::AppResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityConflicts {
    pub booking_conflicts: bool,
    pub custom_blocks: Vec<DateRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub available: bool,
    pub conflicts: AvailabilityConflicts,
}

/// Pure overlap check over already-loaded records
pub fn evaluate(
    requested: &DateRange,
    bookings: &[Booking],
    blocks: &[BlockedDates],
    exclude_booking: Option<&str>,
) -> Availability {
    let booking_conflicts = bookings
        .iter()
        .filter(|b| Some(b.id.as_str()) != exclude_booking)
        .filter(|b| b.status.blocks_calendar())
        .any(|b| b.rental_dates.overlaps(requested));

    let custom_blocks: Vec<DateRange> = blocks
        .iter()
        .filter(|block| block.range.overlaps(requested))
        .map(|block| block.range)
        .collect();

    Availability {
        available: !booking_conflicts && custom_blocks.is_empty(),
        conflicts: AvailabilityConflicts {
            booking_conflicts,
            custom_blocks,
        },
    }
}

#[derive(Clone)]
pub struct AvailabilityService {
    bookings: BookingRepository,
    cars: CarRepository,
}

impl AvailabilityService {
    pub fn new(bookings: BookingRepository, cars: CarRepository) -> Self {
        Self { bookings, cars }
    }

    /// Always reads the store; callers creating or moving a booking must hold
    /// the car lock around this and the write that follows.
    pub async fn is_available(
        &self,
        car_id: &str,
        requested: &DateRange,
        exclude_booking: Option<&str>,
    ) -> AppResult<Availability> {
        let bookings = self.bookings.for_car(car_id).await?;
        let blocks = self.cars.blocks_for(car_id).await?;
        Ok(evaluate(requested, &bookings, &blocks, exclude_booking))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::booking::{BookingStatus, CustomerSnapshot};
    use crate::services::pricing_service;
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 7, day).unwrap()
    }

    fn booking(start: u32, end: u32, status: BookingStatus) -> Booking {
        let range = DateRange::new(d(start), d(end));
        let customer = CustomerSnapshot {
            name: "Grace Hopper".into(),
            email: "grace@example.com".into(),
            phone: "+15555550101".into(),
            license_number: "H7654321".into(),
        };
        let mut booking = Booking::new("car-1", customer, range, pricing_service::quote(Decimal::from(450), &range));
        booking.status = status;
        booking
    }

    fn block(start: u32, end: u32) -> BlockedDates {
        BlockedDates {
            id: "blk-1".into(),
            range: DateRange::new(d(start), d(end)),
            reason: Some("maintenance".into()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_active_bookings_block_and_terminal_ones_do_not() {
        let existing = vec![
            booking(10, 12, BookingStatus::Confirmed),
            booking(20, 22, BookingStatus::Cancelled),
            booking(25, 27, BookingStatus::Completed),
        ];

        let hit = evaluate(&DateRange::new(d(12), d(14)), &existing, &[], None);
        assert!(!hit.available);
        assert!(hit.conflicts.booking_conflicts);

        assert!(evaluate(&DateRange::new(d(20), d(22)), &existing, &[], None).available);
        assert!(evaluate(&DateRange::new(d(25), d(26)), &existing, &[], None).available);
    }

    #[test]
    fn test_blocks_reported_separately() {
        let result = evaluate(&DateRange::new(d(5), d(8)), &[], &[block(7, 9)], None);
        assert!(!result.available);
        assert!(!result.conflicts.booking_conflicts);
        assert_eq!(result.conflicts.custom_blocks, vec![DateRange::new(d(7), d(9))]);
    }

    #[test]
    fn test_excluded_booking_is_ignored() {
        let existing = vec![booking(10, 12, BookingStatus::Pending)];
        let own_id = existing[0].id.clone();
        assert!(evaluate(&DateRange::new(d(11), d(15)), &existing, &[], Some(&own_id)).available);
    }
}

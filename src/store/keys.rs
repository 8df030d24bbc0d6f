//! Key layout shared by every repository.

use crate::models::booking::BookingStatus;

pub const CARS: &str = "cars";
pub const BOOKINGS: &str = "bookings";
pub const PROMOS: &str = "promos";
pub const FAILED_WEBHOOK_EVENTS: &str = "webhook:failed_events";

pub fn car(id: &str) -> String {
    format!("car:{}", id)
}

pub fn car_blocks(car_id: &str) -> String {
    format!("car:{}:blocks", car_id)
}

pub fn car_bookings(car_id: &str) -> String {
    format!("car:{}:bookings", car_id)
}

pub fn car_lock(car_id: &str) -> String {
    format!("lock:car:{}", car_id)
}

pub fn booking(id: &str) -> String {
    format!("booking:{}", id)
}

pub fn bookings_by_status(status: BookingStatus) -> String {
    format!("bookings:status:{}", status.as_str())
}

pub fn payment_intent(intent_id: &str) -> String {
    format!("payment_intent:{}", intent_id)
}

pub fn promo(code: &str) -> String {
    format!("promo:{}", code.to_uppercase())
}

pub fn webhook_event(event_id: &str) -> String {
    format!("webhook_event:{}", event_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(car_bookings("c1"), "car:c1:bookings");
        assert_eq!(bookings_by_status(BookingStatus::Confirmed), "bookings:status:confirmed");
        assert_eq!(promo("summer10"), "promo:SUMMER10");
    }
}

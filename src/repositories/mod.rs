//! Repositories
//!
//! Typed access to the record store, one repository per record type.

pub mod booking_repository;
pub mod car_repository;
pub mod payment_intent_repository;
pub mod promo_repository;
pub mod webhook_event_repository;

pub use booking_repository::{BookingFilter, BookingRepository};
pub use car_repository::CarRepository;
pub use payment_intent_repository::PaymentIntentRepository;
pub use promo_repository::PromoRepository;
pub use webhook_event_repository::WebhookEventRepository;

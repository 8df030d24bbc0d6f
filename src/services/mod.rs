//! Services module
//!
//! Business logic. Services own the rules (availability, pricing, lifecycle,
//! payments, webhook reconciliation) and talk to storage only through the
//! repositories and to the processor only through [`PaymentProcessor`].
//!
//! [`PaymentProcessor`]: crate::clients::PaymentProcessor

pub mod availability_service;
pub mod booking_service;
pub mod fleet_service;
pub mod payment_service;
pub mod pricing_service;
pub mod promo_service;
pub mod webhook_service;

pub use availability_service::AvailabilityService;
pub use booking_service::BookingService;
pub use fleet_service::FleetService;
pub use payment_service::PaymentService;
pub use promo_service::PromoService;
pub use webhook_service::WebhookService;

//! Shared application state
//!
//! Everything a handler needs, built once at startup and cloned into each
//! request by axum. Backends arrive as trait objects so tests can swap in the
//! in-memory store and the mock processor.

use std::sync::Arc;

use crate::clients::PaymentProcessor;
use crate::config::environment::EnvironmentConfig;
use crate::repositories::{
    BookingRepository, CarRepository, PaymentIntentRepository, PromoRepository, WebhookEventRepository,
};
use crate::services::{
    AvailabilityService, BookingService, FleetService, PaymentService, PromoService, WebhookService,
};
use crate::store::RecordStore;
use crate::utils::signature::WebhookVerifier;

#[derive(Clone)]
pub struct AppState {
    pub config: EnvironmentConfig,
    pub store: Arc<dyn RecordStore>,
    pub bookings: BookingService,
    pub payments: PaymentService,
    pub fleet: FleetService,
    pub promos: PromoService,
    pub webhooks: WebhookService,
}

impl AppState {
    pub fn new(
        config: EnvironmentConfig,
        store: Arc<dyn RecordStore>,
        processor: Arc<dyn PaymentProcessor>,
    ) -> Self {
        let booking_repository = BookingRepository::new(store.clone());
        let car_repository = CarRepository::new(store.clone());
        let intent_repository = PaymentIntentRepository::new(store.clone());
        let promo_repository = PromoRepository::new(store.clone());
        let event_repository = WebhookEventRepository::new(store.clone(), config.store.processed_event_ttl_secs);

        let availability = AvailabilityService::new(booking_repository.clone(), car_repository.clone());
        let payments = PaymentService::new(
            processor,
            booking_repository.clone(),
            intent_repository.clone(),
            &config.payments.currency,
        );
        let bookings = BookingService::new(
            store.clone(),
            booking_repository.clone(),
            car_repository.clone(),
            promo_repository.clone(),
            availability.clone(),
            payments.clone(),
            config.store.booking_lock_ttl_ms,
        );
        let verifier = WebhookVerifier::new(
            config.payments.webhook_secret.clone(),
            config.payments.webhook_tolerance_secs,
        );

        Self {
            fleet: FleetService::new(car_repository, availability),
            promos: PromoService::new(promo_repository),
            webhooks: WebhookService::new(verifier, booking_repository, intent_repository, event_repository),
            bookings,
            payments,
            store,
            config,
        }
    }
}

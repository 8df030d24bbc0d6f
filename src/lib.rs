//! Rental booking core
//!
//! Booking lifecycle and payment state machine for a car rental business:
//! availability, pricing, deposit holds, adjustments and processor webhook
//! reconciliation, served over HTTP with axum.

pub mod clients;
pub mod config;
pub mod dto;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod utils;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::middleware::{cors_middleware, cors_middleware_with_origins};
use crate::state::AppState;

/// Full application router with tracing and CORS applied
pub fn build_app(state: AppState) -> Router {
    let cors = if state.config.cors_origins.is_empty() {
        cors_middleware()
    } else {
        cors_middleware_with_origins(state.config.cors_origins.clone())
    };

    routes::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

//! HTTP routes
//!
//! Public routes (booking requests, fleet browsing, processor webhooks) and
//! the admin back office, which sits behind [`admin_auth_middleware`].

pub mod booking_routes;
pub mod car_routes;
pub mod promo_routes;
pub mod webhook_routes;

use axum::{extract::State, middleware, routing::get, Json, Router};
use chrono::Utc;
use serde_json::{json, Value};

use crate::middleware::admin_auth_middleware;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let admin = Router::new()
        .merge(booking_routes::create_admin_booking_router())
        .merge(car_routes::create_admin_car_router())
        .merge(promo_routes::create_promo_router())
        .merge(webhook_routes::create_admin_webhook_router())
        .route_layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware));

    Router::new()
        .route("/health", get(health_check))
        .merge(booking_routes::create_public_booking_router())
        .merge(car_routes::create_public_car_router())
        .merge(webhook_routes::create_webhook_router())
        .merge(admin)
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let store_ok = state.store.ping().await;
    Json(json!({
        "status": if store_ok { "healthy" } else { "degraded" },
        "timestamp": Utc::now().to_rfc3339(),
        "store": if store_ok { "connected" } else { "unreachable" },
    }))
}

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};

use crate::dto::ApiResponse;
use crate::services::webhook_service::WebhookAck;
use crate::state::AppState;
use crate::utils::errors::AppError;
use crate::utils::signature::SIGNATURE_HEADER;

pub fn create_webhook_router() -> Router<AppState> {
    Router::new().route("/webhooks/payments", post(receive_payment_event))
}

pub fn create_admin_webhook_router() -> Router<AppState> {
    Router::new().route("/admin/webhooks/failed", get(list_failed_events))
}

// Signature is computed over the raw body, so no Json extractor here
async fn receive_payment_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok());
    let ack = state.webhooks.handle(&body, signature).await?;
    Ok(Json(ack))
}

/// Event ids whose processing failed and need a manual look
async fn list_failed_events(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<String>>>, AppError> {
    let events = state.webhooks.failed_events().await?;
    Ok(Json(ApiResponse::success(events)))
}

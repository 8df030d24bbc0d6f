use axum::{extract::State, routing::get, Json, Router};

use crate::dto::promo_dto::SavePromoRequest;
use crate::dto::ApiResponse;
use crate::models::promo::PromoCode;
use crate::state::AppState;
use crate::utils::errors::AppError;

pub fn create_promo_router() -> Router<AppState> {
    Router::new().route("/admin/promos", get(list_promos).post(save_promo))
}

async fn list_promos(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<PromoCode>>>, AppError> {
    let promos = state.promos.list().await?;
    Ok(Json(ApiResponse::success(promos)))
}

async fn save_promo(
    State(state): State<AppState>,
    Json(request): Json<SavePromoRequest>,
) -> Result<Json<ApiResponse<PromoCode>>, AppError> {
    let promo = state.promos.save(request).await?;
    Ok(Json(ApiResponse::success(promo)))
}

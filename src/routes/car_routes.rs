use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};

use crate::dto::car_dto::{AvailabilityQuery, BlockDatesRequest, CarListQuery, SaveCarRequest};
use crate::dto::ApiResponse;
use crate::models::car::{BlockedDates, Car};
use crate::services::availability_service::Availability;
use crate::state::AppState;
use crate::utils::errors::AppError;

pub fn create_public_car_router() -> Router<AppState> {
    Router::new()
        .route("/cars", get(list_cars))
        .route("/cars/:id", get(get_car))
        .route("/cars/:id/availability", get(car_availability))
}

pub fn create_admin_car_router() -> Router<AppState> {
    Router::new()
        .route("/admin/cars", post(save_car))
        .route("/admin/cars/:id/blocked-dates", post(block_dates))
        .route("/admin/cars/:id/blocked-dates/:block_id", delete(unblock_dates))
}

async fn list_cars(
    State(state): State<AppState>,
    Query(query): Query<CarListQuery>,
) -> Result<Json<ApiResponse<Vec<Car>>>, AppError> {
    let cars = state.fleet.list_cars(query.homepage).await?;
    Ok(Json(ApiResponse::success(cars)))
}

async fn get_car(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Car>>, AppError> {
    let car = state.fleet.get_car(&id).await?;
    Ok(Json(ApiResponse::success(car)))
}

async fn car_availability(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<ApiResponse<Availability>>, AppError> {
    let availability = state.fleet.availability(&id, &query.range()).await?;
    Ok(Json(ApiResponse::success(availability)))
}

async fn save_car(
    State(state): State<AppState>,
    Json(request): Json<SaveCarRequest>,
) -> Result<Json<ApiResponse<Car>>, AppError> {
    let car = state.fleet.save_car(request).await?;
    Ok(Json(ApiResponse::success(car)))
}

async fn block_dates(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<BlockDatesRequest>,
) -> Result<(StatusCode, Json<ApiResponse<BlockedDates>>), AppError> {
    let block = state.fleet.block_dates(&id, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(block))))
}

async fn unblock_dates(
    State(state): State<AppState>,
    Path((id, block_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    state.fleet.unblock_dates(&id, &block_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

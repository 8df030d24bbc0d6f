use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use validator::Validate;

use crate::dto::booking_dto::{
    BookingListQuery, CancelBookingRequest, CaptureDepositRequest, ChargeAdditionalRequest, CreateBookingRequest,
    PaymentActionResponse, RescheduleBookingRequest,
};
use crate::dto::ApiResponse;
use crate::models::auth::AuthenticatedUser;
use crate::models::booking::Booking;
use crate::services::booking_service::BookingCreated;
use crate::state::AppState;
use crate::utils::errors::AppError;

/// Customer-facing booking routes
pub fn create_public_booking_router() -> Router<AppState> {
    Router::new().route("/bookings", post(create_booking))
}

/// Back-office booking routes; mounted behind the admin middleware
pub fn create_admin_booking_router() -> Router<AppState> {
    Router::new()
        .route("/bookings", get(list_bookings))
        .route("/bookings/:id", get(get_booking))
        .route("/bookings/:id/confirm", post(confirm_booking))
        .route("/bookings/:id/cancel", post(cancel_booking))
        .route("/bookings/:id/reschedule", post(reschedule_booking))
        .route("/bookings/:id/complete", post(complete_booking))
        .route("/bookings/:id/charge-additional", post(charge_additional))
        .route("/bookings/:id/charge-final", post(charge_final))
        .route("/bookings/:id/capture-deposit", post(capture_deposit))
        .route("/bookings/:id/release-deposit", post(release_deposit))
        .route("/bookings/:id/reauthorize-deposit", post(reauthorize_deposit))
}

async fn create_booking(
    State(state): State<AppState>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<ApiResponse<BookingCreated>>), AppError> {
    request.validate()?;
    let created = state.bookings.create(request.into()).await.map_err(customer_facing)?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(created, "Booking received")),
    ))
}

// Customers get the generic wording; the specific cause is already logged
fn customer_facing(error: AppError) -> AppError {
    match error {
        AppError::DatesUnavailable(_) => AppError::DatesUnavailable("dates unavailable".to_string()),
        AppError::PaymentDeclined(_) => {
            AppError::PaymentDeclined("payment declined, please try another card".to_string())
        }
        other => other,
    }
}

async fn list_bookings(
    State(state): State<AppState>,
    Query(query): Query<BookingListQuery>,
) -> Result<Json<ApiResponse<Vec<Booking>>>, AppError> {
    let bookings = state.bookings.list(&query.into_filter()?).await?;
    Ok(Json(ApiResponse::success(bookings)))
}

async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Booking>>, AppError> {
    let booking = state.bookings.get(&id).await?;
    Ok(Json(ApiResponse::success(booking)))
}

async fn confirm_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Booking>>, AppError> {
    let booking = state.bookings.confirm(&id, &user.actor()).await?;
    Ok(Json(ApiResponse::success(booking)))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    Json(request): Json<CancelBookingRequest>,
) -> Result<Json<ApiResponse<Booking>>, AppError> {
    request.validate()?;
    let booking = state
        .bookings
        .cancel(&id, &user.actor(), &request.reason, request.refund_amount)
        .await?;
    Ok(Json(ApiResponse::success(booking)))
}

async fn reschedule_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    Json(request): Json<RescheduleBookingRequest>,
) -> Result<Json<ApiResponse<Booking>>, AppError> {
    request.validate()?;
    let booking = state
        .bookings
        .reschedule(&id, &user.actor(), request.range(), &request.reason)
        .await?;
    Ok(Json(ApiResponse::success(booking)))
}

async fn complete_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Booking>>, AppError> {
    let booking = state.bookings.complete(&id, &user.actor()).await?;
    Ok(Json(ApiResponse::success(booking)))
}

async fn charge_additional(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    Json(request): Json<ChargeAdditionalRequest>,
) -> Result<Json<ApiResponse<PaymentActionResponse>>, AppError> {
    request.validate()?;
    let (booking, outcome) = state
        .payments
        .charge_additional(&id, &user.actor(), request.into_input()?)
        .await?;
    Ok(Json(ApiResponse::success(PaymentActionResponse::new(booking, outcome))))
}

async fn charge_final(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<PaymentActionResponse>>, AppError> {
    let (booking, outcome) = state.payments.charge_final(&id, &user.actor()).await?;
    Ok(Json(ApiResponse::success(PaymentActionResponse::new(booking, outcome))))
}

async fn capture_deposit(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    request: Option<Json<CaptureDepositRequest>>,
) -> Result<Json<ApiResponse<PaymentActionResponse>>, AppError> {
    let Json(request) = request.unwrap_or_default();
    request.validate()?;
    let (booking, outcome) = state
        .payments
        .capture_deposit(&id, &user.actor(), request.amount)
        .await?;
    Ok(Json(ApiResponse::success(PaymentActionResponse::new(booking, outcome))))
}

async fn release_deposit(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<PaymentActionResponse>>, AppError> {
    let (booking, outcome) = state.payments.release_deposit(&id, &user.actor()).await?;
    Ok(Json(ApiResponse::success(PaymentActionResponse::new(booking, outcome))))
}

async fn reauthorize_deposit(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<PaymentActionResponse>>, AppError> {
    let (booking, outcome) = state.payments.reauthorize_deposit(&id, &user.actor()).await?;
    Ok(Json(ApiResponse::success(PaymentActionResponse::new(booking, outcome))))
}

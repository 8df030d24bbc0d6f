//! Error handling
//!
//! Every error kind the service can surface and its conversion into an HTTP
//! response. Lower layers (record store, payment processor) have their own
//! error enums that are folded into `AppError` here.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::clients::ProcessorError;
use crate::store::StoreError;

/// Main application errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Requested dates overlap an existing booking or an owner block
    #[error("Dates unavailable: {0}")]
    DatesUnavailable(String),

    /// The booking's current status does not allow the requested transition
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    #[error("Payment provider unavailable: {0}")]
    PaymentProviderUnavailable(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error body returned by the API
#[derive(Debug, serde::Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl AppError {
    /// Stable machine-readable code for the error kind
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::DatesUnavailable(_) => "DATES_UNAVAILABLE",
            AppError::InvalidTransition(_) => "INVALID_TRANSITION",
            AppError::Conflict(_) => "CONFLICT",
            AppError::PaymentDeclined(_) => "PAYMENT_DECLINED",
            AppError::PaymentProviderUnavailable(_) => "PAYMENT_PROVIDER_UNAVAILABLE",
            AppError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) | AppError::PaymentDeclined(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DatesUnavailable(_) | AppError::InvalidTransition(_) | AppError::Conflict(_) => {
                StatusCode::CONFLICT
            }
            AppError::PaymentProviderUnavailable(_) | AppError::StorageUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = Some(self.code().to_string());

        let error_response = match self {
            AppError::Validation(e) => {
                warn!("Validation error: {}", e);
                ErrorResponse {
                    error: "Validation Error".to_string(),
                    message: "The provided data is invalid".to_string(),
                    details: Some(json!(e)),
                    code,
                }
            }

            AppError::BadRequest(msg) => {
                warn!("Bad request: {}", msg);
                ErrorResponse {
                    error: "Bad Request".to_string(),
                    message: msg,
                    details: None,
                    code,
                }
            }

            AppError::Unauthorized(msg) => {
                warn!("Unauthorized access: {}", msg);
                ErrorResponse {
                    error: "Unauthorized".to_string(),
                    message: msg,
                    details: None,
                    code,
                }
            }

            AppError::NotFound(msg) => {
                warn!("Resource not found: {}", msg);
                ErrorResponse {
                    error: "Not Found".to_string(),
                    message: msg,
                    details: None,
                    code,
                }
            }

            AppError::DatesUnavailable(msg) => {
                warn!("Dates unavailable: {}", msg);
                ErrorResponse {
                    error: "Conflict".to_string(),
                    message: "The selected dates are unavailable".to_string(),
                    details: Some(json!({ "cause": msg })),
                    code,
                }
            }

            AppError::InvalidTransition(msg) | AppError::Conflict(msg) => {
                warn!("Conflict: {}", msg);
                ErrorResponse {
                    error: "Conflict".to_string(),
                    message: msg,
                    details: None,
                    code,
                }
            }

            AppError::PaymentDeclined(msg) => {
                warn!("Payment declined: {}", msg);
                ErrorResponse {
                    error: "Payment Declined".to_string(),
                    message: "Payment declined, please try another card".to_string(),
                    details: Some(json!({ "cause": msg })),
                    code,
                }
            }

            AppError::PaymentProviderUnavailable(msg) => {
                error!("Payment provider unavailable: {}", msg);
                ErrorResponse {
                    error: "Service Unavailable".to_string(),
                    message: "The payment provider is temporarily unavailable".to_string(),
                    details: Some(json!({ "cause": msg })),
                    code,
                }
            }

            AppError::StorageUnavailable(msg) => {
                error!("Storage unavailable: {}", msg);
                ErrorResponse {
                    error: "Service Unavailable".to_string(),
                    message: "The record store is unavailable".to_string(),
                    details: None,
                    code,
                }
            }

            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                ErrorResponse {
                    error: "Internal Server Error".to_string(),
                    message: "An unexpected error occurred".to_string(),
                    details: None,
                    code,
                }
            }
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Serialization(e) => AppError::Internal(format!("record encoding: {}", e)),
            other => AppError::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<ProcessorError> for AppError {
    fn from(e: ProcessorError) -> Self {
        match e {
            ProcessorError::CardDeclined { message, .. } => AppError::PaymentDeclined(message),
            ProcessorError::AuthenticationRequired { payment_intent_id, .. } => AppError::Conflict(format!(
                "payment intent {} requires customer authentication",
                payment_intent_id
            )),
            ProcessorError::InvalidRequest(msg) => {
                AppError::BadRequest(format!("payment processor rejected request: {}", msg))
            }
            ProcessorError::Unavailable(msg) => AppError::PaymentProviderUnavailable(msg),
            ProcessorError::Configuration(msg) => AppError::Internal(msg),
        }
    }
}

/// Typed result for fallible operations
pub type AppResult<T> = Result<T, AppError>;

/// Helper for single-field validation errors
pub fn validation_error(field: &'static str, message: &str) -> AppError {
    use validator::ValidationError;

    let mut error = ValidationError::new("custom");
    error.message = Some(message.to_string().into());

    let mut errors = validator::ValidationErrors::new();
    errors.add(field, error);

    AppError::Validation(errors)
}

/// Helper for missing resources
pub fn not_found_error(resource: &str, id: &str) -> AppError {
    AppError::NotFound(format!("{} with id '{}' not found", resource, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::DatesUnavailable("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::InvalidTransition("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::PaymentDeclined("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::PaymentProviderUnavailable("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(validation_error("startDate", "bad").status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_processor_errors_are_translated() {
        let declined: AppError = ProcessorError::CardDeclined {
            code: Some("card_declined".into()),
            message: "Your card was declined.".into(),
        }
        .into();
        assert_eq!(declined.code(), "PAYMENT_DECLINED");

        let down: AppError = ProcessorError::Unavailable("timeout".into()).into();
        assert_eq!(down.code(), "PAYMENT_PROVIDER_UNAVAILABLE");
    }
}

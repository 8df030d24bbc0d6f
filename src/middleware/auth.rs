//! Admin authentication middleware
//!
//! Verifies the bearer JWT issued by the session service and rejects anything
//! that is not an admin identity.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::models::auth::AuthenticatedUser;
use crate::state::AppState;
use crate::utils::errors::AppError;
use crate::utils::jwt::{extract_bearer, verify_token};

/// Injects [`AuthenticatedUser`] for downstream handlers
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("authorization token required".to_string()))
        .and_then(extract_bearer)?;

    let claims = verify_token(token, &state.config.jwt_secret)?;
    let user = AuthenticatedUser::from(claims);

    if !user.is_admin() {
        warn!("🚫 {} ({}) is not an admin", user.email, user.role);
        return Err(AppError::Unauthorized("admin access required".to_string()));
    }

    debug!("🔐 Admin {} authenticated", user.email);
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

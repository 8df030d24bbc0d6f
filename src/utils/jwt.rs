//! JWT helpers
//!
//! Admin sessions are issued elsewhere; this service only verifies bearer
//! tokens. `generate_token` exists for tests and local tooling.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

use crate::{models::auth::Claims, utils::errors::AppError};

/// Issue a signed token for the given identity
pub fn generate_token(id: &str, email: &str, role: &str, secret: &str, ttl: Duration) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: id.to_string(),
        email: email.to_string(),
        role: role.to_string(),
        exp: (now + ttl).timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref()))
        .map_err(|e| AppError::Internal(format!("token encoding failed: {}", e)))
}

/// Verify signature and expiry, returning the claims
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_ref()), &Validation::default())
        .map(|data| data.claims)
        .map_err(|e| AppError::Unauthorized(format!("invalid token: {}", e)))
}

/// Extract the token from an `Authorization: Bearer ...` header value
pub fn extract_bearer(auth_header: &str) -> Result<&str, AppError> {
    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Authorization header must start with 'Bearer '".to_string()))?;

    if token.trim().is_empty() {
        return Err(AppError::Unauthorized("empty bearer token".to_string()));
    }

    Ok(token.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_claims() {
        let token = generate_token("u1", "ops@example.com", "admin", "secret", Duration::hours(1)).unwrap();
        let claims = verify_token(&token, "secret").unwrap();
        assert_eq!(claims.email, "ops@example.com");
        assert_eq!(claims.role, "admin");
    }

    #[test]
    fn test_wrong_secret_and_expired_tokens_fail() {
        let token = generate_token("u1", "ops@example.com", "admin", "secret", Duration::hours(1)).unwrap();
        assert!(verify_token(&token, "other").is_err());

        let expired = generate_token("u1", "ops@example.com", "admin", "secret", Duration::hours(-2)).unwrap();
        assert!(verify_token(&expired, "secret").is_err());
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer("Bearer abc.def.ghi").unwrap(), "abc.def.ghi");
        assert!(extract_bearer("Basic abc").is_err());
        assert!(extract_bearer("Bearer ").is_err());
    }
}

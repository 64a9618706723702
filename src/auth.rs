//! Session verification.
//!
//! Token issuance lives in the external identity service; this module only
//! verifies HS256 bearer tokens and resolves the current user id. Anonymous
//! requests are allowed read-only access, so read handlers use
//! [`optional_user`] while every mutating handler goes through
//! [`require_user`].

use axum::http::HeaderMap;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

lazy_static::lazy_static! {
    /// JWT secret shared with the identity service.
    pub static ref JWT_SECRET: String = std::env::var("JWT_SECRET")
        .unwrap_or_else(|_| "default-jwt-secret-change-in-production".to_string());
}

/// Claims issued by the identity service.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User id (UUID).
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

/// Verify and decode an access token.
pub fn verify_access_token(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(JWT_SECRET.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Extract bearer token from the Authorization header.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Resolve the current user, failing Unauthorized when the session is
/// missing or invalid. Used by every mutating handler.
pub fn require_user(headers: &HeaderMap) -> Result<Uuid, ApiError> {
    let token = extract_bearer_token(headers)
        .ok_or_else(|| ApiError::Unauthorized("Authorization required".to_string()))?;
    let claims = verify_access_token(token)
        .map_err(|_| ApiError::Unauthorized("Invalid or expired token".to_string()))?;
    Uuid::parse_str(&claims.sub)
        .map_err(|_| ApiError::Unauthorized("Invalid session subject".to_string()))
}

/// Resolve the current user when a valid session is present; anonymous
/// otherwise. Read handlers use this for per-viewer annotations.
pub fn optional_user(headers: &HeaderMap) -> Option<Uuid> {
    let token = extract_bearer_token(headers)?;
    let claims = verify_access_token(token).ok()?;
    Uuid::parse_str(&claims.sub).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token_for(sub: &str) -> String {
        let now = Utc::now();
        let claims = Claims {
            sub: sub.to_string(),
            exp: (now + Duration::minutes(15)).timestamp(),
            iat: now.timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn headers_with(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn missing_header_is_unauthorized() {
        let result = require_user(&HeaderMap::new());
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn garbage_token_is_unauthorized() {
        let result = require_user(&headers_with("not.a.jwt"));
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn valid_token_resolves_user_id() {
        let id = Uuid::new_v4();
        let user = require_user(&headers_with(&token_for(&id.to_string()))).unwrap();
        assert_eq!(user, id);
    }

    #[test]
    fn non_uuid_subject_is_rejected() {
        let result = require_user(&headers_with(&token_for("admin")));
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn optional_user_is_none_for_anonymous() {
        assert!(optional_user(&HeaderMap::new()).is_none());
    }
}

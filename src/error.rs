//! Error taxonomy shared by all route handlers.
//!
//! Every handler returns `Result<_, ApiError>`; the `IntoResponse` impl maps
//! each variant to its status code with a single human-readable message.
//! Unexpected persistence failures are logged with context and surfaced as a
//! generic 500 without leaking internal detail.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// No session (or an invalid one) on a mutating call.
    #[error("{0}")]
    Unauthorized(String),

    /// Artbook, post, parent comment, or comment missing.
    #[error("{0}")]
    NotFound(String),

    /// Empty/too-long content, invalid category, malformed slug.
    #[error("{0}")]
    Validation(String),

    /// Ownership mismatch on edit/delete, or self-report.
    #[error("{0}")]
    Forbidden(String),

    /// Depth exceeded, delete-with-replies, comment/post mismatch,
    /// duplicate report.
    #[error("{0}")]
    Conflict(String),

    /// Database pool not initialized (startup without DATABASE_URL).
    #[error("Database not available")]
    Unavailable,

    /// Unexpected persistence failure. Logged at the point of conversion.
    #[error("internal error")]
    Internal(#[from] sqlx::Error),
}

/// Standard error body: `{"error": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let message = match &self {
            ApiError::Internal(e) => {
                tracing::error!("database error: {}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (self.status(), Json(ErrorBody { error: message })).into_response()
    }
}

/// True when a sqlx error is a unique-constraint violation.
///
/// The like toggle relies on this: a losing concurrent insert on the
/// (user, target) unique index is converted into the idempotent "already
/// liked" response instead of a 500.
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_expected_status_codes() {
        let cases = [
            (ApiError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ApiError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (ApiError::Conflict("x".into()), StatusCode::CONFLICT),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status(), expected);
        }
    }

    #[test]
    fn internal_error_hides_detail() {
        let err = ApiError::Internal(sqlx::Error::PoolClosed);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn non_database_errors_are_not_unique_violations() {
        assert!(!is_unique_violation(&sqlx::Error::PoolClosed));
    }
}

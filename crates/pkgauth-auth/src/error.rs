//! Authentication error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Denial and failure reasons returned by authentication, registration,
/// and access checks. Every variant carries a human-readable reason.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Bad credentials
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated, but the configured role does not grant the operation
    #[error("{0}")]
    Forbidden(String),

    /// Malformed input, rejected before any store access
    #[error("{0}")]
    BadData(String),

    /// Store or password codec failure
    #[error("{0}")]
    Internal(String),

    /// Feature intentionally disabled
    #[error("{0}")]
    NotAllowed(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
            AuthError::BadData(_) => StatusCode::BAD_REQUEST,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::NotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Unauthorized(_) => "UNAUTHORIZED",
            AuthError::Forbidden(_) => "FORBIDDEN",
            AuthError::BadData(_) => "BAD_DATA",
            AuthError::Internal(_) => "INTERNAL_ERROR",
            AuthError::NotAllowed(_) => "NOT_ALLOWED",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = axum::Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        }));

        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AuthError::Unauthorized("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AuthError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(AuthError::BadData("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AuthError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AuthError::NotAllowed("x".into()).status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }

    #[test]
    fn test_display_is_reason() {
        let err = AuthError::BadData("Bad username, username is too short (min 3 characters)!".into());
        assert_eq!(
            err.to_string(),
            "Bad username, username is too short (min 3 characters)!"
        );
    }
}

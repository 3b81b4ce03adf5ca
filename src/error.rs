//! Classified authentication failures

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Business-rule failure taxonomy. Every flow surfaces one of these kinds;
/// nothing is silently swallowed except the signup flow's background email
/// dispatch, which is logged only.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Unauthorized(String),

    /// Malformed input shape, rejected before orchestrator logic runs.
    #[error("{0}")]
    Validation(String),

    /// Third-party provider failure (network or non-2xx upstream).
    #[error("upstream provider error: {0}")]
    Upstream(String),

    #[error(transparent)]
    Database(#[from] rusqlite::Error),

    #[error("{0}")]
    Internal(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Conflict(_) => StatusCode::CONFLICT,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::BadRequest(_) | AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
            AuthError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AuthError::Upstream(_) | AuthError::Database(_) | AuthError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show the caller. Storage errors are replaced with a
    /// generic message; everything else is already caller-facing.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::Database(e) => {
                log::error!("Database error: {}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

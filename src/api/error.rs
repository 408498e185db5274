//! API error taxonomy
//!
//! Every handler returns `Result<_, ApiError>`; the error renders as a JSON
//! body `{"detail": ...}` with the matching status code. Idempotent no-ops
//! (already followed, already liked) are successes, never errors.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::services::AuthError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication credentials were not provided")]
    Unauthenticated,
    #[error("{0}")]
    Forbidden(String),
    #[error("Not found")]
    NotFound,
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Invalid(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "Internal error handling request");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => {
                ApiError::Invalid("Invalid email or password".to_string())
            }
            AuthError::AccountDisabled => ApiError::Forbidden("Account is disabled".to_string()),
            AuthError::EmailTaken => {
                ApiError::Conflict("A user with that email already exists".to_string())
            }
            AuthError::UsernameTaken => {
                ApiError::Conflict("A user with that username already exists".to_string())
            }
            AuthError::InvalidToken => ApiError::Unauthenticated,
            AuthError::Internal(e) => ApiError::Internal(e),
        }
    }
}

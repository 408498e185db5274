//! Request extractors for caller identity
//!
//! `AuthUser` pulls the Bearer token from the Authorization header and
//! verifies it against the auth service; handlers that take it as an argument
//! are authenticated by construction. `Staff` additionally requires the staff
//! flag.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::AppState;
use crate::api::error::ApiError;
use crate::services::AuthenticatedUser;

/// Authenticated caller identity
#[derive(Debug, Clone)]
pub struct AuthUser(pub AuthenticatedUser);

/// Authenticated caller with the staff flag set
#[derive(Debug, Clone)]
pub struct Staff(pub AuthenticatedUser);

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthenticated)?;
        let user = state
            .auth
            .validate_access_token(token)
            .map_err(|_| ApiError::Unauthenticated)?;
        Ok(AuthUser(user))
    }
}

impl FromRequestParts<AppState> for Staff {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_staff {
            return Err(ApiError::Forbidden(
                "You do not have permission to perform this action".to_string(),
            ));
        }
        Ok(Staff(user))
    }
}

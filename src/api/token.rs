//! Token issuance endpoints
//!
//! Obtain, refresh, verify, and revoke JWT pairs. Access tokens are
//! stateless; refresh tokens are tracked server-side and rotated on use.

use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::error::ApiError;
use crate::AppState;
use crate::services::auth::AuthTokens;

#[derive(Debug, Deserialize)]
pub struct ObtainTokenRequest {
    /// Email or username
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenPairResponse {
    pub access: String,
    pub refresh: String,
    pub expires_in: i64,
    pub token_type: String,
}

impl From<AuthTokens> for TokenPairResponse {
    fn from(tokens: AuthTokens) -> Self {
        Self {
            access: tokens.access_token,
            refresh: tokens.refresh_token,
            expires_in: tokens.expires_in,
            token_type: tokens.token_type,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyTokenRequest {
    pub token: String,
}

/// Obtain an access/refresh pair from credentials
async fn obtain_token(
    State(state): State<AppState>,
    Json(body): Json<ObtainTokenRequest>,
) -> Result<Json<TokenPairResponse>, ApiError> {
    let (_, tokens) = state.auth.login(&body.email, &body.password).await?;
    Ok(Json(tokens.into()))
}

/// Rotate a refresh token into a fresh pair
async fn refresh_token(
    State(state): State<AppState>,
    Json(body): Json<RefreshTokenRequest>,
) -> Result<Json<TokenPairResponse>, ApiError> {
    let tokens = state.auth.refresh_token(&body.refresh).await?;
    Ok(Json(tokens.into()))
}

/// Check an access token without touching any state
async fn verify_token(
    State(state): State<AppState>,
    Json(body): Json<VerifyTokenRequest>,
) -> Result<Json<Value>, ApiError> {
    state
        .auth
        .validate_access_token(&body.token)
        .map_err(|_| ApiError::Unauthenticated)?;
    Ok(Json(json!({})))
}

/// Revoke a refresh token
async fn logout(
    State(state): State<AppState>,
    Json(body): Json<RefreshTokenRequest>,
) -> Result<Json<Value>, ApiError> {
    state.auth.logout(&body.refresh).await?;
    Ok(Json(json!({"message": "Logged out"})))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/token/", post(obtain_token))
        .route("/token/refresh/", post(refresh_token))
        .route("/token/verify/", post(verify_token))
        .route("/token/logout/", post(logout))
}

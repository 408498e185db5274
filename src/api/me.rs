//! Current-user profile endpoints

use axum::{
    Json, Router,
    extract::State,
    routing::{get, put},
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::error::ApiError;
use super::extract::AuthUser;
use super::users::{
    UserDetailResponse, check_residence_exists, residence_names, user_response,
};
use super::validate::{double_option, validate_birth_date, validate_email, validate_password};
use crate::AppState;
use crate::db::UpdateUser;

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub email: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub username: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub first_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub last_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub birth_date: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub residence_place_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub photo_url: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub password: String,
}

/// The acting user's own profile, with both follow projections
async fn get_me(
    State(state): State<AppState>,
    AuthUser(acting): AuthUser,
) -> Result<Json<UserDetailResponse>, ApiError> {
    let user = state
        .db
        .users()
        .get_by_id(acting.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let follows = state.db.follows();
    let places = residence_names(&state).await?;
    Ok(Json(UserDetailResponse {
        is_staff: user.is_staff,
        followers: follows.follower_ids(user.id).await?,
        my_subscriptions: follows.subscription_ids(user.id).await?,
        user: user_response(&user, &places),
    }))
}

/// Update the acting user's profile (staff/active flags are not self-service)
async fn update_me(
    State(state): State<AppState>,
    AuthUser(acting): AuthUser,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<UserDetailResponse>, ApiError> {
    let users = state.db.users();

    if let Some(email) = &body.email {
        validate_email(email)?;
        if let Some(other) = users.get_by_email(email).await?
            && other.id != acting.user_id
        {
            return Err(ApiError::Conflict(
                "A user with that email already exists".to_string(),
            ));
        }
    }
    if let Some(Some(username)) = &body.username
        && let Some(other) = users.get_by_username(username).await?
        && other.id != acting.user_id
    {
        return Err(ApiError::Conflict(
            "A user with that username already exists".to_string(),
        ));
    }
    if let Some(Some(birth_date)) = &body.birth_date {
        validate_birth_date(birth_date)?;
    }
    if let Some(Some(residence_place_id)) = body.residence_place_id {
        check_residence_exists(&state, residence_place_id).await?;
    }

    let updated = users
        .update(
            acting.user_id,
            UpdateUser {
                email: body.email,
                username: body.username,
                password_hash: None,
                first_name: body.first_name,
                last_name: body.last_name,
                birth_date: body.birth_date,
                residence_place_id: body.residence_place_id,
                photo_url: body.photo_url,
                is_staff: None,
                is_active: None,
            },
        )
        .await?
        .ok_or(ApiError::NotFound)?;

    let follows = state.db.follows();
    let places = residence_names(&state).await?;
    Ok(Json(UserDetailResponse {
        is_staff: updated.is_staff,
        followers: follows.follower_ids(updated.id).await?,
        my_subscriptions: follows.subscription_ids(updated.id).await?,
        user: user_response(&updated, &places),
    }))
}

/// Delete the acting user's account
async fn delete_me(
    State(state): State<AppState>,
    AuthUser(acting): AuthUser,
) -> Result<axum::http::StatusCode, ApiError> {
    if state.db.users().delete(acting.user_id).await? {
        Ok(axum::http::StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

/// Change the acting user's password; all refresh tokens are revoked
async fn change_password(
    State(state): State<AppState>,
    AuthUser(acting): AuthUser,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    validate_password(&body.password)?;
    state
        .auth
        .change_password(acting.user_id, &body.password)
        .await?;
    Ok(Json(json!({"message": "Password updated"})))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me).patch(update_me).delete(delete_me))
        .route("/me/password", put(change_password))
}

//! User account endpoints
//!
//! Registration is open; everything else requires a valid access token.
//! Profile edits and deletes on other users are staff-only. The subscribe /
//! unsubscribe actions drive the follow graph and are idempotent: repeating
//! one reports the current state instead of erroring.

use std::collections::HashMap;

use axum::response::{IntoResponse, Redirect, Response};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::extract::{AuthUser, Staff};
use super::validate::{double_option, validate_birth_date, validate_email, validate_password};
use crate::AppState;
use crate::db::{
    CreateUser, SubscribeOutcome, UnsubscribeOutcome, UpdateUser, UserFilter, UserRecord,
};

// ============================================================================
// DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub birth_date: Option<String>,
    pub residence_place_id: Option<i64>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
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
    pub is_staff: Option<bool>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub residence: Option<String>,
    pub birthdate: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub birth_date: Option<String>,
    pub residence_place: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserListItem {
    #[serde(flatten)]
    pub user: UserResponse,
    pub is_following: bool,
    pub subscribed: bool,
}

#[derive(Debug, Serialize)]
pub struct UserDetailResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub is_staff: bool,
    pub followers: Vec<i64>,
    pub my_subscriptions: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// ============================================================================
// Helpers
// ============================================================================

/// Resolve residence place ids to names for response rendering
pub(super) async fn residence_names(state: &AppState) -> Result<HashMap<i64, String>, ApiError> {
    let places = state.db.residence_places().list_all().await?;
    Ok(places.into_iter().map(|p| (p.id, p.name)).collect())
}

pub(super) fn user_response(user: &UserRecord, places: &HashMap<i64, String>) -> UserResponse {
    UserResponse {
        id: user.id,
        email: user.email.clone(),
        username: user.username.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        birth_date: user.birth_date.clone(),
        residence_place: user
            .residence_place_id
            .and_then(|id| places.get(&id).cloned()),
        photo_url: user.photo_url.clone(),
    }
}

pub(super) async fn check_residence_exists(state: &AppState, id: i64) -> Result<(), ApiError> {
    if state.db.residence_places().get_by_id(id).await?.is_none() {
        return Err(ApiError::Invalid(format!(
            "Unknown residence place: {}",
            id
        )));
    }
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Register a new account (open endpoint)
async fn create_user(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(axum::http::StatusCode, Json<UserResponse>), ApiError> {
    validate_email(&body.email)?;
    validate_password(&body.password)?;
    if let Some(birth_date) = &body.birth_date {
        validate_birth_date(birth_date)?;
    }
    if let Some(residence_place_id) = body.residence_place_id {
        check_residence_exists(&state, residence_place_id).await?;
    }

    let user = state
        .auth
        .register(
            CreateUser {
                email: body.email,
                username: body.username,
                password_hash: String::new(),
                first_name: body.first_name,
                last_name: body.last_name,
                birth_date: body.birth_date,
                residence_place_id: body.residence_place_id,
                photo_url: body.photo_url,
            },
            &body.password,
        )
        .await?;

    let places = residence_names(&state).await?;
    Ok((
        axum::http::StatusCode::CREATED,
        Json(user_response(&user, &places)),
    ))
}

/// List users with profile filters, annotated with follow flags
async fn list_users(
    State(state): State<AppState>,
    AuthUser(acting): AuthUser,
    Query(query): Query<UserListQuery>,
) -> Result<Json<Vec<UserListItem>>, ApiError> {
    let filter = UserFilter {
        username: query.username,
        first_name: query.first_name,
        last_name: query.last_name,
        residence: query.residence,
        birth_date: query.birthdate,
    };

    let places = residence_names(&state).await?;
    let users = state.db.users().search(&filter, acting.user_id).await?;

    Ok(Json(
        users
            .into_iter()
            .map(|annotated| UserListItem {
                user: user_response(&annotated.user, &places),
                is_following: annotated.is_following,
                subscribed: annotated.subscribed,
            })
            .collect(),
    ))
}

/// Retrieve a user; your own id redirects permanently to /me
async fn get_user(
    State(state): State<AppState>,
    AuthUser(acting): AuthUser,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    if id == acting.user_id {
        return Ok(Redirect::permanent("/api/v1/me").into_response());
    }

    let user = state
        .db
        .users()
        .get_by_id(id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let follows = state.db.follows();
    let places = residence_names(&state).await?;
    let detail = UserDetailResponse {
        is_staff: user.is_staff,
        followers: follows.follower_ids(user.id).await?,
        my_subscriptions: follows.subscription_ids(user.id).await?,
        user: user_response(&user, &places),
    };

    Ok(Json(detail).into_response())
}

/// Update a user profile (staff only)
async fn update_user(
    State(state): State<AppState>,
    Staff(_): Staff,
    Path(id): Path<i64>,
    Json(body): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let users = state.db.users();
    let existing = users.get_by_id(id).await?.ok_or(ApiError::NotFound)?;

    if let Some(email) = &body.email {
        validate_email(email)?;
        if let Some(other) = users.get_by_email(email).await?
            && other.id != id
        {
            return Err(ApiError::Conflict(
                "A user with that email already exists".to_string(),
            ));
        }
    }
    if let Some(Some(username)) = &body.username
        && let Some(other) = users.get_by_username(username).await?
        && other.id != id
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
            existing.id,
            UpdateUser {
                email: body.email,
                username: body.username,
                password_hash: None,
                first_name: body.first_name,
                last_name: body.last_name,
                birth_date: body.birth_date,
                residence_place_id: body.residence_place_id,
                photo_url: body.photo_url,
                is_staff: body.is_staff,
                is_active: body.is_active,
            },
        )
        .await?
        .ok_or(ApiError::NotFound)?;

    let places = residence_names(&state).await?;
    Ok(Json(user_response(&updated, &places)))
}

/// Delete a user (staff only)
async fn delete_user(
    State(state): State<AppState>,
    Staff(_): Staff,
    Path(id): Path<i64>,
) -> Result<axum::http::StatusCode, ApiError> {
    if state.db.users().delete(id).await? {
        Ok(axum::http::StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

/// Follow the target user. Repeats report "Already followed".
async fn subscribe(
    State(state): State<AppState>,
    AuthUser(acting): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let target = state
        .db
        .users()
        .get_by_id(id)
        .await?
        .ok_or(ApiError::NotFound)?;

    if target.id == acting.user_id {
        return Err(ApiError::Invalid(
            "You cannot subscribe to yourself".to_string(),
        ));
    }

    let message = match state.db.follows().subscribe(acting.user_id, target.id).await? {
        SubscribeOutcome::Subscribed => {
            format!("Subscribed from {} (id={})", target.display_name(), id)
        }
        SubscribeOutcome::AlreadyFollowing => {
            format!("Already followed from {} (id={})", target.display_name(), id)
        }
    };

    Ok(Json(MessageResponse { message }))
}

/// Unfollow the target user. Repeats report "Not followed".
async fn unsubscribe(
    State(state): State<AppState>,
    AuthUser(acting): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let target = state
        .db
        .users()
        .get_by_id(id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let message = match state
        .db
        .follows()
        .unsubscribe(acting.user_id, target.id)
        .await?
    {
        UnsubscribeOutcome::Unsubscribed => {
            format!("Unsubscribed from {} (id={})", target.display_name(), id)
        }
        UnsubscribeOutcome::NotFollowing => {
            format!("Not followed from {} (id={})", target.display_name(), id)
        }
    };

    Ok(Json(MessageResponse { message }))
}

/// Users following the target user
async fn list_followers(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    if state.db.users().get_by_id(id).await?.is_none() {
        return Err(ApiError::NotFound);
    }

    let places = residence_names(&state).await?;
    let followers = state.db.follows().followers_of(id).await?;
    Ok(Json(
        followers
            .iter()
            .map(|u| user_response(u, &places))
            .collect(),
    ))
}

/// Users the target user follows
async fn list_subscriptions(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    if state.db.users().get_by_id(id).await?.is_none() {
        return Err(ApiError::NotFound);
    }

    let places = residence_names(&state).await?;
    let subscriptions = state.db.follows().subscriptions_of(id).await?;
    Ok(Json(
        subscriptions
            .iter()
            .map(|u| user_response(u, &places))
            .collect(),
    ))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/", get(list_users).post(create_user))
        .route(
            "/users/{id}",
            get(get_user)
                .put(update_user)
                .patch(update_user)
                .delete(delete_user),
        )
        .route("/users/{id}/subscribe", get(subscribe))
        .route("/users/{id}/unsubscribe", get(unsubscribe))
        .route("/users/{id}/followers", get(list_followers))
        .route("/users/{id}/subscriptions", get(list_subscriptions))
}

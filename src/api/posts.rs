//! Post endpoints: CRUD, comments, likes, and deferred publication
//!
//! Reads are public; writes require a token. Editing or deleting a post or
//! comment is restricted to its owner. Like/unlike mirror the follow actions:
//! idempotent, repeats report the current state in the message.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post, put},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::extract::AuthUser;
use super::users::MessageResponse;
use crate::AppState;
use crate::db::sqlite_helpers::str_to_datetime;
use crate::db::{
    AnnotatedPost, CommentWithOwner, CreatePost, CreateScheduledPost, LikeOutcome, PostFilter,
    ScheduledPostRecord, UnlikeOutcome, UpdatePost, normalize_hashtag,
};

// ============================================================================
// DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub text: String,
    pub image_url: Option<String>,
    /// Names of hashtags that must already exist
    #[serde(default)]
    pub hashtags: Vec<String>,
    /// Names created on the fly
    #[serde(default)]
    pub add_new_hashtags: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub text: Option<String>,
    #[serde(default, deserialize_with = "super::validate::double_option")]
    pub image_url: Option<Option<String>>,
    pub hashtags: Option<Vec<String>>,
    #[serde(default)]
    pub add_new_hashtags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct PostListQuery {
    /// Comma-separated hashtag names, any-match
    pub hashtag: Option<String>,
    /// Exact author username
    pub author: Option<String>,
    /// Title substring
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct SchedulePostRequest {
    pub title: String,
    pub text: String,
    pub image_url: Option<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub add_new_hashtags: Vec<String>,
    /// RFC 3339 timestamp, must be in the future
    pub publish_at: String,
}

#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub id: i64,
    pub title: String,
    pub text: String,
    pub image_url: Option<String>,
    pub owner: String,
    pub created_date: String,
    pub hashtags: Vec<String>,
    pub comments_count: i64,
    pub likes_count: i64,
}

#[derive(Debug, Serialize)]
pub struct CommentResponse {
    pub id: i64,
    pub text: String,
    pub owner: String,
    pub created_date: String,
}

#[derive(Debug, Serialize)]
pub struct PostDetailResponse {
    #[serde(flatten)]
    pub post: PostResponse,
    pub comments: Vec<CommentResponse>,
}

#[derive(Debug, Serialize)]
pub struct ScheduledPostResponse {
    pub id: i64,
    pub title: String,
    pub publish_at: String,
    pub status: String,
    pub error: Option<String>,
}

impl From<AnnotatedPost> for PostResponse {
    fn from(annotated: AnnotatedPost) -> Self {
        Self {
            id: annotated.post.id,
            title: annotated.post.title,
            text: annotated.post.text,
            image_url: annotated.post.image_url,
            owner: annotated.owner_name,
            created_date: annotated.post.created_date,
            hashtags: annotated.hashtags,
            comments_count: annotated.comments_count,
            likes_count: annotated.likes_count,
        }
    }
}

impl From<CommentWithOwner> for CommentResponse {
    fn from(c: CommentWithOwner) -> Self {
        Self {
            id: c.comment.id,
            text: c.comment.text,
            owner: c.owner_name,
            created_date: c.comment.created_date,
        }
    }
}

impl From<ScheduledPostRecord> for ScheduledPostResponse {
    fn from(r: ScheduledPostRecord) -> Self {
        Self {
            id: r.id,
            title: r.title,
            publish_at: r.publish_at,
            status: r.status,
            error: r.error,
        }
    }
}

// ============================================================================
// Validation helpers
// ============================================================================

fn validate_title(title: &str) -> Result<(), ApiError> {
    if title.trim().is_empty() {
        return Err(ApiError::Invalid("Title must not be empty".to_string()));
    }
    if title.len() > 100 {
        return Err(ApiError::Invalid(
            "Title must be at most 100 characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_text(text: &str) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::Invalid("Text must not be empty".to_string()));
    }
    if text.len() > 3000 {
        return Err(ApiError::Invalid(
            "Text must be at most 3000 characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_comment_text(text: &str) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::Invalid("Comment must not be empty".to_string()));
    }
    if text.len() > 300 {
        return Err(ApiError::Invalid(
            "Comment must be at most 300 characters".to_string(),
        ));
    }
    Ok(())
}

fn normalize_all(raw: &[String]) -> Result<Vec<String>, ApiError> {
    raw.iter()
        .map(|name| {
            normalize_hashtag(name)
                .ok_or_else(|| ApiError::Invalid(format!("Invalid hashtag: {}", name)))
        })
        .collect()
}

// ============================================================================
// Post handlers
// ============================================================================

/// List posts newest-first with optional hashtag/author/title filters
async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostListQuery>,
) -> Result<Json<Vec<PostResponse>>, ApiError> {
    let filter = PostFilter {
        hashtags: query
            .hashtag
            .map(|raw| raw.split(',').map(|t| t.trim().to_lowercase()).collect())
            .unwrap_or_default(),
        author: query.author,
        title: query.title,
    };

    let posts = state.db.posts().list(&filter).await?;
    Ok(Json(posts.into_iter().map(PostResponse::from).collect()))
}

/// Create a post with its hashtags
async fn create_post(
    State(state): State<AppState>,
    AuthUser(acting): AuthUser,
    Json(body): Json<CreatePostRequest>,
) -> Result<(axum::http::StatusCode, Json<PostResponse>), ApiError> {
    validate_title(&body.title)?;
    validate_text(&body.text)?;
    let hashtags = normalize_all(&body.hashtags)?;
    let new_hashtags = normalize_all(&body.add_new_hashtags)?;

    let posts = state.db.posts();
    if posts.get_by_title(&body.title).await?.is_some() {
        return Err(ApiError::Conflict(
            "A post with that title already exists".to_string(),
        ));
    }
    for name in &hashtags {
        if !state.db.hashtags().exists(name).await? {
            return Err(ApiError::Invalid(format!("Unknown hashtag: {}", name)));
        }
    }

    let created = posts
        .create(CreatePost {
            title: body.title,
            text: body.text,
            image_url: body.image_url,
            owner_id: acting.user_id,
            hashtags,
            new_hashtags,
        })
        .await?;

    let annotated = posts
        .get_annotated(created.id)
        .await?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("Post vanished after create")))?;
    Ok((axum::http::StatusCode::CREATED, Json(annotated.into())))
}

/// Post detail with comments
async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PostDetailResponse>, ApiError> {
    let annotated = state
        .db
        .posts()
        .get_annotated(id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let comments = state.db.comments().list_for_post(id).await?;
    Ok(Json(PostDetailResponse {
        post: annotated.into(),
        comments: comments.into_iter().map(CommentResponse::from).collect(),
    }))
}

/// Update a post (owner only)
async fn update_post(
    State(state): State<AppState>,
    AuthUser(acting): AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdatePostRequest>,
) -> Result<Json<PostResponse>, ApiError> {
    let posts = state.db.posts();
    let existing = posts.get_by_id(id).await?.ok_or(ApiError::NotFound)?;
    if existing.owner_id != acting.user_id {
        return Err(ApiError::Forbidden(
            "You don't have permission to edit this post".to_string(),
        ));
    }

    if let Some(title) = &body.title {
        validate_title(title)?;
        if let Some(other) = posts.get_by_title(title).await?
            && other.id != id
        {
            return Err(ApiError::Conflict(
                "A post with that title already exists".to_string(),
            ));
        }
    }
    if let Some(text) = &body.text {
        validate_text(text)?;
    }
    let hashtags = body.hashtags.as_deref().map(normalize_all).transpose()?;
    let new_hashtags = normalize_all(&body.add_new_hashtags)?;
    if let Some(names) = &hashtags {
        for name in names {
            if !state.db.hashtags().exists(name).await? {
                return Err(ApiError::Invalid(format!("Unknown hashtag: {}", name)));
            }
        }
    }

    posts
        .update(
            id,
            UpdatePost {
                title: body.title,
                text: body.text,
                image_url: body.image_url,
                hashtags,
                new_hashtags,
            },
        )
        .await?;

    let annotated = posts
        .get_annotated(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(annotated.into()))
}

/// Delete a post (owner only)
async fn delete_post(
    State(state): State<AppState>,
    AuthUser(acting): AuthUser,
    Path(id): Path<i64>,
) -> Result<axum::http::StatusCode, ApiError> {
    let posts = state.db.posts();
    let existing = posts.get_by_id(id).await?.ok_or(ApiError::NotFound)?;
    if existing.owner_id != acting.user_id {
        return Err(ApiError::Forbidden(
            "You don't have permission to delete this post".to_string(),
        ));
    }

    posts.delete(id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

// ============================================================================
// Comment handlers
// ============================================================================

/// Add a comment to a post
async fn add_comment(
    State(state): State<AppState>,
    AuthUser(acting): AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<CommentRequest>,
) -> Result<(axum::http::StatusCode, Json<CommentResponse>), ApiError> {
    validate_comment_text(&body.text)?;
    if state.db.posts().get_by_id(id).await?.is_none() {
        return Err(ApiError::NotFound);
    }

    let comment = state
        .db
        .comments()
        .create(id, acting.user_id, &body.text)
        .await?;

    let user = state
        .db
        .users()
        .get_by_id(acting.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(CommentResponse {
            id: comment.id,
            text: comment.text,
            owner: user.display_name(),
            created_date: comment.created_date,
        }),
    ))
}

/// Edit a comment (comment owner only)
async fn edit_comment(
    State(state): State<AppState>,
    AuthUser(acting): AuthUser,
    Path((post_id, comment_id)): Path<(i64, i64)>,
    Json(body): Json<CommentRequest>,
) -> Result<Json<CommentResponse>, ApiError> {
    validate_comment_text(&body.text)?;

    let comments = state.db.comments();
    let comment = comments
        .get_by_id(comment_id)
        .await?
        .filter(|c| c.post_id == post_id)
        .ok_or(ApiError::NotFound)?;
    if comment.owner_id != acting.user_id {
        return Err(ApiError::Forbidden(
            "You don't have permission to edit this comment".to_string(),
        ));
    }

    let updated = comments
        .update_text(comment_id, &body.text)
        .await?
        .ok_or(ApiError::NotFound)?;

    let user = state
        .db
        .users()
        .get_by_id(acting.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(CommentResponse {
        id: updated.id,
        text: updated.text,
        owner: user.display_name(),
        created_date: updated.created_date,
    }))
}

/// Delete a comment (comment owner only)
async fn delete_comment(
    State(state): State<AppState>,
    AuthUser(acting): AuthUser,
    Path((post_id, comment_id)): Path<(i64, i64)>,
) -> Result<axum::http::StatusCode, ApiError> {
    let comments = state.db.comments();
    let comment = comments
        .get_by_id(comment_id)
        .await?
        .filter(|c| c.post_id == post_id)
        .ok_or(ApiError::NotFound)?;
    if comment.owner_id != acting.user_id {
        return Err(ApiError::Forbidden(
            "You don't have permission to delete this comment".to_string(),
        ));
    }

    comments.delete(comment_id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

// ============================================================================
// Like handlers
// ============================================================================

/// Like a post. Repeats report "You already liked this post".
async fn like_post(
    State(state): State<AppState>,
    AuthUser(acting): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let posts = state.db.posts();
    let post = posts.get_by_id(id).await?.ok_or(ApiError::NotFound)?;

    let message = match posts.like(post.id, acting.user_id).await? {
        LikeOutcome::Liked => {
            format!("You liked this post '{}' (id={})", post.title, post.id)
        }
        LikeOutcome::AlreadyLiked => "You already liked this post".to_string(),
    };

    Ok(Json(MessageResponse { message }))
}

/// Remove a like. Repeats report "You didn't like this post".
async fn unlike_post(
    State(state): State<AppState>,
    AuthUser(acting): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let posts = state.db.posts();
    let post = posts.get_by_id(id).await?.ok_or(ApiError::NotFound)?;

    let message = match posts.unlike(post.id, acting.user_id).await? {
        UnlikeOutcome::Unliked => {
            format!("You unliked this post '{}' (id={})", post.title, post.id)
        }
        UnlikeOutcome::NotLiked => "You didn't like this post".to_string(),
    };

    Ok(Json(MessageResponse { message }))
}

// ============================================================================
// Scheduling handlers
// ============================================================================

/// Queue a post for deferred publication
async fn schedule_post(
    State(state): State<AppState>,
    AuthUser(acting): AuthUser,
    Json(body): Json<SchedulePostRequest>,
) -> Result<(axum::http::StatusCode, Json<ScheduledPostResponse>), ApiError> {
    validate_title(&body.title)?;
    validate_text(&body.text)?;

    let publish_at = str_to_datetime(&body.publish_at)
        .map_err(|_| ApiError::Invalid("publish_at must be an RFC 3339 timestamp".to_string()))?;
    if publish_at <= Utc::now() {
        return Err(ApiError::Invalid(
            "publish_at must be in the future".to_string(),
        ));
    }

    let mut hashtags = normalize_all(&body.hashtags)?;
    hashtags.extend(normalize_all(&body.add_new_hashtags)?);
    hashtags.sort();
    hashtags.dedup();

    let entry = state
        .db
        .scheduled_posts()
        .create(CreateScheduledPost {
            owner_id: acting.user_id,
            title: body.title,
            text: body.text,
            image_url: body.image_url,
            hashtags,
            publish_at: publish_at.to_rfc3339(),
        })
        .await?;

    Ok((axum::http::StatusCode::CREATED, Json(entry.into())))
}

/// The acting user's scheduled posts, oldest first
async fn list_scheduled(
    State(state): State<AppState>,
    AuthUser(acting): AuthUser,
) -> Result<Json<Vec<ScheduledPostResponse>>, ApiError> {
    let entries = state
        .db
        .scheduled_posts()
        .list_for_owner(acting.user_id)
        .await?;
    Ok(Json(
        entries.into_iter().map(ScheduledPostResponse::from).collect(),
    ))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts/", get(list_posts).post(create_post))
        .route("/posts/schedule", get(list_scheduled).post(schedule_post))
        .route(
            "/posts/{id}",
            get(get_post)
                .put(update_post)
                .patch(update_post)
                .delete(delete_post),
        )
        .route("/posts/{id}/add-comment", post(add_comment))
        .route(
            "/posts/{id}/comments/{comment_id}",
            put(edit_comment).delete(delete_comment),
        )
        .route("/posts/{id}/like", get(like_post))
        .route("/posts/{id}/unlike", get(unlike_post))
}

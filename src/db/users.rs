//! Users repository for accounts and authentication
//!
//! Handles user records, filtered profile search, and refresh tokens.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::Pool;
use super::sqlite_helpers::{bool_to_int, int_to_bool, now_iso8601};

// ============================================================================
// User Records
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub username: Option<String>,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub birth_date: Option<String>,
    pub residence_place_id: Option<i64>,
    pub photo_url: Option<String>,
    pub is_staff: bool,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl UserRecord {
    /// Display representation used in confirmation messages: username if set,
    /// then "first last", then email.
    pub fn display_name(&self) -> String {
        if let Some(username) = &self.username {
            return username.clone();
        }
        if let (Some(first), Some(last)) = (&self.first_name, &self.last_name) {
            return format!("{} {}", first, last);
        }
        self.email.clone()
    }
}

#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,
    pub username: Option<String>,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub birth_date: Option<String>,
    pub residence_place_id: Option<i64>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateUser {
    pub email: Option<String>,
    pub username: Option<Option<String>>,
    pub password_hash: Option<String>,
    pub first_name: Option<Option<String>>,
    pub last_name: Option<Option<String>>,
    pub birth_date: Option<Option<String>>,
    pub residence_place_id: Option<Option<i64>>,
    pub photo_url: Option<Option<String>>,
    pub is_staff: Option<bool>,
    pub is_active: Option<bool>,
}

/// Profile search filters for the user list endpoint
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub residence: Option<String>,
    pub birth_date: Option<String>,
}

/// A user row annotated with follow flags relative to the acting user:
/// `is_following` means this row follows the acting user, `subscribed` means
/// the acting user follows this row.
#[derive(Debug, Clone)]
pub struct AnnotatedUser {
    pub user: UserRecord,
    pub is_following: bool,
    pub subscribed: bool,
}

// ============================================================================
// Refresh Token Records
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub id: String,
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: String,
    pub created_at: String,
    pub last_used_at: Option<String>,
}

// ============================================================================
// Row mapping
// ============================================================================

const USER_COLUMNS: &str = "id, email, username, password_hash, first_name, last_name, \
     birth_date, residence_place_id, photo_url, is_staff, is_active, created_at, updated_at";

pub(super) type UserRow = (
    i64,
    String,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<i64>,
    Option<String>,
    i32,
    i32,
    String,
    String,
);

pub(super) fn row_to_user(r: UserRow) -> UserRecord {
    UserRecord {
        id: r.0,
        email: r.1,
        username: r.2,
        password_hash: r.3,
        first_name: r.4,
        last_name: r.5,
        birth_date: r.6,
        residence_place_id: r.7,
        photo_url: r.8,
        is_staff: int_to_bool(r.9),
        is_active: int_to_bool(r.10),
        created_at: r.11,
        updated_at: r.12,
    }
}

// ============================================================================
// Repository
// ============================================================================

pub struct UsersRepository {
    pool: Pool,
}

impl UsersRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // User CRUD
    // ========================================================================

    /// Create a new user. Email is stored lowercased so lookups stay
    /// case-insensitive regardless of collation.
    pub async fn create(&self, user: CreateUser) -> Result<UserRecord> {
        let now = now_iso8601();

        let result = sqlx::query(
            r#"
            INSERT INTO users (email, username, password_hash, first_name, last_name,
                               birth_date, residence_place_id, photo_url, is_staff, is_active,
                               created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, 1, ?, ?)
            "#,
        )
        .bind(user.email.to_lowercase())
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.birth_date)
        .bind(user.residence_place_id)
        .bind(&user.photo_url)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create user"))
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_user))
    }

    /// Get user by email (case-insensitive)
    pub async fn get_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ? COLLATE NOCASE"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_user))
    }

    /// Get user by username (case-insensitive)
    pub async fn get_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ? COLLATE NOCASE"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_user))
    }

    /// List users matching the given profile filters, annotated with follow
    /// flags relative to `acting_user_id`.
    pub async fn search(
        &self,
        filter: &UserFilter,
        acting_user_id: i64,
    ) -> Result<Vec<AnnotatedUser>> {
        let mut sql = format!(
            "SELECT {USER_COLUMNS}, \
             EXISTS(SELECT 1 FROM follows WHERE follower_id = users.id AND followee_id = ?1) AS is_following, \
             EXISTS(SELECT 1 FROM follows WHERE follower_id = ?1 AND followee_id = users.id) AS subscribed \
             FROM users WHERE is_active = 1"
        );
        let mut binds: Vec<String> = Vec::new();

        if let Some(username) = &filter.username {
            sql.push_str(" AND username LIKE ?");
            binds.push(format!("%{}%", username));
        }
        if let Some(first_name) = &filter.first_name {
            sql.push_str(" AND first_name LIKE ?");
            binds.push(format!("%{}%", first_name));
        }
        if let Some(last_name) = &filter.last_name {
            sql.push_str(" AND last_name LIKE ?");
            binds.push(format!("%{}%", last_name));
        }
        if let Some(residence) = &filter.residence {
            sql.push_str(
                " AND residence_place_id IN (SELECT id FROM residence_places WHERE name = ?)",
            );
            binds.push(residence.clone());
        }
        if let Some(birth_date) = &filter.birth_date {
            sql.push_str(" AND birth_date LIKE ?");
            binds.push(format!("%{}%", birth_date));
        }
        sql.push_str(" ORDER BY id");

        type AnnotatedRow = (
            i64,
            String,
            Option<String>,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<i64>,
            Option<String>,
            i32,
            i32,
            String,
            String,
            i32,
            i32,
        );

        let mut query = sqlx::query_as::<_, AnnotatedRow>(&sql).bind(acting_user_id);
        for bind in &binds {
            query = query.bind(bind);
        }
        let rows = query.fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|r| AnnotatedUser {
                is_following: int_to_bool(r.13),
                subscribed: int_to_bool(r.14),
                user: row_to_user((
                    r.0, r.1, r.2, r.3, r.4, r.5, r.6, r.7, r.8, r.9, r.10, r.11, r.12,
                )),
            })
            .collect())
    }

    /// Update user. Only the provided fields change; inner `None` clears a
    /// nullable column.
    pub async fn update(&self, id: i64, update: UpdateUser) -> Result<Option<UserRecord>> {
        let now = now_iso8601();

        if let Some(email) = update.email {
            sqlx::query("UPDATE users SET email = ?, updated_at = ? WHERE id = ?")
                .bind(email.to_lowercase())
                .bind(&now)
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        if let Some(username) = update.username {
            sqlx::query("UPDATE users SET username = ?, updated_at = ? WHERE id = ?")
                .bind(username)
                .bind(&now)
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        if let Some(password_hash) = update.password_hash {
            sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
                .bind(password_hash)
                .bind(&now)
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        if let Some(first_name) = update.first_name {
            sqlx::query("UPDATE users SET first_name = ?, updated_at = ? WHERE id = ?")
                .bind(first_name)
                .bind(&now)
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        if let Some(last_name) = update.last_name {
            sqlx::query("UPDATE users SET last_name = ?, updated_at = ? WHERE id = ?")
                .bind(last_name)
                .bind(&now)
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        if let Some(birth_date) = update.birth_date {
            sqlx::query("UPDATE users SET birth_date = ?, updated_at = ? WHERE id = ?")
                .bind(birth_date)
                .bind(&now)
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        if let Some(residence_place_id) = update.residence_place_id {
            sqlx::query("UPDATE users SET residence_place_id = ?, updated_at = ? WHERE id = ?")
                .bind(residence_place_id)
                .bind(&now)
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        if let Some(photo_url) = update.photo_url {
            sqlx::query("UPDATE users SET photo_url = ?, updated_at = ? WHERE id = ?")
                .bind(photo_url)
                .bind(&now)
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        if let Some(is_staff) = update.is_staff {
            sqlx::query("UPDATE users SET is_staff = ?, updated_at = ? WHERE id = ?")
                .bind(bool_to_int(is_staff))
                .bind(&now)
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        if let Some(is_active) = update.is_active {
            sqlx::query("UPDATE users SET is_active = ?, updated_at = ? WHERE id = ?")
                .bind(bool_to_int(is_active))
                .bind(&now)
                .bind(id)
                .execute(&self.pool)
                .await?;
        }

        self.get_by_id(id).await
    }

    /// Delete user
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Count users
    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    // ========================================================================
    // Refresh Tokens
    // ========================================================================

    /// Create a refresh token
    pub async fn create_refresh_token(
        &self,
        id: &str,
        user_id: i64,
        token_hash: &str,
        expires_at: &str,
    ) -> Result<RefreshTokenRecord> {
        let now = now_iso8601();

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(RefreshTokenRecord {
            id: id.to_string(),
            user_id,
            token_hash: token_hash.to_string(),
            expires_at: expires_at.to_string(),
            created_at: now,
            last_used_at: None,
        })
    }

    /// Get refresh token by hash
    pub async fn get_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>> {
        let row = sqlx::query_as::<_, (String, i64, String, String, String, Option<String>)>(
            "SELECT id, user_id, token_hash, expires_at, created_at, last_used_at \
             FROM refresh_tokens WHERE token_hash = ?",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| RefreshTokenRecord {
            id: r.0,
            user_id: r.1,
            token_hash: r.2,
            expires_at: r.3,
            created_at: r.4,
            last_used_at: r.5,
        }))
    }

    /// Update refresh token last used timestamp
    pub async fn update_refresh_token_used(&self, id: &str) -> Result<()> {
        let now = now_iso8601();
        sqlx::query("UPDATE refresh_tokens SET last_used_at = ? WHERE id = ?")
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete refresh token
    pub async fn delete_refresh_token(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete all refresh tokens for a user (logout all sessions)
    pub async fn delete_user_refresh_tokens(&self, user_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Clean up expired refresh tokens
    pub async fn cleanup_expired_refresh_tokens(&self) -> Result<u64> {
        let now = now_iso8601();
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < ?")
            .bind(&now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn sample(email: &str, username: Option<&str>) -> CreateUser {
        CreateUser {
            email: email.to_string(),
            username: username.map(String::from),
            password_hash: "hash".to_string(),
            first_name: None,
            last_name: None,
            birth_date: None,
            residence_place_id: None,
            photo_url: None,
        }
    }

    #[tokio::test]
    async fn create_and_lookup() {
        let db = test_pool().await;
        let users = db.users();

        let created = users
            .create(sample("Alice@Example.com", Some("alice")))
            .await
            .unwrap();
        assert_eq!(created.email, "alice@example.com");
        assert!(created.is_active);
        assert!(!created.is_staff);

        let by_email = users.get_by_email("ALICE@example.COM").await.unwrap();
        assert_eq!(by_email.unwrap().id, created.id);

        let by_username = users.get_by_username("alice").await.unwrap();
        assert_eq!(by_username.unwrap().id, created.id);
    }

    #[tokio::test]
    async fn display_name_falls_back() {
        let mut user = UserRecord {
            id: 1,
            email: "bob@example.com".to_string(),
            username: None,
            password_hash: String::new(),
            first_name: None,
            last_name: None,
            birth_date: None,
            residence_place_id: None,
            photo_url: None,
            is_staff: false,
            is_active: true,
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert_eq!(user.display_name(), "bob@example.com");

        user.first_name = Some("Bob".to_string());
        user.last_name = Some("Jones".to_string());
        assert_eq!(user.display_name(), "Bob Jones");

        user.username = Some("bobby".to_string());
        assert_eq!(user.display_name(), "bobby");
    }

    #[tokio::test]
    async fn update_clears_nullable_fields() {
        let db = test_pool().await;
        let users = db.users();
        let created = users.create(sample("carol@example.com", None)).await.unwrap();

        let updated = users
            .update(
                created.id,
                UpdateUser {
                    first_name: Some(Some("Carol".to_string())),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.first_name.as_deref(), Some("Carol"));

        let cleared = users
            .update(
                created.id,
                UpdateUser {
                    first_name: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cleared.first_name, None);
    }

    #[tokio::test]
    async fn search_filters_by_username_substring() {
        let db = test_pool().await;
        let users = db.users();
        let actor = users.create(sample("actor@example.com", None)).await.unwrap();
        users
            .create(sample("dana@example.com", Some("dana_w")))
            .await
            .unwrap();
        users
            .create(sample("ed@example.com", Some("edward")))
            .await
            .unwrap();

        let filter = UserFilter {
            username: Some("dana".to_string()),
            ..Default::default()
        };
        let found = users.search(&filter, actor.id).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user.username.as_deref(), Some("dana_w"));
        assert!(!found[0].is_following);
        assert!(!found[0].subscribed);
    }

    #[tokio::test]
    async fn refresh_token_lifecycle() {
        let db = test_pool().await;
        let users = db.users();
        let user = users.create(sample("tok@example.com", None)).await.unwrap();

        users
            .create_refresh_token("jti-1", user.id, "hash-1", "2099-01-01T00:00:00+00:00")
            .await
            .unwrap();

        let found = users.get_refresh_token_by_hash("hash-1").await.unwrap();
        assert_eq!(found.unwrap().user_id, user.id);

        assert!(users.delete_refresh_token("jti-1").await.unwrap());
        assert!(
            users
                .get_refresh_token_by_hash("hash-1")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn expired_refresh_tokens_are_purged() {
        let db = test_pool().await;
        let users = db.users();
        let user = users.create(sample("purge@example.com", None)).await.unwrap();

        users
            .create_refresh_token("jti-old", user.id, "hash-old", "2000-01-01T00:00:00+00:00")
            .await
            .unwrap();
        users
            .create_refresh_token("jti-new", user.id, "hash-new", "2099-01-01T00:00:00+00:00")
            .await
            .unwrap();

        let purged = users.cleanup_expired_refresh_tokens().await.unwrap();
        assert_eq!(purged, 1);
        assert!(
            users
                .get_refresh_token_by_hash("hash-new")
                .await
                .unwrap()
                .is_some()
        );
    }
}

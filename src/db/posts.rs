//! Posts repository
//!
//! Owns posts, their hashtag attachments, and likes. Create and update touch
//! several tables (post row, hashtag rows, join rows) and run inside one
//! transaction each, mirroring the like/unlike check-then-write pattern used
//! for follow edges.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use super::Pool;
use super::sqlite_helpers::{int_to_bool, now_iso8601, today_iso8601};

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: i64,
    pub title: String,
    pub text: String,
    pub image_url: Option<String>,
    pub owner_id: i64,
    pub created_date: String,
}

/// Post row with the annotations the list/detail endpoints render.
#[derive(Debug, Clone)]
pub struct AnnotatedPost {
    pub post: PostRecord,
    pub owner_name: String,
    pub hashtags: Vec<String>,
    pub comments_count: i64,
    pub likes_count: i64,
}

#[derive(Debug, Clone)]
pub struct CreatePost {
    pub title: String,
    pub text: String,
    pub image_url: Option<String>,
    pub owner_id: i64,
    /// Names of hashtags that must already exist.
    pub hashtags: Vec<String>,
    /// Names created on the fly if missing.
    pub new_hashtags: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdatePost {
    pub title: Option<String>,
    pub text: Option<String>,
    pub image_url: Option<Option<String>>,
    /// When set, the post's hashtag attachments are replaced with this set
    /// (existing names) plus `new_hashtags` (created if missing).
    pub hashtags: Option<Vec<String>>,
    pub new_hashtags: Vec<String>,
}

/// Post list filters
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    /// Any-match on lowercased hashtag names.
    pub hashtags: Vec<String>,
    /// Exact author username.
    pub author: Option<String>,
    /// Title substring, case-insensitive.
    pub title: Option<String>,
}

/// Outcome of a like call. Repeats are reported, not errored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOutcome {
    Liked,
    AlreadyLiked,
}

/// Outcome of an unlike call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlikeOutcome {
    Unliked,
    NotLiked,
}

// ============================================================================
// Repository
// ============================================================================

const ANNOTATED_COLUMNS: &str = "p.id, p.title, p.text, p.image_url, p.owner_id, p.created_date, \
     COALESCE(u.username, CASE WHEN u.first_name IS NOT NULL AND u.last_name IS NOT NULL \
         THEN u.first_name || ' ' || u.last_name ELSE u.email END) AS owner_name, \
     (SELECT group_concat(hashtag_name, ',') FROM post_hashtags WHERE post_id = p.id) AS hashtags, \
     (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comments_count, \
     (SELECT COUNT(*) FROM post_likes l WHERE l.post_id = p.id) AS likes_count";

type AnnotatedRow = (
    i64,
    String,
    String,
    Option<String>,
    i64,
    String,
    String,
    Option<String>,
    i64,
    i64,
);

fn row_to_annotated(r: AnnotatedRow) -> AnnotatedPost {
    let mut hashtags: Vec<String> = r
        .7
        .map(|s| s.split(',').map(String::from).collect())
        .unwrap_or_default();
    // group_concat order is unspecified
    hashtags.sort();

    AnnotatedPost {
        post: PostRecord {
            id: r.0,
            title: r.1,
            text: r.2,
            image_url: r.3,
            owner_id: r.4,
            created_date: r.5,
        },
        owner_name: r.6,
        hashtags,
        comments_count: r.8,
        likes_count: r.9,
    }
}

pub struct PostsRepository {
    pool: Pool,
}

impl PostsRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // Post CRUD
    // ========================================================================

    /// Create a post and attach its hashtags in one transaction. Names in
    /// `hashtags` must exist; names in `new_hashtags` are created if missing.
    pub async fn create(&self, post: CreatePost) -> Result<PostRecord> {
        let created_date = today_iso8601();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO posts (title, text, image_url, owner_id, created_date) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&post.title)
        .bind(&post.text)
        .bind(&post.image_url)
        .bind(post.owner_id)
        .bind(&created_date)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        for name in &post.new_hashtags {
            sqlx::query("INSERT OR IGNORE INTO hashtags (name) VALUES (?)")
                .bind(name)
                .execute(&mut *tx)
                .await?;
            sqlx::query("INSERT OR IGNORE INTO post_hashtags (post_id, hashtag_name) VALUES (?, ?)")
                .bind(id)
                .bind(name)
                .execute(&mut *tx)
                .await?;
        }
        for name in &post.hashtags {
            let exists = sqlx::query_as::<_, (i64,)>("SELECT 1 FROM hashtags WHERE name = ?")
                .bind(name)
                .fetch_optional(&mut *tx)
                .await?;
            if exists.is_none() {
                tx.rollback().await?;
                return Err(anyhow!("Unknown hashtag: {}", name));
            }
            sqlx::query("INSERT OR IGNORE INTO post_hashtags (post_id, hashtag_name) VALUES (?, ?)")
                .bind(id)
                .bind(name)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(PostRecord {
            id,
            title: post.title,
            text: post.text,
            image_url: post.image_url,
            owner_id: post.owner_id,
            created_date,
        })
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<PostRecord>> {
        let row = sqlx::query_as::<_, (i64, String, String, Option<String>, i64, String)>(
            "SELECT id, title, text, image_url, owner_id, created_date FROM posts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| PostRecord {
            id: r.0,
            title: r.1,
            text: r.2,
            image_url: r.3,
            owner_id: r.4,
            created_date: r.5,
        }))
    }

    pub async fn get_by_title(&self, title: &str) -> Result<Option<PostRecord>> {
        let row = sqlx::query_as::<_, (i64, String, String, Option<String>, i64, String)>(
            "SELECT id, title, text, image_url, owner_id, created_date FROM posts WHERE title = ?",
        )
        .bind(title)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| PostRecord {
            id: r.0,
            title: r.1,
            text: r.2,
            image_url: r.3,
            owner_id: r.4,
            created_date: r.5,
        }))
    }

    /// Get a post with owner name, hashtags, and counts.
    pub async fn get_annotated(&self, id: i64) -> Result<Option<AnnotatedPost>> {
        let row = sqlx::query_as::<_, AnnotatedRow>(&format!(
            "SELECT {ANNOTATED_COLUMNS} FROM posts p JOIN users u ON u.id = p.owner_id \
             WHERE p.id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_annotated))
    }

    /// List posts newest-first with annotations, applying the given filters.
    pub async fn list(&self, filter: &PostFilter) -> Result<Vec<AnnotatedPost>> {
        let mut sql = format!(
            "SELECT {ANNOTATED_COLUMNS} FROM posts p JOIN users u ON u.id = p.owner_id WHERE 1=1"
        );
        let mut binds: Vec<String> = Vec::new();

        if !filter.hashtags.is_empty() {
            let placeholders = vec!["?"; filter.hashtags.len()].join(", ");
            sql.push_str(&format!(
                " AND p.id IN (SELECT post_id FROM post_hashtags WHERE hashtag_name IN ({}))",
                placeholders
            ));
            for tag in &filter.hashtags {
                binds.push(tag.to_lowercase());
            }
        }
        if let Some(author) = &filter.author {
            sql.push_str(" AND u.username = ?");
            binds.push(author.clone());
        }
        if let Some(title) = &filter.title {
            sql.push_str(" AND p.title LIKE ?");
            binds.push(format!("%{}%", title));
        }
        sql.push_str(" ORDER BY p.created_date DESC, p.id DESC");

        let mut query = sqlx::query_as::<_, AnnotatedRow>(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        let rows = query.fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(row_to_annotated).collect())
    }

    /// Update a post and, when requested, replace its hashtag set, in one
    /// transaction.
    pub async fn update(&self, id: i64, update: UpdatePost) -> Result<Option<PostRecord>> {
        let mut tx = self.pool.begin().await?;

        if let Some(title) = &update.title {
            sqlx::query("UPDATE posts SET title = ? WHERE id = ?")
                .bind(title)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        if let Some(text) = &update.text {
            sqlx::query("UPDATE posts SET text = ? WHERE id = ?")
                .bind(text)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        if let Some(image_url) = &update.image_url {
            sqlx::query("UPDATE posts SET image_url = ? WHERE id = ?")
                .bind(image_url)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(hashtags) = &update.hashtags {
            sqlx::query("DELETE FROM post_hashtags WHERE post_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            for name in &update.new_hashtags {
                sqlx::query("INSERT OR IGNORE INTO hashtags (name) VALUES (?)")
                    .bind(name)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query(
                    "INSERT OR IGNORE INTO post_hashtags (post_id, hashtag_name) VALUES (?, ?)",
                )
                .bind(id)
                .bind(name)
                .execute(&mut *tx)
                .await?;
            }
            for name in hashtags {
                let exists = sqlx::query_as::<_, (i64,)>("SELECT 1 FROM hashtags WHERE name = ?")
                    .bind(name)
                    .fetch_optional(&mut *tx)
                    .await?;
                if exists.is_none() {
                    tx.rollback().await?;
                    return Err(anyhow!("Unknown hashtag: {}", name));
                }
                sqlx::query(
                    "INSERT OR IGNORE INTO post_hashtags (post_id, hashtag_name) VALUES (?, ?)",
                )
                .bind(id)
                .bind(name)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        self.get_by_id(id).await
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Likes
    // ========================================================================

    /// Like a post. Idempotent: an existing like reports `AlreadyLiked`.
    pub async fn like(&self, post_id: i64, user_id: i64) -> Result<LikeOutcome> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, (i64,)>(
            "SELECT 1 FROM post_likes WHERE post_id = ? AND user_id = ?",
        )
        .bind(post_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        if existing.is_some() {
            tx.rollback().await?;
            return Ok(LikeOutcome::AlreadyLiked);
        }

        sqlx::query("INSERT INTO post_likes (post_id, user_id, created_at) VALUES (?, ?, ?)")
            .bind(post_id)
            .bind(user_id)
            .bind(now_iso8601())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(LikeOutcome::Liked)
    }

    /// Remove a like. Idempotent: a missing like reports `NotLiked`.
    pub async fn unlike(&self, post_id: i64, user_id: i64) -> Result<UnlikeOutcome> {
        let result = sqlx::query("DELETE FROM post_likes WHERE post_id = ? AND user_id = ?")
            .bind(post_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            Ok(UnlikeOutcome::Unliked)
        } else {
            Ok(UnlikeOutcome::NotLiked)
        }
    }

    pub async fn has_liked(&self, post_id: i64, user_id: i64) -> Result<bool> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT 1 FROM post_likes WHERE post_id = ? AND user_id = ?",
        )
        .bind(post_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::test_pool;
    use crate::db::users::CreateUser;

    async fn user(db: &crate::db::Database, email: &str, username: Option<&str>) -> i64 {
        db.users()
            .create(CreateUser {
                email: email.to_string(),
                username: username.map(String::from),
                password_hash: "hash".to_string(),
                first_name: None,
                last_name: None,
                birth_date: None,
                residence_place_id: None,
                photo_url: None,
            })
            .await
            .unwrap()
            .id
    }

    fn new_post(owner_id: i64, title: &str) -> CreatePost {
        CreatePost {
            title: title.to_string(),
            text: "body".to_string(),
            image_url: None,
            owner_id,
            hashtags: Vec::new(),
            new_hashtags: Vec::new(),
        }
    }

    #[tokio::test]
    async fn create_attaches_new_hashtags() {
        let db = test_pool().await;
        let posts = db.posts();
        let owner = user(&db, "o@example.com", Some("owner")).await;

        let created = posts
            .create(CreatePost {
                new_hashtags: vec!["rust".to_string(), "news".to_string()],
                ..new_post(owner, "Hello")
            })
            .await
            .unwrap();

        let annotated = posts.get_annotated(created.id).await.unwrap().unwrap();
        assert_eq!(annotated.hashtags, vec!["news", "rust"]);
        assert_eq!(annotated.owner_name, "owner");
        assert_eq!(annotated.comments_count, 0);
        assert_eq!(annotated.likes_count, 0);
    }

    #[tokio::test]
    async fn create_rejects_unknown_existing_hashtag() {
        let db = test_pool().await;
        let posts = db.posts();
        let owner = user(&db, "o@example.com", None).await;

        let err = posts
            .create(CreatePost {
                hashtags: vec!["missing".to_string()],
                ..new_post(owner, "Hello")
            })
            .await;
        assert!(err.is_err());
        // The whole create rolled back: no post row either.
        assert!(posts.get_by_title("Hello").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_filters_by_hashtag_author_and_title() {
        let db = test_pool().await;
        let posts = db.posts();
        let alice = user(&db, "alice@example.com", Some("alice")).await;
        let bob = user(&db, "bob@example.com", Some("bob")).await;

        posts
            .create(CreatePost {
                new_hashtags: vec!["rust".to_string()],
                ..new_post(alice, "Rust tips")
            })
            .await
            .unwrap();
        posts
            .create(CreatePost {
                new_hashtags: vec!["cooking".to_string()],
                ..new_post(bob, "Pasta night")
            })
            .await
            .unwrap();

        let by_tag = posts
            .list(&PostFilter {
                hashtags: vec!["RUST".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_tag.len(), 1);
        assert_eq!(by_tag[0].post.title, "Rust tips");

        let by_author = posts
            .list(&PostFilter {
                author: Some("bob".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_author.len(), 1);
        assert_eq!(by_author[0].post.title, "Pasta night");

        let by_title = posts
            .list(&PostFilter {
                title: Some("pasta".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_title.len(), 1);
    }

    #[tokio::test]
    async fn update_replaces_hashtag_set() {
        let db = test_pool().await;
        let posts = db.posts();
        let owner = user(&db, "o@example.com", None).await;
        let created = posts
            .create(CreatePost {
                new_hashtags: vec!["old".to_string()],
                ..new_post(owner, "Post")
            })
            .await
            .unwrap();

        posts
            .update(
                created.id,
                UpdatePost {
                    hashtags: Some(Vec::new()),
                    new_hashtags: vec!["fresh".to_string()],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let annotated = posts.get_annotated(created.id).await.unwrap().unwrap();
        assert_eq!(annotated.hashtags, vec!["fresh"]);
    }

    #[tokio::test]
    async fn like_is_idempotent() {
        let db = test_pool().await;
        let posts = db.posts();
        let owner = user(&db, "o@example.com", None).await;
        let reader = user(&db, "r@example.com", None).await;
        let post = posts.create(new_post(owner, "Post")).await.unwrap();

        assert_eq!(posts.like(post.id, reader).await.unwrap(), LikeOutcome::Liked);
        assert_eq!(
            posts.like(post.id, reader).await.unwrap(),
            LikeOutcome::AlreadyLiked
        );

        let annotated = posts.get_annotated(post.id).await.unwrap().unwrap();
        assert_eq!(annotated.likes_count, 1);

        assert_eq!(
            posts.unlike(post.id, reader).await.unwrap(),
            UnlikeOutcome::Unliked
        );
        assert_eq!(
            posts.unlike(post.id, reader).await.unwrap(),
            UnlikeOutcome::NotLiked
        );
    }
}

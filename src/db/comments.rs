//! Comments repository

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::Pool;
use super::sqlite_helpers::today_iso8601;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: i64,
    pub post_id: i64,
    pub owner_id: i64,
    pub text: String,
    pub created_date: String,
}

/// Comment joined with its owner's display fields, for post detail reads.
#[derive(Debug, Clone)]
pub struct CommentWithOwner {
    pub comment: CommentRecord,
    pub owner_name: String,
}

pub struct CommentsRepository {
    pool: Pool,
}

impl CommentsRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, post_id: i64, owner_id: i64, text: &str) -> Result<CommentRecord> {
        let created_date = today_iso8601();
        let result = sqlx::query(
            "INSERT INTO comments (post_id, owner_id, text, created_date) VALUES (?, ?, ?, ?)",
        )
        .bind(post_id)
        .bind(owner_id)
        .bind(text)
        .bind(&created_date)
        .execute(&self.pool)
        .await?;

        Ok(CommentRecord {
            id: result.last_insert_rowid(),
            post_id,
            owner_id,
            text: text.to_string(),
            created_date,
        })
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<CommentRecord>> {
        let row = sqlx::query_as::<_, (i64, i64, i64, String, String)>(
            "SELECT id, post_id, owner_id, text, created_date FROM comments WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| CommentRecord {
            id: r.0,
            post_id: r.1,
            owner_id: r.2,
            text: r.3,
            created_date: r.4,
        }))
    }

    pub async fn update_text(&self, id: i64, text: &str) -> Result<Option<CommentRecord>> {
        sqlx::query("UPDATE comments SET text = ? WHERE id = ?")
            .bind(text)
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.get_by_id(id).await
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Comments on a post, oldest first, with owner display fields resolved.
    pub async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentWithOwner>> {
        let rows = sqlx::query_as::<
            _,
            (
                i64,
                i64,
                i64,
                String,
                String,
                Option<String>,
                Option<String>,
                Option<String>,
                String,
            ),
        >(
            "SELECT c.id, c.post_id, c.owner_id, c.text, c.created_date, \
                    u.username, u.first_name, u.last_name, u.email \
             FROM comments c JOIN users u ON u.id = c.owner_id \
             WHERE c.post_id = ? ORDER BY c.id",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let owner_name = match (r.5, r.6, r.7) {
                    (Some(username), _, _) => username,
                    (None, Some(first), Some(last)) => format!("{} {}", first, last),
                    _ => r.8,
                };
                CommentWithOwner {
                    comment: CommentRecord {
                        id: r.0,
                        post_id: r.1,
                        owner_id: r.2,
                        text: r.3,
                        created_date: r.4,
                    },
                    owner_name,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::db::users::CreateUser;

    #[tokio::test]
    async fn lifecycle_and_owner_name_fallback() {
        let db = test_pool().await;
        let owner = db
            .users()
            .create(CreateUser {
                email: "no-username@example.com".to_string(),
                username: None,
                password_hash: "hash".to_string(),
                first_name: Some("Ada".to_string()),
                last_name: Some("Lovelace".to_string()),
                birth_date: None,
                residence_place_id: None,
                photo_url: None,
            })
            .await
            .unwrap();
        let post = db
            .posts()
            .create(crate::db::CreatePost {
                title: "Commented".to_string(),
                text: "body".to_string(),
                image_url: None,
                owner_id: owner.id,
                hashtags: Vec::new(),
                new_hashtags: Vec::new(),
            })
            .await
            .unwrap();

        let comments = db.comments();
        let created = comments.create(post.id, owner.id, "nice one").await.unwrap();

        let listed = comments.list_for_post(post.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].comment.text, "nice one");
        // No username set, so the owner renders as "first last".
        assert_eq!(listed[0].owner_name, "Ada Lovelace");

        comments.update_text(created.id, "edited").await.unwrap();
        assert_eq!(
            comments.get_by_id(created.id).await.unwrap().unwrap().text,
            "edited"
        );

        assert!(comments.delete(created.id).await.unwrap());
        assert!(comments.list_for_post(post.id).await.unwrap().is_empty());
    }
}

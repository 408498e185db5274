//! Scheduled post queue
//!
//! Deferred publications live here until the scheduler job drains them.
//! Hashtag names are stored as a JSON array in a TEXT column.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::Pool;
use super::sqlite_helpers::{json_to_vec, now_iso8601, vec_to_json};

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_PUBLISHED: &str = "published";
pub const STATUS_FAILED: &str = "failed";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledPostRecord {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub text: String,
    pub image_url: Option<String>,
    pub hashtags: Vec<String>,
    pub publish_at: String,
    pub status: String,
    pub error: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct CreateScheduledPost {
    pub owner_id: i64,
    pub title: String,
    pub text: String,
    pub image_url: Option<String>,
    pub hashtags: Vec<String>,
    pub publish_at: String,
}

type ScheduledRow = (
    i64,
    i64,
    String,
    String,
    Option<String>,
    String,
    String,
    String,
    Option<String>,
    String,
);

fn row_to_record(r: ScheduledRow) -> ScheduledPostRecord {
    ScheduledPostRecord {
        id: r.0,
        owner_id: r.1,
        title: r.2,
        text: r.3,
        image_url: r.4,
        hashtags: json_to_vec(&r.5),
        publish_at: r.6,
        status: r.7,
        error: r.8,
        created_at: r.9,
    }
}

pub struct ScheduledPostsRepository {
    pool: Pool,
}

impl ScheduledPostsRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, entry: CreateScheduledPost) -> Result<ScheduledPostRecord> {
        let now = now_iso8601();
        let hashtags_json = vec_to_json(&entry.hashtags);

        let result = sqlx::query(
            r#"
            INSERT INTO scheduled_posts (owner_id, title, text, image_url, hashtags,
                                         publish_at, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(entry.owner_id)
        .bind(&entry.title)
        .bind(&entry.text)
        .bind(&entry.image_url)
        .bind(&hashtags_json)
        .bind(&entry.publish_at)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(ScheduledPostRecord {
            id: result.last_insert_rowid(),
            owner_id: entry.owner_id,
            title: entry.title,
            text: entry.text,
            image_url: entry.image_url,
            hashtags: entry.hashtags,
            publish_at: entry.publish_at,
            status: STATUS_PENDING.to_string(),
            error: None,
            created_at: now,
        })
    }

    /// Pending entries whose publish time has passed, oldest first.
    pub async fn list_due(&self, now: &str) -> Result<Vec<ScheduledPostRecord>> {
        let rows = sqlx::query_as::<_, ScheduledRow>(
            "SELECT id, owner_id, title, text, image_url, hashtags, publish_at, status, error, created_at \
             FROM scheduled_posts WHERE status = 'pending' AND publish_at <= ? \
             ORDER BY publish_at, id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_record).collect())
    }

    pub async fn list_for_owner(&self, owner_id: i64) -> Result<Vec<ScheduledPostRecord>> {
        let rows = sqlx::query_as::<_, ScheduledRow>(
            "SELECT id, owner_id, title, text, image_url, hashtags, publish_at, status, error, created_at \
             FROM scheduled_posts WHERE owner_id = ? ORDER BY publish_at, id",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_record).collect())
    }

    pub async fn mark_published(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE scheduled_posts SET status = 'published', error = NULL WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: i64, error: &str) -> Result<()> {
        sqlx::query("UPDATE scheduled_posts SET status = 'failed', error = ? WHERE id = ?")
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

//! Scheduled post publication worker
//!
//! Drains pending queue entries whose publish time has passed. Each entry
//! becomes a real post with its hashtags attached (created if missing) in one
//! transaction; a failed entry is marked failed with the error and never
//! retried.

use anyhow::{Result, anyhow};
use tracing::{error, info};

use crate::db::sqlite_helpers::now_iso8601;
use crate::db::{CreatePost, Database, PostRecord, ScheduledPostRecord};

/// Publish all due pending entries. Returns how many were published.
pub async fn publish_due(db: &Database) -> Result<usize> {
    let due = db.scheduled_posts().list_due(&now_iso8601()).await?;
    if due.is_empty() {
        return Ok(0);
    }

    let mut published = 0;
    for entry in due {
        let entry_id = entry.id;
        match publish_one(db, entry).await {
            Ok(post) => {
                db.scheduled_posts().mark_published(entry_id).await?;
                info!(post_id = post.id, "Published scheduled post '{}'", post.title);
                published += 1;
            }
            Err(e) => {
                error!("Error publishing scheduled post {}: {}", entry_id, e);
                db.scheduled_posts().mark_failed(entry_id, &e.to_string()).await?;
            }
        }
    }
    Ok(published)
}

async fn publish_one(db: &Database, entry: ScheduledPostRecord) -> Result<PostRecord> {
    let owner = db
        .users()
        .get_by_id(entry.owner_id)
        .await?
        .ok_or_else(|| anyhow!("Owner {} no longer exists", entry.owner_id))?;

    if db.posts().get_by_title(&entry.title).await?.is_some() {
        return Err(anyhow!("A post with title '{}' already exists", entry.title));
    }

    db.posts()
        .create(CreatePost {
            title: entry.title,
            text: entry.text,
            image_url: entry.image_url,
            owner_id: owner.id,
            hashtags: Vec::new(),
            new_hashtags: entry.hashtags,
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CreateScheduledPost, CreateUser, test_pool};

    async fn owner(db: &Database) -> i64 {
        db.users()
            .create(CreateUser {
                email: "pub@example.com".to_string(),
                username: Some("publisher".to_string()),
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

    fn entry(owner_id: i64, title: &str, publish_at: &str) -> CreateScheduledPost {
        CreateScheduledPost {
            owner_id,
            title: title.to_string(),
            text: "scheduled body".to_string(),
            image_url: None,
            hashtags: vec!["queued".to_string()],
            publish_at: publish_at.to_string(),
        }
    }

    #[tokio::test]
    async fn due_entries_become_posts_with_hashtags() {
        let db = test_pool().await;
        let owner_id = owner(&db).await;
        db.scheduled_posts()
            .create(entry(owner_id, "Deferred", "2020-01-01T00:00:00+00:00"))
            .await
            .unwrap();
        db.scheduled_posts()
            .create(entry(owner_id, "Future", "2099-01-01T00:00:00+00:00"))
            .await
            .unwrap();

        let published = publish_due(&db).await.unwrap();
        assert_eq!(published, 1);

        let post = db.posts().get_by_title("Deferred").await.unwrap().unwrap();
        let annotated = db.posts().get_annotated(post.id).await.unwrap().unwrap();
        assert_eq!(annotated.hashtags, vec!["queued"]);

        // The future entry stays pending, the due one is marked published.
        let remaining = db.scheduled_posts().list_for_owner(owner_id).await.unwrap();
        let statuses: Vec<_> = remaining
            .iter()
            .map(|e| (e.title.as_str(), e.status.as_str()))
            .collect();
        assert!(statuses.contains(&("Deferred", "published")));
        assert!(statuses.contains(&("Future", "pending")));
    }

    #[tokio::test]
    async fn duplicate_title_marks_entry_failed() {
        let db = test_pool().await;
        let owner_id = owner(&db).await;

        db.posts()
            .create(CreatePost {
                title: "Taken".to_string(),
                text: "existing".to_string(),
                image_url: None,
                owner_id,
                hashtags: Vec::new(),
                new_hashtags: Vec::new(),
            })
            .await
            .unwrap();
        db.scheduled_posts()
            .create(entry(owner_id, "Taken", "2020-01-01T00:00:00+00:00"))
            .await
            .unwrap();

        let published = publish_due(&db).await.unwrap();
        assert_eq!(published, 0);

        let entries = db.scheduled_posts().list_for_owner(owner_id).await.unwrap();
        assert_eq!(entries[0].status, "failed");
        assert!(entries[0].error.as_deref().unwrap().contains("Taken"));
    }

    #[tokio::test]
    async fn publish_is_not_retried_after_failure() {
        let db = test_pool().await;
        let owner_id = owner(&db).await;
        let created = db
            .scheduled_posts()
            .create(entry(owner_id, "Once", "2020-01-01T00:00:00+00:00"))
            .await
            .unwrap();
        db.scheduled_posts()
            .mark_failed(created.id, "boom")
            .await
            .unwrap();

        let published = publish_due(&db).await.unwrap();
        assert_eq!(published, 0);
        assert!(db.posts().get_by_title("Once").await.unwrap().is_none());
    }
}

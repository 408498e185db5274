//! Hashtag repository
//!
//! Hashtag names are the primary key: lowercase, 1-50 chars of letters,
//! digits and underscores. Normalization strips a leading '#'.

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;

use super::Pool;

static HASHTAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9_]{1,50}$").unwrap());

/// Normalize a raw hashtag to its stored form, or None if it is not a legal
/// hashtag name.
pub fn normalize_hashtag(raw: &str) -> Option<String> {
    let name = raw.trim().trim_start_matches('#').to_lowercase();
    if HASHTAG_RE.is_match(&name) {
        Some(name)
    } else {
        None
    }
}

pub struct HashtagsRepository {
    pool: Pool,
}

impl HashtagsRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        let row = sqlx::query_as::<_, (i64,)>("SELECT 1 FROM hashtags WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Insert the hashtag if missing. Idempotent.
    pub async fn get_or_create(&self, name: &str) -> Result<String> {
        sqlx::query("INSERT OR IGNORE INTO hashtags (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(name.to_string())
    }

    pub async fn list_all(&self) -> Result<Vec<String>> {
        let rows = sqlx::query_as::<_, (String,)>("SELECT name FROM hashtags ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_lowercases_and_strips_hash() {
        assert_eq!(normalize_hashtag("#Rustlang"), Some("rustlang".to_string()));
        assert_eq!(normalize_hashtag("  news  "), Some("news".to_string()));
        assert_eq!(normalize_hashtag("snake_case_42"), Some("snake_case_42".to_string()));
    }

    #[test]
    fn normalization_rejects_bad_names() {
        assert_eq!(normalize_hashtag(""), None);
        assert_eq!(normalize_hashtag("#"), None);
        assert_eq!(normalize_hashtag("two words"), None);
        assert_eq!(normalize_hashtag(&"x".repeat(51)), None);
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let db = crate::db::test_pool().await;
        let hashtags = db.hashtags();

        hashtags.get_or_create("rust").await.unwrap();
        hashtags.get_or_create("rust").await.unwrap();
        assert_eq!(hashtags.list_all().await.unwrap(), vec!["rust"]);
    }
}

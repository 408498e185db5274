//! Social graph repository
//!
//! A follow edge is a single row in `follows` keyed by
//! (follower_id, followee_id). Both projections — who a user follows and who
//! follows them — read the same table, so an edge is never half-visible.
//! Subscribe/unsubscribe run their check-then-write inside an explicit
//! transaction so concurrent duplicate requests serialize on the row.

use anyhow::Result;

use super::Pool;
use super::sqlite_helpers::now_iso8601;
use super::users::{UserRecord, UserRow, row_to_user};

/// Outcome of a subscribe call. Repeats are reported, not errored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribed,
    AlreadyFollowing,
}

/// Outcome of an unsubscribe call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    Unsubscribed,
    NotFollowing,
}

pub struct FollowsRepository {
    pool: Pool,
}

impl FollowsRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Add the directed edge follower -> followee. Idempotent: an existing
    /// edge reports `AlreadyFollowing` and leaves the graph unchanged.
    pub async fn subscribe(&self, follower_id: i64, followee_id: i64) -> Result<SubscribeOutcome> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, (i64,)>(
            "SELECT 1 FROM follows WHERE follower_id = ? AND followee_id = ?",
        )
        .bind(follower_id)
        .bind(followee_id)
        .fetch_optional(&mut *tx)
        .await?;

        if existing.is_some() {
            tx.rollback().await?;
            return Ok(SubscribeOutcome::AlreadyFollowing);
        }

        sqlx::query("INSERT INTO follows (follower_id, followee_id, created_at) VALUES (?, ?, ?)")
            .bind(follower_id)
            .bind(followee_id)
            .bind(now_iso8601())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(SubscribeOutcome::Subscribed)
    }

    /// Remove the directed edge follower -> followee. Idempotent: a missing
    /// edge reports `NotFollowing` and leaves the graph unchanged.
    pub async fn unsubscribe(
        &self,
        follower_id: i64,
        followee_id: i64,
    ) -> Result<UnsubscribeOutcome> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM follows WHERE follower_id = ? AND followee_id = ?")
            .bind(follower_id)
            .bind(followee_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        if result.rows_affected() > 0 {
            Ok(UnsubscribeOutcome::Unsubscribed)
        } else {
            Ok(UnsubscribeOutcome::NotFollowing)
        }
    }

    /// Does the directed edge follower -> followee exist?
    pub async fn is_following(&self, follower_id: i64, followee_id: i64) -> Result<bool> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT 1 FROM follows WHERE follower_id = ? AND followee_id = ?",
        )
        .bind(follower_id)
        .bind(followee_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// Users following the given user (incoming edges), oldest edge first.
    pub async fn followers_of(&self, user_id: i64) -> Result<Vec<UserRecord>> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT u.id, u.email, u.username, u.password_hash, u.first_name, u.last_name, \
                    u.birth_date, u.residence_place_id, u.photo_url, u.is_staff, u.is_active, \
                    u.created_at, u.updated_at \
             FROM follows f JOIN users u ON u.id = f.follower_id \
             WHERE f.followee_id = ? ORDER BY f.created_at, u.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_user).collect())
    }

    /// Users the given user follows (outgoing edges), oldest edge first.
    pub async fn subscriptions_of(&self, user_id: i64) -> Result<Vec<UserRecord>> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT u.id, u.email, u.username, u.password_hash, u.first_name, u.last_name, \
                    u.birth_date, u.residence_place_id, u.photo_url, u.is_staff, u.is_active, \
                    u.created_at, u.updated_at \
             FROM follows f JOIN users u ON u.id = f.followee_id \
             WHERE f.follower_id = ? ORDER BY f.created_at, u.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_user).collect())
    }

    /// Ids of users following the given user.
    pub async fn follower_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        let rows = sqlx::query_as::<_, (i64,)>(
            "SELECT follower_id FROM follows WHERE followee_id = ? ORDER BY follower_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Ids of users the given user follows.
    pub async fn subscription_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        let rows = sqlx::query_as::<_, (i64,)>(
            "SELECT followee_id FROM follows WHERE follower_id = ? ORDER BY followee_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}

//! Database connection and operations
//!
//! One repository module per entity family; the [Database] wrapper hands out
//! repositories over a shared pool.

pub mod comments;
pub mod follows;
pub mod hashtags;
pub mod posts;
pub mod residences;
pub mod scheduled_posts;
pub mod seed;
pub mod sqlite_helpers;
pub mod users;

use anyhow::Result;

#[cfg(feature = "sqlite")]
use sqlx::SqlitePool as Pool;
#[cfg(feature = "sqlite")]
use sqlx::sqlite::SqlitePoolOptions as PoolOptions;

pub use comments::{CommentRecord, CommentWithOwner, CommentsRepository};
pub use follows::{FollowsRepository, SubscribeOutcome, UnsubscribeOutcome};
pub use hashtags::{HashtagsRepository, normalize_hashtag};
pub use posts::{
    AnnotatedPost, CreatePost, LikeOutcome, PostFilter, PostRecord, PostsRepository, UnlikeOutcome,
    UpdatePost,
};
pub use residences::{ResidencePlaceRecord, ResidencePlacesRepository};
pub use scheduled_posts::{CreateScheduledPost, ScheduledPostRecord, ScheduledPostsRepository};
pub use seed::run_seeds;
pub use users::{
    AnnotatedUser, CreateUser, RefreshTokenRecord, UpdateUser, UserFilter, UserRecord,
    UsersRepository,
};

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: Pool,
}

impl Database {
    /// Create a new database wrapper from an existing pool
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Get the maximum connection pool size from environment or default
    fn get_max_connections() -> u32 {
        std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10)
    }

    /// Create a new database connection pool
    pub async fn connect(url: &str) -> Result<Self> {
        let max_connections = Self::get_max_connections();
        let pool = PoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    /// Get the connection pool
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Get a users repository
    pub fn users(&self) -> UsersRepository {
        UsersRepository::new(self.pool.clone())
    }

    /// Get a social graph repository
    pub fn follows(&self) -> FollowsRepository {
        FollowsRepository::new(self.pool.clone())
    }

    /// Get a posts repository
    pub fn posts(&self) -> PostsRepository {
        PostsRepository::new(self.pool.clone())
    }

    /// Get a comments repository
    pub fn comments(&self) -> CommentsRepository {
        CommentsRepository::new(self.pool.clone())
    }

    /// Get a hashtags repository
    pub fn hashtags(&self) -> HashtagsRepository {
        HashtagsRepository::new(self.pool.clone())
    }

    /// Get a residence places repository
    pub fn residence_places(&self) -> ResidencePlacesRepository {
        ResidencePlacesRepository::new(self.pool.clone())
    }

    /// Get a scheduled posts repository
    pub fn scheduled_posts(&self) -> ScheduledPostsRepository {
        ScheduledPostsRepository::new(self.pool.clone())
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// In-memory database with the full schema applied, for tests.
#[cfg(test)]
pub async fn test_pool() -> Database {
    let pool = PoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    let db = Database::new(pool);
    db.migrate().await.expect("migrations");
    db
}

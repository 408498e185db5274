//! Application configuration management

use std::env;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host (for generating URLs)
    pub host: Option<String>,

    /// Server port
    pub port: u16,

    /// Database URL. For SQLite use a sqlite: URL, e.g.
    /// sqlite:./data/flock.db?mode=rwc
    pub database_url: String,

    /// JWT secret for token signing and verification
    pub jwt_secret: String,

    /// Run idempotent reference-data seeding at startup
    pub seed_on_startup: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:./data/flock.db?mode=rwc".to_string());

        // JWT_SECRET should be set explicitly in production; a random
        // per-process secret keeps development working out of the box.
        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
            use std::collections::hash_map::DefaultHasher;
            use std::hash::{Hash, Hasher};
            let mut hasher = DefaultHasher::new();
            std::time::SystemTime::now().hash(&mut hasher);
            format!("dev-secret-{}", hasher.finish())
        });

        Ok(Self {
            host: env::var("HOST").ok(),

            port: env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .context("Invalid PORT")?,

            database_url,

            jwt_secret,

            seed_on_startup: env::var("SEED_ON_STARTUP")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
        })
    }
}

//! Flock Backend - Rust-powered social network service
//!
//! This is the main entry point for the Flock backend API.
//! All operations are exposed as JSON REST endpoints under /api/v1.

mod api;
mod app;
mod config;
mod db;
mod jobs;
mod services;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use crate::app::AppState;
use crate::config::Config;
use crate::db::Database;
use crate::services::{AuthConfig, AuthService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first so everything below can use it
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    let config = Arc::new(config);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flock=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Flock Backend");

    // Database: connect, migrate, seed reference data
    let db = Database::connect(&config.database_url).await?;
    db.migrate().await?;
    tracing::info!("Database connected and migrated");

    if config.seed_on_startup {
        let seeded = db::run_seeds(db.pool()).await;
        if !seeded.errors.is_empty() {
            tracing::warn!("Seeding finished with {} errors", seeded.errors.len());
        }
    }

    // Auth service shares the JWT secret with token verification
    let auth = AuthService::new(
        db.clone(),
        AuthConfig {
            jwt_secret: config.jwt_secret.clone(),
            ..AuthConfig::from_env()
        },
    );

    // Start background jobs (scheduled post publisher, token purge)
    let _scheduler = jobs::start_scheduler(db.clone()).await?;

    let state = AppState {
        config: config.clone(),
        db,
        auth,
    };
    let app = app::build_app(state);

    let host = config.host.as_deref().unwrap_or("0.0.0.0");
    let addr: SocketAddr = format!("{}:{}", host, config.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

//! Application state and HTTP router construction.
//!
//! Used by [main](crate::main) to build the Axum app; tests build the same
//! router against an in-memory database.

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api;
use crate::config::Config;
use crate::db::Database;
use crate::services::AuthService;

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub auth: AuthService,
}

/// Build the /api/v1 router by merging all resource routers.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(api::token::router())
        .merge(api::users::router())
        .merge(api::me::router())
        .merge(api::posts::router())
}

/// Build the full Axum router: health probes, /api/v1, layers.
/// Returns Router<()> (state fully applied) for use with axum::serve.
pub fn build_app(state: AppState) -> Router<()> {
    Router::new()
        .merge(api::health::router())
        .nest("/api/v1", api_router())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

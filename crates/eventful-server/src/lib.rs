//! Eventful server library logic.

pub mod api;
pub mod config;

use axum::{routing::get, Extension, Json, Router};
use eventful_db::DbPool;
use eventful_feed::{FeedService, FeedSettings, SqliteStore};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// The feed service as served over HTTP.
pub type Feed = FeedService<SqliteStore, SqliteStore>;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Feed service over the same database.
    pub feed: Arc<Feed>,
}

impl AppState {
    pub fn new(pool: DbPool, settings: FeedSettings) -> Self {
        let store = Arc::new(SqliteStore::new(pool.clone()));
        let feed = Arc::new(FeedService::new(store.clone(), store, settings));
        Self { pool, feed }
    }
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/users/{id}/events", get(api::get_feed_handler))
        .route("/api/users/{id}", get(api::get_user_handler))
        .route("/api/events/{id}", get(api::get_event_handler))
        .route("/api/events/{id}/guests", get(api::get_event_guests_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}

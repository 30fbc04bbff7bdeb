//! mkws-api - Review API service
//!
//! Guild-scoped HTTP surface over the shared store:
//! - session/roster/war/stats endpoints for the web review front-end
//! - key-gated bulk-session endpoints for the bot worker
//! - background sweep expiring overdue sessions

pub mod auth;
pub mod error;
pub mod pagination;
pub mod routes;
pub mod sweep;

use axum::Router;
use mkws_common::config::Config;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: Config) -> Self {
        Self { db, config: Arc::new(config) }
    }
}

/// Build the application router.
///
/// Requests get a 30 second server timeout; bulk-session routes get 60
/// seconds since confirmation is bounded by batch size.
pub fn build_router(state: AppState) -> Router {
    use std::time::Duration;
    use tower_http::cors::{AllowOrigin, CorsLayer};
    use tower_http::timeout::TimeoutLayer;

    let origins: Vec<axum::http::HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    let standard = Router::new()
        .merge(routes::auth::router())
        .merge(routes::guilds::router())
        .merge(routes::players::router())
        .merge(routes::wars::router())
        .merge(routes::stats::router())
        .merge(routes::health::router())
        .layer(TimeoutLayer::new(Duration::from_secs(30)));

    let bulk = routes::bulk::router().layer(TimeoutLayer::new(Duration::from_secs(60)));

    Router::new().merge(standard).merge(bulk).layer(cors).with_state(state)
}

//! Health check

use crate::AppState;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "mkws-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

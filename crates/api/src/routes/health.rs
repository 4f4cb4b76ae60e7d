//! Health check endpoint.

use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::state::AppState;

/// Router for the root-level health check.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// GET /health
///
/// Liveness probe: reports the service name and version. The engine is
/// in-memory, so a responding process is a healthy process.
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

//! Shared helpers for API integration tests.
//!
//! Builds the full application router — same middleware stack as
//! production — over fresh in-memory registries, and drives it with
//! `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use gridwatch_api::config::ServerConfig;
use gridwatch_api::router::build_app_router;
use gridwatch_api::state::AppState;
use gridwatch_api::ws::WsManager;
use gridwatch_engine::{ChannelRegistry, PlayerTracker, SituationHub, UnitRegistry};
use gridwatch_events::{EventBus, HistoryLog};

/// Build a test `ServerConfig` with safe defaults: no api key, no history
/// file, generous liveness window.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        api_key: None,
        history_path: None,
        player_ttl_secs: 120,
    }
}

/// Build the full application router over fresh registries.
pub fn build_test_app() -> Router {
    build_app_with(test_config())
}

/// Build the app with a custom config (e.g. an api key enabled).
pub fn build_app_with(config: ServerConfig) -> Router {
    let bus = Arc::new(EventBus::default());
    let history = HistoryLog::disabled();

    let tracker = Arc::new(PlayerTracker::new(Arc::clone(&bus), history.clone()));
    let units = Arc::new(UnitRegistry::new(Arc::clone(&bus), history.clone()));
    let channels = Arc::new(ChannelRegistry::new(Arc::clone(&bus), history.clone()));
    let situations = Arc::new(SituationHub::new(
        Arc::clone(&channels),
        Arc::clone(&bus),
        history,
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        tracker,
        units,
        situations,
        channels,
        bus,
        ws_manager: Arc::new(WsManager::new()),
    };

    build_app_router(state, &config)
}

/// Send a GET request.
pub async fn get(app: &Router, path: &str) -> Response<Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .uri(path)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response")
}

/// Send a request with a JSON body and optional api key header.
pub async fn send_json(
    app: &Router,
    method: &str,
    path: &str,
    body: serde_json::Value,
    api_key: Option<&str>,
) -> Response<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header("content-type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    app.clone()
        .oneshot(builder.body(Body::from(body.to_string())).expect("request"))
        .await
        .expect("response")
}

pub async fn post_json(app: &Router, path: &str, body: serde_json::Value) -> Response<Body> {
    send_json(app, "POST", path, body, None).await
}

pub async fn put_json(app: &Router, path: &str, body: serde_json::Value) -> Response<Body> {
    send_json(app, "PUT", path, body, None).await
}

/// Send a DELETE request.
pub async fn delete(app: &Router, path: &str) -> Response<Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(path)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response")
}

/// Collect a response body into JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("valid json body")
}

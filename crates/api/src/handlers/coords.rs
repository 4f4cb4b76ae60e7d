//! Handlers for transmitter reports: positions, statuses, heartbeats.
//!
//! These are the hottest endpoints — every in-game transmitter posts here on
//! a short interval. Mutations require the shared secret via [`ApiKey`];
//! the alive-players query is open.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use gridwatch_core::{Timestamp, WorldPos};
use gridwatch_engine::Player;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::ApiKey;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CoordsReport {
    #[validate(length(min = 1, message = "nick must not be empty"))]
    pub nick: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub is_afk: bool,
    #[serde(default)]
    pub in_vehicle: bool,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    #[validate(length(min = 1, message = "nick must not be empty"))]
    pub nick: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatReport {
    #[validate(length(min = 1, message = "nick must not be empty"))]
    pub nick: String,
    #[serde(default)]
    pub is_afk: bool,
    #[serde(default)]
    pub in_vehicle: bool,
}

/// A player as shown to observers: the tracked record plus the effective
/// status (panic > situation membership > base status).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub nick: String,
    pub pos: Option<WorldPos>,
    pub is_afk: bool,
    pub in_vehicle: bool,
    pub panic: bool,
    pub status: String,
    pub last_update: Timestamp,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/coords
///
/// Combined transmitter report: position, vehicle state, and AFK flag.
pub async fn report(
    _key: ApiKey,
    State(state): State<AppState>,
    Json(input): Json<CoordsReport>,
) -> AppResult<impl IntoResponse> {
    input.validate().map_err(bad_request)?;

    let player = state
        .tracker
        .report(&input.nick, input.x, input.y, input.in_vehicle, input.is_afk)
        .await?;

    Ok(Json(DataResponse {
        data: player_view(&state, player).await,
    }))
}

/// POST /api/v1/coords/status
///
/// Free-text base status report. The response carries the effective status,
/// which situation membership or panic may override.
pub async fn status(
    _key: ApiKey,
    State(state): State<AppState>,
    Json(input): Json<StatusReport>,
) -> AppResult<impl IntoResponse> {
    input.validate().map_err(bad_request)?;

    let player = state.tracker.set_status(&input.nick, &input.status).await?;

    Ok(Json(DataResponse {
        data: player_view(&state, player).await,
    }))
}

/// POST /api/v1/coords/heartbeat
///
/// Lightweight liveness report; creates a placeholder player with an unknown
/// position on first contact.
pub async fn heartbeat(
    _key: ApiKey,
    State(state): State<AppState>,
    Json(input): Json<HeartbeatReport>,
) -> AppResult<impl IntoResponse> {
    input.validate().map_err(bad_request)?;

    let player = state
        .tracker
        .heartbeat(&input.nick, input.in_vehicle, input.is_afk)
        .await?;

    Ok(Json(DataResponse {
        data: player_view(&state, player).await,
    }))
}

/// GET /api/v1/coords/all
///
/// Point-in-time snapshot of players alive within the configured TTL.
pub async fn all(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let max_age = chrono::Duration::seconds(state.config.player_ttl_secs);
    let alive = state.tracker.alive_players(max_age).await;

    let mut views = Vec::with_capacity(alive.len());
    for player in alive {
        views.push(player_view(&state, player).await);
    }

    Ok(Json(DataResponse { data: views }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Compose the effective status: panic wins, then open-situation membership,
/// then the base status.
pub async fn effective_status(state: &AppState, player: &Player) -> String {
    if player.panic {
        return "PANIC".to_string();
    }
    match state.situations.status_for(&player.nick).await {
        Some(label) => label,
        None => player.base_status.clone(),
    }
}

pub async fn player_view(state: &AppState, player: Player) -> PlayerView {
    let status = effective_status(state, &player).await;
    PlayerView {
        nick: player.nick,
        pos: player.pos,
        is_afk: player.is_afk,
        in_vehicle: player.in_vehicle,
        panic: player.panic,
        status,
        last_update: player.last_update,
    }
}

pub fn bad_request(err: validator::ValidationErrors) -> AppError {
    AppError::BadRequest(err.to_string())
}

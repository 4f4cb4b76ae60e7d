//! Handlers for tactical channels.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::auth::ApiKey;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateChannel {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusyBody {
    pub is_busy: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachBody {
    pub situation_id: Option<Uuid>,
}

/// A channel as shown to observers, enriched with the title of the holding
/// situation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelView {
    pub id: Uuid,
    pub name: String,
    pub is_busy: bool,
    pub situation_id: Option<Uuid>,
    pub situation_title: Option<String>,
}

/// POST /api/v1/channels
pub async fn create(
    _key: ApiKey,
    State(state): State<AppState>,
    Json(input): Json<CreateChannel>,
) -> AppResult<impl IntoResponse> {
    let channel = state.channels.create(&input.name).await?;

    tracing::info!(channel_id = %channel.id, name = %channel.name, "Channel created");

    Ok((StatusCode::CREATED, Json(DataResponse { data: channel })))
}

/// GET /api/v1/channels
///
/// Lists all channels with the holding situation's title (metadata title,
/// falling back to the type label) resolved for display.
pub async fn list(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let channels = state.channels.get_all().await;

    let mut views = Vec::with_capacity(channels.len());
    for channel in channels {
        let situation_title = match channel.situation_id {
            Some(sid) => state
                .situations
                .get(sid)
                .await
                .map(|s| s.title.clone().unwrap_or_else(|| s.display_label())),
            None => None,
        };
        views.push(ChannelView {
            id: channel.id,
            name: channel.name,
            is_busy: channel.is_busy,
            situation_id: channel.situation_id,
            situation_title,
        });
    }

    Ok(Json(DataResponse { data: views }))
}

/// POST /api/v1/channels/{id}/busy
pub async fn set_busy(
    _key: ApiKey,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<BusyBody>,
) -> AppResult<impl IntoResponse> {
    let channel = state.channels.set_busy(id, input.is_busy).await?;

    Ok(Json(DataResponse { data: channel }))
}

/// POST /api/v1/channels/{id}/attach
///
/// Directly attach (or detach with `null`) a situation. Unlike the
/// best-effort metadata path, a busy conflict here surfaces as 409.
pub async fn attach(
    _key: ApiKey,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<AttachBody>,
) -> AppResult<impl IntoResponse> {
    let channel = state.channels.attach(id, input.situation_id).await?;

    Ok(Json(DataResponse { data: channel }))
}

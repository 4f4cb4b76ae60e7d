//! Handlers for the situation lifecycle.
//!
//! Thin wrappers over [`SituationHub`](gridwatch_engine::SituationHub): the
//! invariants (channel reconciliation, cascade release, lead promotion) all
//! live in the engine. Unit add/remove additionally mirrors the assignment
//! onto the unit record so its map marker can switch to the support style.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppResult;
use crate::handlers::coords::bad_request;
use crate::middleware::auth::ApiKey;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSituation {
    /// Free-form type code: `"pursuit"`, `"code7"`, `"Traffic Stop"`, ...
    #[serde(rename = "type")]
    #[validate(length(min = 1, message = "type must not be empty"))]
    pub kind: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NickBody {
    #[validate(length(min = 1, message = "nick must not be empty"))]
    pub nick: String,
}

#[derive(Debug, Deserialize)]
pub struct MetadataPatch {
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct LocationUpdate {
    pub location: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddUnitBody {
    pub unit_id: Uuid,
    #[serde(default)]
    pub as_lead_unit: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveUnitBody {
    pub unit_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PanicBody {
    pub nick: String,
    /// 0 clears the panic flag, anything else raises it.
    pub value: i64,
}

// ---------------------------------------------------------------------------
// Lifecycle handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/situations
pub async fn create(
    _key: ApiKey,
    State(state): State<AppState>,
    Json(input): Json<CreateSituation>,
) -> AppResult<impl IntoResponse> {
    input.validate().map_err(bad_request)?;

    let situation = state.situations.create(&input.kind, input.metadata).await?;

    tracing::info!(situation_id = %situation.id, kind = %situation.kind, "Situation created");

    Ok((StatusCode::CREATED, Json(DataResponse { data: situation })))
}

/// GET /api/v1/situations
pub async fn list(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(DataResponse {
        data: state.situations.get_all().await,
    }))
}

/// GET /api/v1/situations/{id}
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let situation = state
        .situations
        .get(id)
        .await
        .ok_or_else(|| gridwatch_core::CoreError::not_found("Situation", id))?;

    Ok(Json(DataResponse { data: situation }))
}

/// PUT /api/v1/situations/{id}/metadata
pub async fn update_metadata(
    _key: ApiKey,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<MetadataPatch>,
) -> AppResult<impl IntoResponse> {
    let situation = state.situations.update_metadata(id, input.metadata).await?;

    Ok(Json(DataResponse { data: situation }))
}

/// PUT /api/v1/situations/{id}/location
///
/// The canonical path for numeric geometry; producers that have coordinates
/// should prefer this over metadata updates.
pub async fn update_location(
    _key: ApiKey,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<LocationUpdate>,
) -> AppResult<impl IntoResponse> {
    let situation = state
        .situations
        .update_location(id, &input.location, input.x, input.y)
        .await?;

    Ok(Json(DataResponse { data: situation }))
}

/// POST /api/v1/situations/{id}/close
pub async fn close(
    _key: ApiKey,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let situation = state.situations.close(id).await?;

    tracing::info!(situation_id = %id, "Situation closed");

    Ok(Json(DataResponse { data: situation }))
}

/// POST /api/v1/situations/{id}/open
pub async fn open(
    _key: ApiKey,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let situation = state.situations.reopen(id).await?;

    Ok(Json(DataResponse { data: situation }))
}

/// DELETE /api/v1/situations/{id}
pub async fn delete(
    _key: ApiKey,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    state.situations.delete(id).await?;

    tracing::info!(situation_id = %id, "Situation deleted");

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Membership handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/situations/{id}/join
pub async fn join(
    _key: ApiKey,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<NickBody>,
) -> AppResult<impl IntoResponse> {
    input.validate().map_err(bad_request)?;

    let situation = state.situations.join(id, &input.nick).await?;

    Ok(Json(DataResponse { data: situation }))
}

/// POST /api/v1/situations/{id}/leave
pub async fn leave(
    _key: ApiKey,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<NickBody>,
) -> AppResult<impl IntoResponse> {
    input.validate().map_err(bad_request)?;

    let situation = state.situations.leave(id, &input.nick).await?;

    Ok(Json(DataResponse { data: situation }))
}

/// POST /api/v1/situations/{id}/units/add
pub async fn add_unit(
    _key: ApiKey,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<AddUnitBody>,
) -> AppResult<impl IntoResponse> {
    let situation = state
        .situations
        .add_unit(id, input.unit_id, input.as_lead_unit)
        .await?;

    // Mirror the assignment onto the unit record; a missing unit is logged,
    // not fatal (the situation keeps the id either way).
    if let Err(e) = state.units.set_situation(input.unit_id, Some(id)).await {
        tracing::debug!(unit_id = %input.unit_id, error = %e, "Unit assignment mirror skipped");
    }

    Ok(Json(DataResponse { data: situation }))
}

/// POST /api/v1/situations/{id}/units/remove
pub async fn remove_unit(
    _key: ApiKey,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<RemoveUnitBody>,
) -> AppResult<impl IntoResponse> {
    let situation = state.situations.remove_unit(id, input.unit_id).await?;

    if let Err(e) = state.units.set_situation(input.unit_id, None).await {
        tracing::debug!(unit_id = %input.unit_id, error = %e, "Unit assignment mirror skipped");
    }

    Ok(Json(DataResponse { data: situation }))
}

/// POST /api/v1/situations/panic
pub async fn panic(
    _key: ApiKey,
    State(state): State<AppState>,
    Json(input): Json<PanicBody>,
) -> AppResult<impl IntoResponse> {
    let player = state.tracker.set_panic(&input.nick, input.value != 0).await?;

    Ok(Json(DataResponse { data: player }))
}

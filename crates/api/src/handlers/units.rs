//! Handlers for units.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use gridwatch_core::Timestamp;
use gridwatch_engine::Unit;

use crate::error::AppResult;
use crate::handlers::coords::bad_request;
use crate::middleware::auth::ApiKey;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUnit {
    #[validate(length(min = 1, message = "marking must not be empty"))]
    pub marking: String,
    #[serde(default, rename = "playerNicks")]
    pub player_nicks: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    #[serde(default)]
    pub status: String,
}

/// A unit as shown to observers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitView {
    pub id: Uuid,
    pub marking: String,
    pub player_nicks: Vec<String>,
    pub player_count: usize,
    pub status: String,
    pub situation_id: Option<Uuid>,
    pub created_at: Timestamp,
}

impl From<Unit> for UnitView {
    fn from(unit: Unit) -> Self {
        Self {
            id: unit.id,
            marking: unit.marking,
            player_count: unit.members.len(),
            player_nicks: unit.members,
            status: unit.status,
            situation_id: unit.situation_id,
            created_at: unit.created_at,
        }
    }
}

/// POST /api/v1/units
pub async fn create(
    _key: ApiKey,
    State(state): State<AppState>,
    Json(input): Json<CreateUnit>,
) -> AppResult<impl IntoResponse> {
    input.validate().map_err(bad_request)?;

    let unit = state.units.create(&input.marking, input.player_nicks).await?;

    tracing::info!(unit_id = %unit.id, marking = %unit.marking, "Unit created");

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: UnitView::from(unit),
        }),
    ))
}

/// GET /api/v1/units
pub async fn list(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let units: Vec<UnitView> = state
        .units
        .get_all()
        .await
        .into_iter()
        .map(UnitView::from)
        .collect();

    Ok(Json(DataResponse { data: units }))
}

/// PUT /api/v1/units/{id}/status
pub async fn set_status(
    _key: ApiKey,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<StatusBody>,
) -> AppResult<impl IntoResponse> {
    let unit = state.units.set_status(id, &input.status).await?;

    Ok(Json(DataResponse {
        data: UnitView::from(unit),
    }))
}

/// DELETE /api/v1/units/{id}
///
/// Used by dispatchers and by the eviction path's manual counterpart.
pub async fn delete(
    _key: ApiKey,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    state.units.delete(id).await?;

    tracing::info!(unit_id = %id, "Unit deleted");

    Ok(StatusCode::NO_CONTENT)
}

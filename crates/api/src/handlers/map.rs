//! The render-time map snapshot.
//!
//! This is the one consumer of the coordinate resolver and viewport
//! projector: given the client's viewport and view transform it returns
//! screen-positioned markers for alive players, units, and open situations.
//! The mutation path never runs any of this.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use gridwatch_core::coords;
use gridwatch_core::viewport::{
    project, EdgePadding, ScreenPos, ViewTransform, ViewportSize, WorldBounds,
};
use gridwatch_core::WorldPos;
use gridwatch_engine::{Player, Situation, Unit};

use crate::handlers::coords::effective_status;
use crate::response::DataResponse;
use crate::state::AppState;

/// Situation types worth a map marker. Anything else (plus non-`code*`
/// kinds) stays off the map even when it carries coordinates.
const MARKED_KINDS: &[&str] = &[
    "pursuit",
    "code7",
    "trafficstop",
    "staged",
    "onpatrol",
    "unassigned",
    "recon",
    "support",
    "911",
    "911call",
];

fn default_zoom() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
pub struct MapQuery {
    pub width: f64,
    pub height: f64,
    #[serde(default = "default_zoom")]
    pub zoom: f64,
    #[serde(default)]
    pub pan_x: f64,
    #[serde(default)]
    pub pan_y: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub kind: MarkerKind,
    pub id: String,
    pub label: String,
    pub status: String,
    pub world: WorldPos,
    pub screen: ScreenPos,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerKind {
    Player,
    Unit,
    Situation,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSnapshot {
    /// False while the client viewport is unmeasured; markers are empty and
    /// the client must render its neutral fallback.
    pub ready: bool,
    pub marker_scale: f64,
    pub markers: Vec<Marker>,
}

/// GET /api/v1/map/snapshot
pub async fn snapshot(
    State(state): State<AppState>,
    Query(query): Query<MapQuery>,
) -> impl IntoResponse {
    let viewport = ViewportSize::new(query.width, query.height);
    let transform = ViewTransform::new(query.zoom, query.pan_x, query.pan_y);

    if !viewport.is_ready() {
        return Json(DataResponse {
            data: MapSnapshot {
                ready: false,
                marker_scale: transform.marker_scale(),
                markers: Vec::new(),
            },
        });
    }

    let bounds = WorldBounds::default();
    let max_age = chrono::Duration::seconds(state.config.player_ttl_secs);

    let players = state.tracker.alive_players(max_age).await;
    let units = state.units.get_all().await;
    let situations = state.situations.get_all().await;

    let mut markers = Vec::new();

    // Players render individually unless a unit already represents them.
    for player in &players {
        if in_any_unit(&units, &player.nick) {
            continue;
        }
        let Some(world) = player.pos else { continue };
        if let Some(marker) = place(
            MarkerKind::Player,
            player.nick.clone(),
            player.nick.clone(),
            effective_status(&state, player).await,
            world,
            &bounds,
            viewport,
            transform,
        ) {
            markers.push(marker);
        }
    }

    // Units render at their primary member's position, falling back to the
    // first member with a known position.
    for unit in &units {
        let Some(world) = unit_position(unit, &players) else {
            continue;
        };
        if let Some(marker) = place(
            MarkerKind::Unit,
            unit.id.to_string(),
            unit.marking.clone(),
            unit_status(unit),
            world,
            &bounds,
            viewport,
            transform,
        ) {
            markers.push(marker);
        }
    }

    // Open, whitelisted situations: typed position first, then the liberal
    // decode of the location metadata; out-of-range coordinates clamp to the
    // map edge.
    for situation in &situations {
        if !situation.open || !marked_kind(&situation.kind) {
            continue;
        }
        let Some(world) = situation_position(situation) else {
            continue;
        };
        if let Some(marker) = place(
            MarkerKind::Situation,
            situation.id.to_string(),
            situation
                .title
                .clone()
                .unwrap_or_else(|| situation.display_label()),
            situation.display_label(),
            bounds.clamp(world),
            &bounds,
            viewport,
            transform,
        ) {
            markers.push(marker);
        }
    }

    Json(DataResponse {
        data: MapSnapshot {
            ready: true,
            marker_scale: transform.marker_scale(),
            markers,
        },
    })
}

// ---------------------------------------------------------------------------
// Placement helpers
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn place(
    kind: MarkerKind,
    id: String,
    label: String,
    status: String,
    world: WorldPos,
    bounds: &WorldBounds,
    viewport: ViewportSize,
    transform: ViewTransform,
) -> Option<Marker> {
    let projected = project(world, bounds, viewport, EdgePadding::default())?;
    Some(Marker {
        kind,
        id,
        label,
        status,
        world,
        screen: transform.apply(viewport, projected),
    })
}

fn in_any_unit(units: &[Unit], nick: &str) -> bool {
    units
        .iter()
        .any(|u| u.members.iter().any(|m| m.eq_ignore_ascii_case(nick)))
}

fn unit_position(unit: &Unit, players: &[Player]) -> Option<WorldPos> {
    for nick in &unit.members {
        let found = players
            .iter()
            .find(|p| p.nick.eq_ignore_ascii_case(nick))
            .and_then(|p| p.pos);
        if found.is_some() {
            return found;
        }
    }
    None
}

fn unit_status(unit: &Unit) -> String {
    if !unit.status.is_empty() {
        unit.status.clone()
    } else if unit.situation_id.is_some() {
        "Support".to_string()
    } else {
        "On Patrol".to_string()
    }
}

fn situation_position(situation: &Situation) -> Option<WorldPos> {
    if let Some(pos) = situation.pos {
        return Some(pos);
    }
    let location = situation.metadata.get("location")?;
    coords::resolve(&serde_json::Value::String(location.clone()))
}

fn marked_kind(kind: &str) -> bool {
    MARKED_KINDS.contains(&kind) || kind.starts_with("code")
}

//! Route table assembly.

use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::handlers::{channels, coords, map, situations, units};
use crate::state::AppState;
use crate::ws;

pub mod health;

/// All `/api/v1` routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Transmitter reports.
        .route("/coords", post(coords::report))
        .route("/coords/status", post(coords::status))
        .route("/coords/heartbeat", post(coords::heartbeat))
        .route("/coords/all", get(coords::all))
        // Situations.
        .route("/situations", post(situations::create).get(situations::list))
        .route("/situations/panic", post(situations::panic))
        .route(
            "/situations/{id}",
            get(situations::get).delete(situations::delete),
        )
        .route("/situations/{id}/metadata", put(situations::update_metadata))
        .route("/situations/{id}/location", put(situations::update_location))
        .route("/situations/{id}/join", post(situations::join))
        .route("/situations/{id}/leave", post(situations::leave))
        .route("/situations/{id}/close", post(situations::close))
        .route("/situations/{id}/open", post(situations::open))
        .route("/situations/{id}/units/add", post(situations::add_unit))
        .route("/situations/{id}/units/remove", post(situations::remove_unit))
        // Tactical channels.
        .route("/channels", post(channels::create).get(channels::list))
        .route("/channels/{id}/busy", post(channels::set_busy))
        .route("/channels/{id}/attach", post(channels::attach))
        // Units.
        .route("/units", post(units::create).get(units::list))
        .route("/units/{id}", delete(units::delete))
        .route("/units/{id}/status", put(units::set_status))
        // Render-time map snapshot.
        .route("/map/snapshot", get(map::snapshot))
        // Live event stream.
        .route("/ws", get(ws::ws_handler))
}

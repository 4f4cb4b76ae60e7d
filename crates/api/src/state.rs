use std::sync::Arc;

use gridwatch_engine::{ChannelRegistry, PlayerTracker, SituationHub, UnitRegistry};
use gridwatch_events::EventBus;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (accessed by the api-key extractor and handlers).
    pub config: Arc<ServerConfig>,
    /// Live player registry.
    pub tracker: Arc<PlayerTracker>,
    /// Unit registry.
    pub units: Arc<UnitRegistry>,
    /// Situation lifecycle manager.
    pub situations: Arc<SituationHub>,
    /// Tactical channel registry.
    pub channels: Arc<ChannelRegistry>,
    /// Centralized event bus the registries publish into.
    pub bus: Arc<EventBus>,
    /// WebSocket connection manager (browser clients).
    pub ws_manager: Arc<WsManager>,
}

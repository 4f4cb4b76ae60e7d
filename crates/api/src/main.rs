use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gridwatch_api::config::ServerConfig;
use gridwatch_api::router::build_app_router;
use gridwatch_api::{state, ws};
use gridwatch_engine::{
    ChannelRegistry, EvictionScheduler, PlayerTracker, SituationHub, UnitRegistry,
};
use gridwatch_events::{EventBus, HistoryLog};

use state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gridwatch_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Event bus ---
    let bus = Arc::new(EventBus::default());
    tracing::info!("Event bus created");

    // --- History log ---
    let (history, history_handle) = match &config.history_path {
        Some(path) => {
            let (history, rx) = HistoryLog::channel();
            let handle = tokio::spawn(HistoryLog::run(path.clone(), rx));
            (history, Some(handle))
        }
        None => {
            tracing::info!("History log disabled");
            (HistoryLog::disabled(), None)
        }
    };

    // --- Registries ---
    let tracker = Arc::new(PlayerTracker::new(Arc::clone(&bus), history.clone()));
    let units = Arc::new(UnitRegistry::new(Arc::clone(&bus), history.clone()));
    let channels = Arc::new(ChannelRegistry::new(Arc::clone(&bus), history.clone()));
    let situations = Arc::new(SituationHub::new(
        Arc::clone(&channels),
        Arc::clone(&bus),
        history.clone(),
    ));
    tracing::info!("Registries created");

    // --- Eviction scheduler ---
    let eviction_cancel = tokio_util::sync::CancellationToken::new();
    let scheduler = EvictionScheduler::new(Arc::clone(&units), Arc::clone(&tracker));
    let eviction_handle = tokio::spawn(scheduler.run(eviction_cancel.clone()));

    // --- WebSocket manager ---
    let ws_manager = Arc::new(ws::WsManager::new());

    // Spawn the event forwarder (pushes every bus event to all sockets and
    // owns the keepalive pings).
    let forwarder_handle = tokio::spawn(ws::forwarder::run(
        bus.subscribe(),
        Arc::clone(&ws_manager),
    ));

    tracing::info!("Background services started (eviction scheduler, event forwarder)");

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        tracker,
        units,
        situations,
        channels,
        bus: Arc::clone(&bus),
        ws_manager: Arc::clone(&ws_manager),
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Stop the eviction scheduler first so no deletion fires mid-shutdown.
    eviction_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), eviction_handle).await;
    tracing::info!("Eviction scheduler stopped");

    // Drop the event bus sender to close the broadcast channel.
    // This signals the forwarder to shut down.
    drop(bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), forwarder_handle).await;
    tracing::info!("Event forwarder shut down");

    // The history writer exits once every HistoryLog clone is gone: the
    // registry-held clones went down with the router, this drops the last.
    drop(history);
    if let Some(handle) = history_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        tracing::info!("History log flushed");
    }

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

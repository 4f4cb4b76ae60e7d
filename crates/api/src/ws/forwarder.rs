//! Event-bus to observer fan-out.
//!
//! One long-lived task carries the whole push pipeline: it serializes every
//! [`LiveEvent`] from the engine's bus into a JSON text frame for all
//! observers, and pings them on a fixed cadence so idle connections stay
//! open through proxies. The task ends when the bus sender is dropped
//! during shutdown.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::Message;
use tokio::sync::broadcast;

use gridwatch_events::LiveEvent;

use crate::ws::manager::WsManager;

/// How often idle observers are pinged.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Run the push pipeline.
///
/// Falling behind the bus only skips events — observer delivery is
/// at-most-once and the next snapshot query reconciles.
pub async fn run(mut events: broadcast::Receiver<LiveEvent>, manager: Arc<WsManager>) {
    let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(text) => manager.broadcast(Message::Text(text.into())).await,
                    Err(e) => {
                        tracing::error!(error = %e, event = %event.event, "Failed to serialize event");
                    }
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Observer push lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, push pipeline shutting down");
                    break;
                }
            },
            _ = keepalive.tick() => {
                let count = manager.connection_count().await;
                if count > 0 {
                    tracing::debug!(count, "Observer keepalive ping");
                }
                manager.broadcast(Message::Ping(Bytes::new())).await;
            }
        }
    }
}

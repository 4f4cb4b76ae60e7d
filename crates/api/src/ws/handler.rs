//! The `GET /ws` upgrade endpoint.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use crate::state::AppState;
use crate::ws::manager::WsManager;

/// Upgrade the connection and hand the socket to [`serve_events`].
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_events(socket, state.ws_manager))
}

/// Drive one observer socket until either side hangs up.
///
/// Observers only listen, so a single loop multiplexes the two things that
/// can happen: a queued outbound frame (from the forwarder or shutdown) and
/// an inbound control frame. A Close from either direction, a send failure,
/// or the manager dropping our queue all end the connection.
async fn serve_events(socket: WebSocket, manager: Arc<WsManager>) {
    let (peer_id, mut outbound) = manager.register().await;
    tracing::info!(peer_id, "Observer connected");

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            queued = outbound.recv() => {
                // A closed queue means the manager has already forgotten us.
                let Some(frame) = queued else { break };
                let closing = matches!(frame, Message::Close(_));
                if sink.send(frame).await.is_err() || closing {
                    break;
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Pongs and stray frames; nothing to do.
                    }
                    Some(Err(e)) => {
                        tracing::debug!(peer_id, error = %e, "Observer socket error");
                        break;
                    }
                }
            }
        }
    }

    manager.unregister(peer_id).await;
    tracing::info!(peer_id, "Observer disconnected");
}

//! Observer connection registry.
//!
//! Gridwatch sockets are one-directional: every frame that goes out goes to
//! every observer, so the registry is nothing more than a map of outbound
//! queue handles keyed by a connection counter. There is no per-connection
//! state to track — an observer that stops draining its queue is discovered
//! and dropped on the next broadcast.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use tokio::sync::{mpsc, RwLock};

/// Registry of connected observers, shared via `Arc`.
pub struct WsManager {
    next_id: AtomicU64,
    peers: RwLock<HashMap<u64, mpsc::UnboundedSender<Message>>>,
}

impl WsManager {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            peers: RwLock::new(HashMap::new()),
        }
    }

    /// Admit a new observer.
    ///
    /// Returns the assigned peer id and the queue the socket task drains.
    pub async fn register(&self) -> (u64, mpsc::UnboundedReceiver<Message>) {
        let peer_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.peers.write().await.insert(peer_id, tx);
        (peer_id, rx)
    }

    /// Forget an observer whose socket has closed.
    pub async fn unregister(&self, peer_id: u64) {
        self.peers.write().await.remove(&peer_id);
    }

    /// Queue a frame for every observer.
    ///
    /// Peers whose queues have closed (the socket task hung up) are pruned
    /// here instead of lingering until disconnect cleanup.
    pub async fn broadcast(&self, message: Message) {
        let mut peers = self.peers.write().await;
        peers.retain(|_, tx| tx.send(message.clone()).is_ok());
    }

    pub async fn connection_count(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Queue a Close frame for every observer and forget them all.
    /// Called once during graceful shutdown.
    pub async fn shutdown_all(&self) {
        let mut peers = self.peers.write().await;
        let count = peers.len();
        for tx in peers.values() {
            let _ = tx.send(Message::Close(None));
        }
        peers.clear();
        tracing::info!(count, "Dropped all observer connections");
    }
}

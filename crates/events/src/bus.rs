//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the central publish/subscribe hub for [`LiveEvent`]s.
//! It is designed to be shared via `Arc<EventBus>` across the application;
//! the WebSocket forwarder and any future consumers subscribe independently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Well-known event names published by the engine registries.
///
/// Same-name events preserve emission order; no ordering is guaranteed
/// across different names.
pub mod names {
    pub const PLAYER_UPDATED: &str = "player.updated";
    pub const PLAYER_STATUS: &str = "player.status";
    pub const PANIC_UPDATED: &str = "panic.updated";
    pub const UNIT_UPDATED: &str = "unit.updated";
    pub const UNIT_DELETED: &str = "unit.deleted";
    pub const SITUATION_CREATED: &str = "situation.created";
    pub const SITUATION_UPDATED: &str = "situation.updated";
    pub const SITUATION_LOCATION: &str = "situation.location";
    pub const SITUATION_DELETED: &str = "situation.deleted";
    pub const CHANNEL_CREATED: &str = "channel.created";
    pub const CHANNEL_UPDATED: &str = "channel.updated";
}

// ---------------------------------------------------------------------------
// LiveEvent
// ---------------------------------------------------------------------------

/// A domain event describing one committed state mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveEvent {
    /// Dot-separated event name, e.g. `"situation.updated"`.
    pub event: String,

    /// Free-form JSON payload carrying the mutation delta or snapshot.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl LiveEvent {
    /// Create a new event with an empty payload.
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Set the JSON payload for the event.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`LiveEvent`]. When the buffer is
/// full the oldest un-consumed events are dropped and slow receivers observe
/// a `RecvError::Lagged` — delivery is at-most-once by design.
pub struct EventBus {
    sender: broadcast::Sender<LiveEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: LiveEvent) {
        // Ignore the SendError — it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let event = LiveEvent::new(names::SITUATION_CREATED)
            .with_payload(serde_json::json!({"kind": "pursuit"}));

        bus.publish(event);

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.event, "situation.created");
        assert_eq!(received.payload["kind"], "pursuit");
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(LiveEvent::new(names::CHANNEL_UPDATED));

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");

        assert_eq!(e1.event, "channel.updated");
        assert_eq!(e2.event, "channel.updated");
    }

    #[tokio::test]
    async fn same_name_events_preserve_emission_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        for i in 0..5 {
            bus.publish(
                LiveEvent::new(names::PLAYER_UPDATED).with_payload(serde_json::json!({"seq": i})),
            );
        }

        for i in 0..5 {
            let event = rx.recv().await.expect("should receive in order");
            assert_eq!(event.payload["seq"], i);
        }
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        // No subscribers — this must not panic.
        bus.publish(LiveEvent::new(names::UNIT_DELETED));
    }

    #[test]
    fn new_event_has_empty_payload() {
        let event = LiveEvent::new("bare.event");
        assert_eq!(event.event, "bare.event");
        assert!(event.payload.is_object());
    }
}

//! Tactical channel registry and lock manager.
//!
//! A tactical channel is a named communication resource that can be held by
//! at most one situation at a time. The busy flag is derived inside
//! [`attach`](ChannelRegistry::attach) rather than trusted to callers, so the
//! `is_busy == true whenever situation_id is set` invariant cannot be broken
//! by a missed companion call. [`set_busy`](ChannelRegistry::set_busy) only
//! toggles manual reservations of unattached channels.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tokio::sync::RwLock;
use uuid::Uuid;

use gridwatch_core::CoreError;
use gridwatch_events::{names, EventBus, HistoryLog, LiveEvent};

/// A tactical radio channel.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TacticalChannel {
    pub id: Uuid,
    /// Unique user-facing name, e.g. `"TAC-1"`. Uniqueness is
    /// case-insensitive because situation metadata references channels by
    /// name.
    pub name: String,
    pub is_busy: bool,
    /// The situation currently holding this channel, if any.
    pub situation_id: Option<Uuid>,
}

/// Authoritative registry of tactical channels.
pub struct ChannelRegistry {
    channels: RwLock<HashMap<Uuid, TacticalChannel>>,
    bus: Arc<EventBus>,
    history: HistoryLog,
}

impl ChannelRegistry {
    pub fn new(bus: Arc<EventBus>, history: HistoryLog) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            bus,
            history,
        }
    }

    /// Create a channel with a unique name.
    pub async fn create(&self, name: &str) -> Result<TacticalChannel, CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::Validation("Channel name must not be empty".into()));
        }

        let snapshot = {
            let mut channels = self.channels.write().await;
            if channels.values().any(|c| c.name.eq_ignore_ascii_case(name)) {
                return Err(CoreError::Conflict(format!("Channel '{name}' already exists")));
            }
            let channel = TacticalChannel {
                id: Uuid::new_v4(),
                name: name.to_string(),
                is_busy: false,
                situation_id: None,
            };
            channels.insert(channel.id, channel.clone());
            channel
        };

        self.bus.publish(
            LiveEvent::new(names::CHANNEL_CREATED)
                .with_payload(serde_json::to_value(&snapshot).unwrap_or_default()),
        );
        self.history.append(json!({
            "type": "channel_create",
            "id": snapshot.id,
            "name": &snapshot.name,
        }));

        Ok(snapshot)
    }

    /// Toggle the manual busy flag. Idempotent.
    ///
    /// Clearing the flag while a situation holds the channel is a conflict:
    /// the attachment is released through the situation lifecycle, never by
    /// flipping the flag underneath it.
    pub async fn set_busy(&self, id: Uuid, busy: bool) -> Result<TacticalChannel, CoreError> {
        let snapshot = {
            let mut channels = self.channels.write().await;
            let channel = channels
                .get_mut(&id)
                .ok_or_else(|| CoreError::not_found("Channel", id))?;
            if !busy && channel.situation_id.is_some() {
                return Err(CoreError::Conflict(format!(
                    "Channel '{}' is attached to a situation",
                    channel.name
                )));
            }
            channel.is_busy = busy;
            channel.clone()
        };

        self.publish_updated(&snapshot);
        self.history
            .append(json!({ "type": "channel_busy", "id": id, "isBusy": busy }));

        Ok(snapshot)
    }

    /// Attach the channel to a situation, or detach it with `None`.
    ///
    /// Attachment atomically implies the busy flag. Attaching while a
    /// *different* situation holds the channel (or while it is manually
    /// reserved) is a conflict; re-attaching the same situation is
    /// idempotent.
    pub async fn attach(&self, id: Uuid, situation_id: Option<Uuid>) -> Result<TacticalChannel, CoreError> {
        let snapshot = {
            let mut channels = self.channels.write().await;
            let channel = channels
                .get_mut(&id)
                .ok_or_else(|| CoreError::not_found("Channel", id))?;
            match situation_id {
                Some(sid) => {
                    if channel.is_busy && channel.situation_id != Some(sid) {
                        return Err(CoreError::Conflict(format!(
                            "Channel '{}' is busy",
                            channel.name
                        )));
                    }
                    channel.situation_id = Some(sid);
                    channel.is_busy = true;
                }
                None => {
                    channel.situation_id = None;
                    channel.is_busy = false;
                }
            }
            channel.clone()
        };

        self.publish_updated(&snapshot);
        self.history.append(json!({
            "type": "channel_attach",
            "id": id,
            "situationId": situation_id,
        }));

        Ok(snapshot)
    }

    /// Release every channel held by the given situation. Returns the
    /// detached snapshots. Used by the close/delete cascade.
    pub async fn detach_all_for(&self, situation_id: Uuid) -> Vec<TacticalChannel> {
        let detached = {
            let mut channels = self.channels.write().await;
            let mut detached = Vec::new();
            for channel in channels.values_mut() {
                if channel.situation_id == Some(situation_id) {
                    channel.situation_id = None;
                    channel.is_busy = false;
                    detached.push(channel.clone());
                }
            }
            detached
        };

        for channel in &detached {
            self.publish_updated(channel);
            self.history.append(json!({
                "type": "channel_attach",
                "id": channel.id,
                "situationId": null,
            }));
        }

        detached
    }

    /// Look up a channel by name, case-insensitively.
    pub async fn find_by_name(&self, name: &str) -> Option<TacticalChannel> {
        self.channels
            .read()
            .await
            .values()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    pub async fn get(&self, id: Uuid) -> Option<TacticalChannel> {
        self.channels.read().await.get(&id).cloned()
    }

    /// Point-in-time snapshot of all channels, sorted by name.
    pub async fn get_all(&self) -> Vec<TacticalChannel> {
        let channels = self.channels.read().await;
        let mut all: Vec<TacticalChannel> = channels.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    fn publish_updated(&self, channel: &TacticalChannel) {
        let payload = serde_json::to_value(channel).unwrap_or_default();
        self.bus
            .publish(LiveEvent::new(names::CHANNEL_UPDATED).with_payload(payload));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

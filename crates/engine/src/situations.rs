//! Situation lifecycle manager.
//!
//! A situation is a tracked incident (pursuit, traffic stop, 911 call, ...)
//! with an open/closed state, assigned units, joined players, and an
//! optional tactical channel lock. The hub owns the situation records and
//! holds the channel registry only for binding reconciliation — channels are
//! referenced by name in metadata and by id nowhere, so a rename-free lookup
//! happens on every (re)bind.
//!
//! Metadata rules: the well-known keys `x`, `y`, `location`, `title`,
//! `channel`, `greenUnit`, and `redUnit` are promoted into typed fields on
//! every write; the typed fields are the source of truth once present and
//! the map keeps mirroring them for metadata-only readers. Channel binding
//! is best-effort: a failed bind is logged and audited but never rolls back
//! the situation mutation that requested it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::sync::RwLock;
use uuid::Uuid;

use gridwatch_core::{CoreError, Timestamp, WorldPos};
use gridwatch_events::{names, EventBus, HistoryLog, LiveEvent};

use crate::channels::ChannelRegistry;

/// A tracked incident.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Situation {
    pub id: Uuid,
    /// Normalized type code, e.g. `"pursuit"`, `"code7"`, `"trafficstop"`.
    pub kind: String,
    pub title: Option<String>,
    pub open: bool,
    pub location_name: Option<String>,
    pub pos: Option<WorldPos>,
    /// The unit leading the response.
    pub lead_unit: Option<Uuid>,
    /// Initiator unit marking.
    pub green_unit: Option<String>,
    /// Commander unit marking.
    pub red_unit: Option<String>,
    /// Member unit ids, in assignment order.
    pub units: Vec<Uuid>,
    /// Nicks of players who joined the situation.
    pub players: Vec<String>,
    /// Name of the tactical channel actually bound to this situation.
    /// `None` when no bind succeeded, even if metadata names a channel.
    pub channel: Option<String>,
    /// Open key→value map; superset of the promoted fields above.
    pub metadata: HashMap<String, String>,
    pub created_at: Timestamp,
}

impl Situation {
    fn new(kind: &str, metadata: HashMap<String, String>) -> Self {
        let mut situation = Self {
            id: Uuid::new_v4(),
            kind: normalize_kind(kind),
            title: None,
            open: true,
            location_name: None,
            pos: None,
            lead_unit: None,
            green_unit: None,
            red_unit: None,
            units: Vec::new(),
            players: Vec::new(),
            channel: None,
            metadata,
            created_at: Utc::now(),
        };
        situation.apply_metadata();
        situation
    }

    /// Promote the well-known metadata keys into typed fields.
    /// Coordinates merge component-wise so a producer sending only `x` does
    /// not wipe a previously known `y`.
    fn apply_metadata(&mut self) {
        let x = self.metadata.get("x").and_then(|s| parse_finite(s));
        let y = self.metadata.get("y").and_then(|s| parse_finite(s));
        match (x, y, self.pos) {
            (Some(x), Some(y), _) => self.pos = Some(WorldPos::new(x, y)),
            (Some(x), None, Some(p)) => self.pos = Some(WorldPos::new(x, p.y)),
            (None, Some(y), Some(p)) => self.pos = Some(WorldPos::new(p.x, y)),
            _ => {}
        }

        if let Some(location) = non_blank(self.metadata.get("location")) {
            self.location_name = Some(location);
        }
        if let Some(title) = non_blank(self.metadata.get("title")) {
            self.title = Some(title);
        }
        if let Some(green) = non_blank(self.metadata.get("greenUnit")) {
            self.green_unit = Some(green);
        }
        if let Some(red) = non_blank(self.metadata.get("redUnit")) {
            self.red_unit = Some(red);
        }
    }

    /// The channel name the metadata currently asks for, if any.
    fn requested_channel(&self) -> Option<String> {
        non_blank(self.metadata.get("channel"))
    }

    /// Human-facing label for the situation's type.
    pub fn display_label(&self) -> String {
        display_label(&self.kind)
    }
}

/// Normalize a free-form type string for classification:
/// lower-cased with everything but letters and digits stripped, so
/// `"Traffic Stop"`, `"TRAFFICSTOP"`, and `"traffic-stop"` all compare equal.
pub fn normalize_kind(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Map a normalized type code to its display label.
pub fn display_label(kind: &str) -> String {
    match kind {
        "pursuit" => "Pursuit".to_string(),
        "trafficstop" => "Traffic Stop".to_string(),
        "911" | "911call" => "911 Call".to_string(),
        "staged" => "Staged".to_string(),
        "onpatrol" => "On Patrol".to_string(),
        "recon" => "Recon".to_string(),
        "support" => "Support".to_string(),
        other => match other.strip_prefix("code") {
            Some(n) if !n.is_empty() => format!("Code {n}"),
            _ => other.to_string(),
        },
    }
}

fn parse_finite(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Owns situation records and reconciles their channel bindings.
pub struct SituationHub {
    situations: RwLock<HashMap<Uuid, Situation>>,
    channels: Arc<ChannelRegistry>,
    bus: Arc<EventBus>,
    history: HistoryLog,
}

impl SituationHub {
    pub fn new(channels: Arc<ChannelRegistry>, bus: Arc<EventBus>, history: HistoryLog) -> Self {
        Self {
            situations: RwLock::new(HashMap::new()),
            channels,
            bus,
            history,
        }
    }

    /// Create a situation from a type and a metadata map.
    ///
    /// If the metadata names a channel, binding is attempted best-effort:
    /// a missing or busy channel is logged and audited but creation still
    /// succeeds.
    pub async fn create(
        &self,
        kind: &str,
        metadata: HashMap<String, String>,
    ) -> Result<Situation, CoreError> {
        if kind.trim().is_empty() {
            return Err(CoreError::Validation("Situation type must not be empty".into()));
        }

        let mut situation = Situation::new(kind, metadata);

        if let Some(name) = situation.requested_channel() {
            match self.bind_channel(situation.id, &name).await {
                Ok(bound) => situation.channel = Some(bound),
                Err(e) => {
                    tracing::warn!(
                        situation_id = %situation.id,
                        channel = %name,
                        error = %e,
                        "Channel binding failed on create"
                    );
                    self.history.append(json!({
                        "type": "situation_channel_attach_error",
                        "situationId": situation.id,
                        "channel": name,
                        "error": e.to_string(),
                    }));
                }
            }
        }

        self.situations
            .write()
            .await
            .insert(situation.id, situation.clone());

        self.bus.publish(
            LiveEvent::new(names::SITUATION_CREATED)
                .with_payload(serde_json::to_value(&situation).unwrap_or_default()),
        );
        self.history.append(json!({
            "type": "situation_create",
            "id": situation.id,
            "kind": &situation.kind,
            "metadata": &situation.metadata,
        }));

        Ok(situation)
    }

    /// Merge a metadata patch (patch wins key-by-key), re-derive the typed
    /// fields, and reconcile channel bindings if the `channel` key changed.
    ///
    /// The previous channel is detached only if it still points at this
    /// situation — another situation may have claimed it since. A conflict
    /// on the new channel leaves the metadata in place but no binding, per
    /// the channel invariant.
    pub async fn update_metadata(
        &self,
        id: Uuid,
        patch: HashMap<String, String>,
    ) -> Result<Situation, CoreError> {
        let (mut snapshot, old_channel, new_channel) = {
            let mut situations = self.situations.write().await;
            let situation = situations
                .get_mut(&id)
                .ok_or_else(|| CoreError::not_found("Situation", id))?;
            let old = situation.requested_channel();
            for (key, value) in patch {
                situation.metadata.insert(key, value);
            }
            situation.apply_metadata();
            let new = situation.requested_channel();
            (situation.clone(), old, new)
        };

        if old_channel != new_channel {
            snapshot = self
                .rebind_channel(id, old_channel.as_deref(), new_channel.as_deref())
                .await?;
        }

        self.publish_updated(&snapshot);
        self.history.append(json!({
            "type": "situation_update_metadata",
            "id": id,
            "metadata": &snapshot.metadata,
        }));

        Ok(snapshot)
    }

    /// Canonical geometry path: set the structured location fields and
    /// mirror them into metadata for metadata-only readers.
    pub async fn update_location(
        &self,
        id: Uuid,
        location: &str,
        x: f64,
        y: f64,
    ) -> Result<Situation, CoreError> {
        let snapshot = {
            let mut situations = self.situations.write().await;
            let situation = situations
                .get_mut(&id)
                .ok_or_else(|| CoreError::not_found("Situation", id))?;
            situation.location_name = Some(location.to_string());
            situation.pos = Some(WorldPos::new(x, y));
            situation.metadata.insert("location".into(), location.to_string());
            situation.metadata.insert("x".into(), x.to_string());
            situation.metadata.insert("y".into(), y.to_string());
            situation.clone()
        };

        self.bus.publish(
            LiveEvent::new(names::SITUATION_LOCATION)
                .with_payload(json!({ "id": id, "location": location, "x": x, "y": y })),
        );
        self.publish_updated(&snapshot);
        self.history.append(json!({
            "type": "situation_location",
            "id": id,
            "location": location,
            "x": x,
            "y": y,
        }));

        Ok(snapshot)
    }

    /// Add a unit to the situation. Adding an already-present unit with
    /// `as_lead` simply promotes it.
    pub async fn add_unit(&self, id: Uuid, unit_id: Uuid, as_lead: bool) -> Result<Situation, CoreError> {
        let snapshot = {
            let mut situations = self.situations.write().await;
            let situation = situations
                .get_mut(&id)
                .ok_or_else(|| CoreError::not_found("Situation", id))?;
            if !situation.units.contains(&unit_id) {
                situation.units.push(unit_id);
            }
            if as_lead {
                situation.lead_unit = Some(unit_id);
            }
            situation.clone()
        };

        self.publish_updated(&snapshot);
        self.history.append(json!({
            "type": "situation_add_unit",
            "situationId": id,
            "unitId": unit_id,
            "asLead": as_lead,
        }));

        Ok(snapshot)
    }

    /// Remove a unit from the situation, clearing the lead pointer if it
    /// pointed at the removed unit.
    pub async fn remove_unit(&self, id: Uuid, unit_id: Uuid) -> Result<Situation, CoreError> {
        let snapshot = {
            let mut situations = self.situations.write().await;
            let situation = situations
                .get_mut(&id)
                .ok_or_else(|| CoreError::not_found("Situation", id))?;
            situation.units.retain(|u| *u != unit_id);
            if situation.lead_unit == Some(unit_id) {
                situation.lead_unit = None;
            }
            situation.clone()
        };

        self.publish_updated(&snapshot);
        self.history.append(json!({
            "type": "situation_remove_unit",
            "situationId": id,
            "unitId": unit_id,
        }));

        Ok(snapshot)
    }

    /// Close the situation and release every channel it holds, however the
    /// channel arrived at that binding. The record itself is kept.
    pub async fn close(&self, id: Uuid) -> Result<Situation, CoreError> {
        let snapshot = {
            let mut situations = self.situations.write().await;
            let situation = situations
                .get_mut(&id)
                .ok_or_else(|| CoreError::not_found("Situation", id))?;
            situation.open = false;
            situation.channel = None;
            situation.clone()
        };

        self.channels.detach_all_for(id).await;

        self.publish_updated(&snapshot);
        self.history.append(json!({ "type": "situation_close", "id": id }));

        Ok(snapshot)
    }

    /// Reopen a closed situation. Channels released on close stay released;
    /// a metadata update must rebind them explicitly.
    pub async fn reopen(&self, id: Uuid) -> Result<Situation, CoreError> {
        let snapshot = {
            let mut situations = self.situations.write().await;
            let situation = situations
                .get_mut(&id)
                .ok_or_else(|| CoreError::not_found("Situation", id))?;
            situation.open = true;
            situation.clone()
        };

        self.publish_updated(&snapshot);
        self.history.append(json!({ "type": "situation_open", "id": id }));

        Ok(snapshot)
    }

    /// Remove the situation permanently, with the same channel-release
    /// cascade as [`close`](Self::close).
    pub async fn delete(&self, id: Uuid) -> Result<(), CoreError> {
        self.situations
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| CoreError::not_found("Situation", id))?;

        self.channels.detach_all_for(id).await;

        self.bus
            .publish(LiveEvent::new(names::SITUATION_DELETED).with_payload(json!({ "id": id })));
        self.history.append(json!({ "type": "situation_delete", "id": id }));

        Ok(())
    }

    /// Join a player to the situation by nick.
    pub async fn join(&self, id: Uuid, nick: &str) -> Result<Situation, CoreError> {
        let nick = nick.trim();
        if nick.is_empty() {
            return Err(CoreError::Validation("Nickname must not be empty".into()));
        }

        let snapshot = {
            let mut situations = self.situations.write().await;
            let situation = situations
                .get_mut(&id)
                .ok_or_else(|| CoreError::not_found("Situation", id))?;
            if !situation.players.iter().any(|p| p.eq_ignore_ascii_case(nick)) {
                situation.players.push(nick.to_string());
            }
            situation.clone()
        };

        self.publish_updated(&snapshot);
        self.bus.publish(LiveEvent::new(names::PLAYER_STATUS).with_payload(json!({
            "nick": nick,
            "status": snapshot.display_label(),
        })));
        self.history
            .append(json!({ "type": "situation_join", "id": id, "nick": nick }));

        Ok(snapshot)
    }

    /// Remove a player from the situation by nick.
    pub async fn leave(&self, id: Uuid, nick: &str) -> Result<Situation, CoreError> {
        let nick = nick.trim();
        if nick.is_empty() {
            return Err(CoreError::Validation("Nickname must not be empty".into()));
        }

        let snapshot = {
            let mut situations = self.situations.write().await;
            let situation = situations
                .get_mut(&id)
                .ok_or_else(|| CoreError::not_found("Situation", id))?;
            situation.players.retain(|p| !p.eq_ignore_ascii_case(nick));
            situation.clone()
        };

        self.publish_updated(&snapshot);
        // Empty status tells observers to fall back to the player's base status.
        self.bus.publish(
            LiveEvent::new(names::PLAYER_STATUS).with_payload(json!({ "nick": nick, "status": "" })),
        );
        self.history
            .append(json!({ "type": "situation_leave", "id": id, "nick": nick }));

        Ok(snapshot)
    }

    /// Status override from situation membership: the display label of the
    /// first open situation the player has joined, if any.
    pub async fn status_for(&self, nick: &str) -> Option<String> {
        let situations = self.situations.read().await;
        let mut open: Vec<&Situation> = situations
            .values()
            .filter(|s| s.open && s.players.iter().any(|p| p.eq_ignore_ascii_case(nick)))
            .collect();
        open.sort_by_key(|s| s.created_at);
        open.first().map(|s| s.display_label())
    }

    pub async fn get(&self, id: Uuid) -> Option<Situation> {
        self.situations.read().await.get(&id).cloned()
    }

    /// Point-in-time snapshot of all situations, oldest first.
    pub async fn get_all(&self) -> Vec<Situation> {
        let situations = self.situations.read().await;
        let mut all: Vec<Situation> = situations.values().cloned().collect();
        all.sort_by_key(|s| s.created_at);
        all
    }

    /// Look up and lock a channel by name for this situation.
    /// Returns the channel's canonical name on success.
    async fn bind_channel(&self, situation_id: Uuid, name: &str) -> Result<String, CoreError> {
        let channel = self
            .channels
            .find_by_name(name)
            .await
            .ok_or_else(|| CoreError::not_found("Channel", name))?;
        let attached = self.channels.attach(channel.id, Some(situation_id)).await?;
        Ok(attached.name)
    }

    /// Reconcile bindings after the `channel` metadata key changed, then
    /// record the outcome on the situation's typed channel field.
    async fn rebind_channel(
        &self,
        id: Uuid,
        old: Option<&str>,
        new: Option<&str>,
    ) -> Result<Situation, CoreError> {
        // Detach the previous channel, but only if it still points at this
        // situation — another situation may have claimed it since.
        if let Some(old_name) = old {
            if let Some(channel) = self.channels.find_by_name(old_name).await {
                if channel.situation_id == Some(id) {
                    let _ = self.channels.attach(channel.id, None).await;
                }
            }
        }

        let bound = match new {
            Some(new_name) => match self.bind_channel(id, new_name).await {
                Ok(name) => Some(name),
                Err(e) => {
                    tracing::warn!(
                        situation_id = %id,
                        channel = %new_name,
                        error = %e,
                        "Channel rebind failed on metadata update"
                    );
                    self.history.append(json!({
                        "type": "situation_channel_sync_error",
                        "situationId": id,
                        "oldChannel": old,
                        "newChannel": new_name,
                        "error": e.to_string(),
                    }));
                    None
                }
            },
            None => None,
        };

        let mut situations = self.situations.write().await;
        let situation = situations
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("Situation", id))?;
        situation.channel = bound;
        Ok(situation.clone())
    }

    fn publish_updated(&self, situation: &Situation) {
        let payload = serde_json::to_value(situation).unwrap_or_default();
        self.bus
            .publish(LiveEvent::new(names::SITUATION_UPDATED).with_payload(payload));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

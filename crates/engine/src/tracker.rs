//! Live player registry.
//!
//! [`PlayerTracker`] is the authoritative store for every player the
//! transmitters have reported. Records are created on the first position
//! report, status report, or heartbeat and never explicitly deleted — stale
//! players simply fall out of [`alive_players`](PlayerTracker::alive_players).
//! Nicknames are matched case-insensitively but stored with their original
//! casing.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::sync::RwLock;

use gridwatch_core::{CoreError, Timestamp, WorldPos};
use gridwatch_events::{names, EventBus, HistoryLog, LiveEvent};

/// A tracked player.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub nick: String,
    /// Last reported world position; `None` until the first position report
    /// (heartbeats alone never set a position).
    pub pos: Option<WorldPos>,
    pub is_afk: bool,
    pub in_vehicle: bool,
    /// Free-text base status, overridden at display time by situation
    /// membership and the panic flag.
    pub base_status: String,
    pub panic: bool,
    /// Last report of any kind; drives the liveness window.
    pub last_update: Timestamp,
    /// Last report that carried `in_vehicle == true`; drives vehicle-state
    /// freshness for unit eviction.
    pub last_seen: Timestamp,
}

impl Player {
    fn new(nick: &str, now: Timestamp) -> Self {
        Self {
            nick: nick.to_string(),
            pos: None,
            is_afk: false,
            in_vehicle: false,
            base_status: String::new(),
            panic: false,
            last_update: now,
            last_seen: now,
        }
    }

    /// Liveness predicate: has this player reported anything recently?
    pub fn is_alive(&self, max_age: Duration, now: Timestamp) -> bool {
        now - self.last_update <= max_age
    }

    /// Activity predicate for eviction: in a vehicle, and the in-vehicle
    /// state is still fresh.
    pub fn is_active(&self, window: Duration, now: Timestamp) -> bool {
        self.in_vehicle && now - self.last_seen <= window
    }
}

/// Authoritative registry of live players.
pub struct PlayerTracker {
    players: RwLock<HashMap<String, Player>>,
    bus: Arc<EventBus>,
    history: HistoryLog,
}

impl PlayerTracker {
    pub fn new(bus: Arc<EventBus>, history: HistoryLog) -> Self {
        Self {
            players: RwLock::new(HashMap::new()),
            bus,
            history,
        }
    }

    /// Combined transmitter report: position, vehicle state, and AFK flag in
    /// one call. Creates the player on first contact.
    pub async fn report(
        &self,
        nick: &str,
        x: f64,
        y: f64,
        in_vehicle: bool,
        afk: bool,
    ) -> Result<Player, CoreError> {
        let nick = valid_nick(nick)?;
        let now = Utc::now();

        let snapshot = {
            let mut players = self.players.write().await;
            let player = players
                .entry(nick.to_lowercase())
                .or_insert_with(|| Player::new(nick, now));
            player.pos = Some(WorldPos::new(x, y));
            player.in_vehicle = in_vehicle;
            player.is_afk = afk;
            player.last_update = now;
            if in_vehicle {
                player.last_seen = now;
            }
            player.clone()
        };

        self.bus.publish(LiveEvent::new(names::PLAYER_UPDATED).with_payload(json!({
            "nick": &snapshot.nick,
            "x": x,
            "y": y,
            "isAfk": afk,
            "inVehicle": in_vehicle,
        })));
        self.history.append(json!({
            "type": "coords",
            "nick": &snapshot.nick,
            "x": x,
            "y": y,
            "isAfk": afk,
            "inVehicle": in_vehicle,
        }));

        Ok(snapshot)
    }

    /// Update only the position, creating the player if needed.
    pub async fn upsert_position(&self, nick: &str, x: f64, y: f64) -> Result<Player, CoreError> {
        let nick = valid_nick(nick)?;
        let now = Utc::now();

        let snapshot = {
            let mut players = self.players.write().await;
            let player = players
                .entry(nick.to_lowercase())
                .or_insert_with(|| Player::new(nick, now));
            player.pos = Some(WorldPos::new(x, y));
            player.last_update = now;
            player.clone()
        };

        self.bus.publish(
            LiveEvent::new(names::PLAYER_UPDATED)
                .with_payload(json!({ "nick": &snapshot.nick, "x": x, "y": y })),
        );
        self.history
            .append(json!({ "type": "coords", "nick": &snapshot.nick, "x": x, "y": y }));

        Ok(snapshot)
    }

    /// Toggle the in-vehicle flag. Entering (or re-reporting) a vehicle
    /// refreshes the freshness timestamp.
    pub async fn set_vehicle_state(&self, nick: &str, in_vehicle: bool) -> Result<Player, CoreError> {
        let nick = valid_nick(nick)?;
        let now = Utc::now();

        let snapshot = {
            let mut players = self.players.write().await;
            let player = players
                .get_mut(&nick.to_lowercase())
                .ok_or_else(|| CoreError::not_found("Player", nick))?;
            player.in_vehicle = in_vehicle;
            player.last_update = now;
            if in_vehicle {
                player.last_seen = now;
            }
            player.clone()
        };

        self.bus.publish(
            LiveEvent::new(names::PLAYER_UPDATED)
                .with_payload(json!({ "nick": &snapshot.nick, "inVehicle": in_vehicle })),
        );
        self.history.append(json!({
            "type": "vehicle_state",
            "nick": &snapshot.nick,
            "inVehicle": in_vehicle,
        }));

        Ok(snapshot)
    }

    /// Toggle the AFK flag.
    pub async fn set_afk(&self, nick: &str, afk: bool) -> Result<Player, CoreError> {
        let nick = valid_nick(nick)?;
        let now = Utc::now();

        let snapshot = {
            let mut players = self.players.write().await;
            let player = players
                .get_mut(&nick.to_lowercase())
                .ok_or_else(|| CoreError::not_found("Player", nick))?;
            player.is_afk = afk;
            player.last_update = now;
            player.clone()
        };

        self.bus.publish(
            LiveEvent::new(names::PLAYER_UPDATED)
                .with_payload(json!({ "nick": &snapshot.nick, "isAfk": afk })),
        );
        self.history
            .append(json!({ "type": "afk", "nick": &snapshot.nick, "isAfk": afk }));

        Ok(snapshot)
    }

    /// Set the free-text base status, creating the player if needed.
    pub async fn set_status(&self, nick: &str, status: &str) -> Result<Player, CoreError> {
        let nick = valid_nick(nick)?;
        let now = Utc::now();

        let snapshot = {
            let mut players = self.players.write().await;
            let player = players
                .entry(nick.to_lowercase())
                .or_insert_with(|| Player::new(nick, now));
            player.base_status = status.to_string();
            player.last_update = now;
            player.clone()
        };

        self.bus.publish(
            LiveEvent::new(names::PLAYER_STATUS)
                .with_payload(json!({ "nick": &snapshot.nick, "status": status })),
        );
        self.history
            .append(json!({ "type": "status", "nick": &snapshot.nick, "status": status }));

        Ok(snapshot)
    }

    /// Toggle the panic flag, creating the player if needed.
    pub async fn set_panic(&self, nick: &str, on: bool) -> Result<Player, CoreError> {
        let nick = valid_nick(nick)?;
        let now = Utc::now();

        let snapshot = {
            let mut players = self.players.write().await;
            let player = players
                .entry(nick.to_lowercase())
                .or_insert_with(|| Player::new(nick, now));
            player.panic = on;
            player.last_update = now;
            player.clone()
        };

        self.bus.publish(
            LiveEvent::new(names::PANIC_UPDATED)
                .with_payload(json!({ "nick": &snapshot.nick, "value": on })),
        );
        self.history
            .append(json!({ "type": "panic", "nick": &snapshot.nick, "value": on }));

        Ok(snapshot)
    }

    /// Lightweight liveness report. Creates a placeholder record with an
    /// unknown position if the player has never reported coordinates;
    /// otherwise updates flags only and preserves the last known position.
    pub async fn heartbeat(&self, nick: &str, in_vehicle: bool, afk: bool) -> Result<Player, CoreError> {
        let nick = valid_nick(nick)?;
        let now = Utc::now();

        let snapshot = {
            let mut players = self.players.write().await;
            let player = players
                .entry(nick.to_lowercase())
                .or_insert_with(|| Player::new(nick, now));
            player.in_vehicle = in_vehicle;
            player.is_afk = afk;
            player.last_update = now;
            if in_vehicle {
                player.last_seen = now;
            }
            player.clone()
        };

        self.bus.publish(LiveEvent::new(names::PLAYER_UPDATED).with_payload(json!({
            "nick": &snapshot.nick,
            "x": snapshot.pos.map(|p| p.x),
            "y": snapshot.pos.map(|p| p.y),
            "isAfk": afk,
            "inVehicle": in_vehicle,
        })));
        self.history.append(json!({
            "type": "heartbeat",
            "nick": &snapshot.nick,
            "isAfk": afk,
            "inVehicle": in_vehicle,
        }));

        Ok(snapshot)
    }

    /// Point-in-time snapshot of players that reported within `max_age`,
    /// sorted by nickname for stable output.
    pub async fn alive_players(&self, max_age: Duration) -> Vec<Player> {
        let now = Utc::now();
        let players = self.players.read().await;
        let mut alive: Vec<Player> = players
            .values()
            .filter(|p| p.is_alive(max_age, now))
            .cloned()
            .collect();
        alive.sort_by(|a, b| a.nick.to_lowercase().cmp(&b.nick.to_lowercase()));
        alive
    }

    /// Look up a player by nickname, case-insensitively.
    pub async fn get(&self, nick: &str) -> Option<Player> {
        self.players.read().await.get(&nick.to_lowercase()).cloned()
    }

    /// Whether the player counts as active for unit-eviction purposes.
    pub async fn is_active(&self, nick: &str, window: Duration) -> bool {
        let now = Utc::now();
        self.players
            .read()
            .await
            .get(&nick.to_lowercase())
            .is_some_and(|p| p.is_active(window, now))
    }
}

/// Reject blank nicknames before any mutation.
fn valid_nick(nick: &str) -> Result<&str, CoreError> {
    let trimmed = nick.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("Nickname must not be empty".into()));
    }
    Ok(trimmed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn tracker() -> PlayerTracker {
        PlayerTracker::new(Arc::new(EventBus::default()), HistoryLog::disabled())
    }

    #[tokio::test]
    async fn report_creates_and_positions_a_player() {
        let tracker = tracker();

        let player = tracker.report("Carl", 1544.8, -1675.5, true, false).await.unwrap();

        assert_eq!(player.nick, "Carl");
        assert_eq!(player.pos, Some(WorldPos::new(1544.8, -1675.5)));
        assert!(player.in_vehicle);
        assert!(!player.is_afk);
    }

    #[tokio::test]
    async fn nicknames_are_case_insensitive_but_keep_original_casing() {
        let tracker = tracker();

        tracker.report("Carl", 0.0, 0.0, false, false).await.unwrap();
        let player = tracker.get("CARL").await.expect("player should exist");

        assert_eq!(player.nick, "Carl");
    }

    #[tokio::test]
    async fn blank_nick_is_rejected_before_any_mutation() {
        let tracker = tracker();

        assert_matches!(
            tracker.report("   ", 0.0, 0.0, false, false).await,
            Err(CoreError::Validation(_))
        );
        assert!(tracker.get("").await.is_none());
    }

    #[tokio::test]
    async fn heartbeat_creates_a_placeholder_without_position() {
        let tracker = tracker();

        let player = tracker.heartbeat("Ghost", false, true).await.unwrap();

        assert_eq!(player.pos, None);
        assert!(player.is_afk);
    }

    #[tokio::test]
    async fn heartbeat_preserves_last_known_position() {
        let tracker = tracker();

        tracker.report("Carl", 100.0, 200.0, true, false).await.unwrap();
        let player = tracker.heartbeat("Carl", false, false).await.unwrap();

        assert_eq!(player.pos, Some(WorldPos::new(100.0, 200.0)));
        assert!(!player.in_vehicle);
    }

    #[tokio::test]
    async fn vehicle_state_on_unknown_player_is_not_found() {
        let tracker = tracker();

        assert_matches!(
            tracker.set_vehicle_state("nobody", true).await,
            Err(CoreError::NotFound { entity: "Player", .. })
        );
    }

    #[tokio::test]
    async fn alive_players_excludes_stale_records() {
        let tracker = tracker();

        tracker.report("Fresh", 0.0, 0.0, false, false).await.unwrap();

        // Zero-width liveness window excludes everyone not updated "now".
        let alive = tracker.alive_players(Duration::seconds(60)).await;
        assert_eq!(alive.len(), 1);

        let none = tracker.alive_players(Duration::seconds(-1)).await;
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn alive_players_is_sorted_by_nick() {
        let tracker = tracker();

        tracker.report("zeta", 0.0, 0.0, false, false).await.unwrap();
        tracker.report("Alpha", 0.0, 0.0, false, false).await.unwrap();

        let alive = tracker.alive_players(Duration::seconds(60)).await;
        let nicks: Vec<&str> = alive.iter().map(|p| p.nick.as_str()).collect();
        assert_eq!(nicks, vec!["Alpha", "zeta"]);
    }

    #[tokio::test]
    async fn activity_requires_vehicle_and_freshness() {
        let now = Utc::now();
        let mut player = Player::new("Carl", now);

        // Not in a vehicle: never active.
        assert!(!player.is_active(Duration::minutes(5), now));

        // In a vehicle with a fresh report: active.
        player.in_vehicle = true;
        player.last_seen = now;
        assert!(player.is_active(Duration::minutes(5), now));

        // In a vehicle but the report went stale: inactive.
        player.last_seen = now - Duration::minutes(6);
        assert!(!player.is_active(Duration::minutes(5), now));
    }

    #[tokio::test]
    async fn mutations_publish_delta_events() {
        let bus = Arc::new(EventBus::default());
        let tracker = PlayerTracker::new(Arc::clone(&bus), HistoryLog::disabled());
        let mut rx = bus.subscribe();

        tracker.report("Carl", 5.0, 6.0, false, false).await.unwrap();

        let event = rx.recv().await.expect("should receive player.updated");
        assert_eq!(event.event, names::PLAYER_UPDATED);
        assert_eq!(event.payload["nick"], "Carl");
        assert_eq!(event.payload["x"], 5.0);
    }

    #[tokio::test]
    async fn panic_flag_round_trips() {
        let tracker = tracker();

        let on = tracker.set_panic("Carl", true).await.unwrap();
        assert!(on.panic);

        let off = tracker.set_panic("Carl", false).await.unwrap();
        assert!(!off.panic);
    }
}

//! Unit registry.
//!
//! A unit is a named group of players represented on the map by its primary
//! member's position (the first nick in the ordered member list). Units are
//! created by dispatchers, mutated by membership/status/assignment changes,
//! and destroyed either explicitly or by the eviction scheduler once no
//! member has been in a vehicle within the freshness window.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::sync::RwLock;
use uuid::Uuid;

use gridwatch_core::{CoreError, Timestamp};
use gridwatch_events::{names, EventBus, HistoryLog, LiveEvent};

/// A named group of players.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    pub id: Uuid,
    /// Display label, e.g. a callsign like `"1-ADAM-12"`.
    pub marking: String,
    /// Ordered member nicks; the first is the primary/representative member
    /// whose position the unit renders at.
    pub members: Vec<String>,
    pub status: String,
    /// Support assignment to a situation, if any.
    pub situation_id: Option<Uuid>,
    pub created_at: Timestamp,
}

impl Unit {
    /// The primary member whose position represents the unit.
    pub fn primary(&self) -> Option<&str> {
        self.members.first().map(String::as_str)
    }

    pub fn player_count(&self) -> usize {
        self.members.len()
    }
}

/// Authoritative registry of units.
pub struct UnitRegistry {
    units: RwLock<HashMap<Uuid, Unit>>,
    bus: Arc<EventBus>,
    history: HistoryLog,
}

impl UnitRegistry {
    pub fn new(bus: Arc<EventBus>, history: HistoryLog) -> Self {
        Self {
            units: RwLock::new(HashMap::new()),
            bus,
            history,
        }
    }

    /// Create a unit with an initial member list.
    pub async fn create(&self, marking: &str, members: Vec<String>) -> Result<Unit, CoreError> {
        let marking = marking.trim();
        if marking.is_empty() {
            return Err(CoreError::Validation("Unit marking must not be empty".into()));
        }
        let members: Vec<String> = members
            .into_iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        if members.is_empty() {
            return Err(CoreError::Validation("Unit needs at least one member".into()));
        }

        let unit = Unit {
            id: Uuid::new_v4(),
            marking: marking.to_string(),
            members,
            status: String::new(),
            situation_id: None,
            created_at: Utc::now(),
        };

        self.units.write().await.insert(unit.id, unit.clone());

        self.publish_updated(&unit);
        self.history.append(json!({
            "type": "unit_create",
            "id": unit.id,
            "marking": &unit.marking,
            "members": &unit.members,
        }));

        Ok(unit)
    }

    /// Set the unit's status string (e.g. `"Code 7"`).
    pub async fn set_status(&self, id: Uuid, status: &str) -> Result<Unit, CoreError> {
        let snapshot = {
            let mut units = self.units.write().await;
            let unit = units.get_mut(&id).ok_or_else(|| CoreError::not_found("Unit", id))?;
            unit.status = status.to_string();
            unit.clone()
        };

        self.publish_updated(&snapshot);
        self.history
            .append(json!({ "type": "unit_status", "id": id, "status": status }));

        Ok(snapshot)
    }

    /// Assign or clear the unit's supporting situation.
    pub async fn set_situation(&self, id: Uuid, situation_id: Option<Uuid>) -> Result<Unit, CoreError> {
        let snapshot = {
            let mut units = self.units.write().await;
            let unit = units.get_mut(&id).ok_or_else(|| CoreError::not_found("Unit", id))?;
            unit.situation_id = situation_id;
            unit.clone()
        };

        self.publish_updated(&snapshot);
        self.history.append(json!({
            "type": "unit_situation",
            "id": id,
            "situationId": situation_id,
        }));

        Ok(snapshot)
    }

    /// Add a member nick; a nick already present (case-insensitively) is
    /// left in place.
    pub async fn add_member(&self, id: Uuid, nick: &str) -> Result<Unit, CoreError> {
        let nick = nick.trim();
        if nick.is_empty() {
            return Err(CoreError::Validation("Nickname must not be empty".into()));
        }

        let snapshot = {
            let mut units = self.units.write().await;
            let unit = units.get_mut(&id).ok_or_else(|| CoreError::not_found("Unit", id))?;
            if !unit
                .members
                .iter()
                .any(|m| m.eq_ignore_ascii_case(nick))
            {
                unit.members.push(nick.to_string());
            }
            unit.clone()
        };

        self.publish_updated(&snapshot);
        self.history
            .append(json!({ "type": "unit_add_member", "id": id, "nick": nick }));

        Ok(snapshot)
    }

    /// Remove a member nick. A unit left with no members has no active
    /// member by definition and will be reclaimed by the eviction scheduler.
    pub async fn remove_member(&self, id: Uuid, nick: &str) -> Result<Unit, CoreError> {
        let snapshot = {
            let mut units = self.units.write().await;
            let unit = units.get_mut(&id).ok_or_else(|| CoreError::not_found("Unit", id))?;
            unit.members.retain(|m| !m.eq_ignore_ascii_case(nick));
            unit.clone()
        };

        self.publish_updated(&snapshot);
        self.history
            .append(json!({ "type": "unit_remove_member", "id": id, "nick": nick }));

        Ok(snapshot)
    }

    /// Remove the unit permanently.
    pub async fn delete(&self, id: Uuid) -> Result<Unit, CoreError> {
        let removed = self
            .units
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| CoreError::not_found("Unit", id))?;

        self.bus
            .publish(LiveEvent::new(names::UNIT_DELETED).with_payload(json!({ "id": id })));
        self.history.append(json!({ "type": "unit_delete", "id": id }));

        Ok(removed)
    }

    pub async fn get(&self, id: Uuid) -> Option<Unit> {
        self.units.read().await.get(&id).cloned()
    }

    /// Point-in-time snapshot of all units, oldest first.
    pub async fn get_all(&self) -> Vec<Unit> {
        let units = self.units.read().await;
        let mut all: Vec<Unit> = units.values().cloned().collect();
        all.sort_by_key(|u| u.created_at);
        all
    }

    fn publish_updated(&self, unit: &Unit) {
        let payload = serde_json::to_value(unit).unwrap_or_default();
        self.bus
            .publish(LiveEvent::new(names::UNIT_UPDATED).with_payload(payload));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn registry() -> UnitRegistry {
        UnitRegistry::new(Arc::new(EventBus::default()), HistoryLog::disabled())
    }

    #[tokio::test]
    async fn create_keeps_member_order_and_primary() {
        let registry = registry();

        let unit = registry
            .create("1-ADAM-12", vec!["Reed".into(), "Malloy".into()])
            .await
            .unwrap();

        assert_eq!(unit.primary(), Some("Reed"));
        assert_eq!(unit.player_count(), 2);
    }

    #[tokio::test]
    async fn create_rejects_blank_marking_and_empty_members() {
        let registry = registry();

        assert_matches!(
            registry.create("  ", vec!["Reed".into()]).await,
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            registry.create("1-ADAM-12", vec!["  ".into()]).await,
            Err(CoreError::Validation(_))
        );
    }

    #[tokio::test]
    async fn add_member_is_case_insensitively_idempotent() {
        let registry = registry();
        let unit = registry.create("2-LINCOLN-3", vec!["Reed".into()]).await.unwrap();

        let after = registry.add_member(unit.id, "REED").await.unwrap();
        assert_eq!(after.player_count(), 1);

        let after = registry.add_member(unit.id, "Malloy").await.unwrap();
        assert_eq!(after.player_count(), 2);
    }

    #[tokio::test]
    async fn removing_all_members_leaves_an_empty_unit() {
        let registry = registry();
        let unit = registry.create("2-LINCOLN-3", vec!["Reed".into()]).await.unwrap();

        let after = registry.remove_member(unit.id, "reed").await.unwrap();
        assert!(after.members.is_empty());
        assert_eq!(after.primary(), None);
    }

    #[tokio::test]
    async fn delete_removes_the_record_and_broadcasts() {
        let bus = Arc::new(EventBus::default());
        let registry = UnitRegistry::new(Arc::clone(&bus), HistoryLog::disabled());
        let unit = registry.create("3-MARY-7", vec!["Wells".into()]).await.unwrap();

        let mut rx = bus.subscribe();
        registry.delete(unit.id).await.unwrap();

        assert!(registry.get(unit.id).await.is_none());
        let event = rx.recv().await.expect("should receive unit.deleted");
        assert_eq!(event.event, names::UNIT_DELETED);
    }

    #[tokio::test]
    async fn delete_unknown_unit_is_not_found() {
        let registry = registry();

        assert_matches!(
            registry.delete(Uuid::new_v4()).await,
            Err(CoreError::NotFound { entity: "Unit", .. })
        );
    }

    #[tokio::test]
    async fn get_all_returns_units_oldest_first() {
        let registry = registry();
        let first = registry.create("A", vec!["p1".into()]).await.unwrap();
        let second = registry.create("B", vec!["p2".into()]).await.unwrap();

        let all = registry.get_all().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, first.id);
        assert_eq!(all[1].id, second.id);
    }
}

//! Stale-unit eviction.
//!
//! A unit counts as active while at least one member is in a vehicle with a
//! fresh report. When a sweep finds a unit with no active member it schedules
//! a single deferred deletion one freshness window out; if a member re-enters
//! a vehicle before the timer fires the timer is cancelled, and the timer
//! itself re-checks before deleting because state may have changed during
//! the wait. This avoids flapping delete/recreate cycles for units whose
//! members briefly step out of a vehicle while still reclaiming genuinely
//! abandoned units.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::tracker::PlayerTracker;
use crate::units::{Unit, UnitRegistry};

/// How long a unit may sit with no active member before it is deleted.
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(5 * 60);

/// How often the background loop re-evaluates every unit.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Per-unit deferred-deletion watchdog.
pub struct EvictionScheduler {
    units: Arc<UnitRegistry>,
    tracker: Arc<PlayerTracker>,
    window: Duration,
    /// At most one pending timer per unit; the token cancels it.
    pending: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl EvictionScheduler {
    pub fn new(units: Arc<UnitRegistry>, tracker: Arc<PlayerTracker>) -> Arc<Self> {
        Self::with_window(units, tracker, FRESHNESS_WINDOW)
    }

    /// Scheduler with a custom freshness window. Used by tests.
    pub fn with_window(
        units: Arc<UnitRegistry>,
        tracker: Arc<PlayerTracker>,
        window: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            units,
            tracker,
            window,
            pending: Mutex::new(HashMap::new()),
        })
    }

    /// Run the sweep loop until `cancel` is triggered.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!(
            window_secs = self.window.as_secs(),
            interval_secs = SWEEP_INTERVAL.as_secs(),
            "Eviction scheduler started"
        );

        let mut interval = tokio::time::interval(SWEEP_INTERVAL);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Eviction scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.sweep().await;
                }
            }
        }
    }

    /// Evaluate every unit once: schedule timers for inactive units, cancel
    /// timers for units that regained an active member.
    pub async fn sweep(self: &Arc<Self>) {
        for unit in self.units.get_all().await {
            if self.any_member_active(&unit).await {
                self.cancel_pending(unit.id).await;
            } else {
                self.schedule(unit.id).await;
            }
        }
    }

    /// Whether the unit has a pending eviction timer. Exposed for tests and
    /// diagnostics.
    pub async fn is_pending(&self, unit_id: Uuid) -> bool {
        self.pending.lock().await.contains_key(&unit_id)
    }

    async fn any_member_active(&self, unit: &Unit) -> bool {
        let window = chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::MAX);
        for nick in &unit.members {
            if self.tracker.is_active(nick, window).await {
                return true;
            }
        }
        false
    }

    async fn cancel_pending(&self, unit_id: Uuid) {
        if let Some(token) = self.pending.lock().await.remove(&unit_id) {
            token.cancel();
            tracing::debug!(unit_id = %unit_id, "Unit active again, eviction cancelled");
        }
    }

    /// Schedule a deferred deletion. Idempotent: a unit that already has a
    /// pending timer keeps it.
    async fn schedule(self: &Arc<Self>, unit_id: Uuid) {
        let token = {
            let mut pending = self.pending.lock().await;
            if pending.contains_key(&unit_id) {
                return;
            }
            let token = CancellationToken::new();
            pending.insert(unit_id, token.clone());
            token
        };

        tracing::debug!(unit_id = %unit_id, delay_secs = self.window.as_secs(), "Unit eviction scheduled");

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(this.window) => {
                    this.fire(unit_id).await;
                }
            }
            this.pending.lock().await.remove(&unit_id);
        });
    }

    /// The timer fired: re-check before deleting, because a member may have
    /// become active during the wait (including past a best-effort cancel).
    async fn fire(&self, unit_id: Uuid) {
        let Some(unit) = self.units.get(unit_id).await else {
            return;
        };
        if self.any_member_active(&unit).await {
            tracing::debug!(unit_id = %unit_id, "Unit regained activity during wait, not evicting");
            return;
        }
        match self.units.delete(unit_id).await {
            Ok(unit) => {
                tracing::info!(unit_id = %unit_id, marking = %unit.marking, "Evicted stale unit");
            }
            Err(e) => {
                tracing::debug!(unit_id = %unit_id, error = %e, "Unit vanished before eviction");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use gridwatch_events::{EventBus, HistoryLog};

    const WINDOW: Duration = Duration::from_secs(60);

    struct Fixture {
        tracker: Arc<PlayerTracker>,
        units: Arc<UnitRegistry>,
        scheduler: Arc<EvictionScheduler>,
        bus: Arc<EventBus>,
    }

    fn fixture() -> Fixture {
        let bus = Arc::new(EventBus::default());
        let history = HistoryLog::disabled();
        let tracker = Arc::new(PlayerTracker::new(Arc::clone(&bus), history.clone()));
        let units = Arc::new(UnitRegistry::new(Arc::clone(&bus), history));
        let scheduler =
            EvictionScheduler::with_window(Arc::clone(&units), Arc::clone(&tracker), WINDOW);
        Fixture {
            tracker,
            units,
            scheduler,
            bus,
        }
    }

    /// Let the paused clock run past the eviction window so pending timers
    /// fire, then yield until their tasks have run to completion.
    async fn advance_past_window() {
        tokio::time::sleep(WINDOW + Duration::from_secs(1)).await;
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn inactive_unit_is_deleted_after_one_window() {
        let f = fixture();
        // Member exists but is on foot: never active.
        f.tracker.report("Reed", 0.0, 0.0, false, false).await.unwrap();
        let unit = f.units.create("1-ADAM-12", vec!["Reed".into()]).await.unwrap();

        f.scheduler.sweep().await;
        assert!(f.scheduler.is_pending(unit.id).await);

        advance_past_window().await;

        assert!(f.units.get(unit.id).await.is_none());
        assert!(!f.scheduler.is_pending(unit.id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn active_unit_is_never_scheduled() {
        let f = fixture();
        f.tracker.report("Reed", 0.0, 0.0, true, false).await.unwrap();
        let unit = f.units.create("1-ADAM-12", vec!["Reed".into()]).await.unwrap();

        f.scheduler.sweep().await;

        assert!(!f.scheduler.is_pending(unit.id).await);
        assert!(f.units.get(unit.id).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn reactivation_before_the_timer_cancels_it() {
        let f = fixture();
        f.tracker.report("Reed", 0.0, 0.0, false, false).await.unwrap();
        let unit = f.units.create("1-ADAM-12", vec!["Reed".into()]).await.unwrap();

        f.scheduler.sweep().await;
        assert!(f.scheduler.is_pending(unit.id).await);

        // A member gets back into a vehicle; the next sweep cancels.
        f.tracker.set_vehicle_state("Reed", true).await.unwrap();
        f.scheduler.sweep().await;
        assert!(!f.scheduler.is_pending(unit.id).await);

        advance_past_window().await;
        assert!(f.units.get(unit.id).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_rechecks_activity_before_deleting() {
        let f = fixture();
        f.tracker.report("Reed", 0.0, 0.0, false, false).await.unwrap();
        let unit = f.units.create("1-ADAM-12", vec!["Reed".into()]).await.unwrap();

        f.scheduler.sweep().await;

        // Reactivate without sweeping: the pending timer still fires, but
        // its re-check must see the activity and keep the unit.
        f.tracker.set_vehicle_state("Reed", true).await.unwrap();

        advance_past_window().await;

        assert!(f.units.get(unit.id).await.is_some());
        assert!(!f.scheduler.is_pending(unit.id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduling_is_idempotent_across_sweeps() {
        let f = fixture();
        f.tracker.report("Reed", 0.0, 0.0, false, false).await.unwrap();
        let unit = f.units.create("1-ADAM-12", vec!["Reed".into()]).await.unwrap();

        f.scheduler.sweep().await;
        f.scheduler.sweep().await;
        f.scheduler.sweep().await;
        assert!(f.scheduler.is_pending(unit.id).await);

        advance_past_window().await;

        // One deletion, then nothing left to fire.
        assert!(f.units.get(unit.id).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn any_active_member_keeps_the_whole_unit() {
        let f = fixture();
        f.tracker.report("Reed", 0.0, 0.0, false, false).await.unwrap();
        f.tracker.report("Malloy", 0.0, 0.0, true, false).await.unwrap();
        let unit = f
            .units
            .create("1-ADAM-12", vec!["Reed".into(), "Malloy".into()])
            .await
            .unwrap();

        f.scheduler.sweep().await;

        assert!(!f.scheduler.is_pending(unit.id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn memberless_unit_is_reclaimed() {
        let f = fixture();
        let unit = f.units.create("GHOST", vec!["Reed".into()]).await.unwrap();
        f.units.remove_member(unit.id, "Reed").await.unwrap();

        f.scheduler.sweep().await;
        advance_past_window().await;

        assert!(f.units.get(unit.id).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_broadcasts_the_unit_deletion() {
        let f = fixture();
        f.tracker.report("Reed", 0.0, 0.0, false, false).await.unwrap();
        let unit = f.units.create("1-ADAM-12", vec!["Reed".into()]).await.unwrap();

        let mut rx = f.bus.subscribe();
        f.scheduler.sweep().await;
        advance_past_window().await;

        // Skip interleaved events until the deletion shows up.
        loop {
            let event = rx.try_recv().expect("unit.deleted should have been published");
            if event.event == gridwatch_events::names::UNIT_DELETED {
                assert_eq!(event.payload["id"], serde_json::json!(unit.id));
                break;
            }
        }
    }
}

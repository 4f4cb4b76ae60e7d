//! Gridwatch live-state engine.
//!
//! The authoritative in-memory registries and the rules that keep them
//! consistent under concurrent updates:
//!
//! - [`tracker`] — live players: positions, vehicle/AFK flags, liveness.
//! - [`units`] — units (named player groups) and their membership.
//! - [`situations`] — incident lifecycle, unit roles, channel bindings.
//! - [`channels`] — tactical channels and the at-most-one-situation lock.
//! - [`eviction`] — deferred deletion of units whose members went inactive.
//!
//! Each registry owns its records behind a `tokio::sync::RwLock` and is
//! shared via `Arc`. Every successful mutation publishes one event to the
//! injected [`EventBus`](gridwatch_events::EventBus) and appends one record
//! to the [`HistoryLog`](gridwatch_events::HistoryLog), both after the
//! registry lock has been released and both fire-and-forget.

pub mod channels;
pub mod eviction;
pub mod situations;
pub mod tracker;
pub mod units;

pub use channels::{ChannelRegistry, TacticalChannel};
pub use eviction::EvictionScheduler;
pub use situations::{Situation, SituationHub};
pub use tracker::{Player, PlayerTracker};
pub use units::{Unit, UnitRegistry};

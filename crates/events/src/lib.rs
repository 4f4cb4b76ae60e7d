//! Gridwatch event bus and audit infrastructure.
//!
//! This crate provides the two injected capabilities every registry mutation
//! reports to:
//!
//! - [`EventBus`] — in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`; the push transport subscribes here.
//! - [`LiveEvent`] — the canonical domain event envelope.
//! - [`HistoryLog`] — bounded fire-and-forget appender behind the JSONL
//!   audit trail.
//!
//! Both capabilities are best-effort: publishing to a bus with no receivers
//! and appending past a full history queue are silently tolerated, never
//! surfaced to the mutation path.

pub mod bus;
pub mod history;

pub use bus::{names, EventBus, LiveEvent};
pub use history::HistoryLog;

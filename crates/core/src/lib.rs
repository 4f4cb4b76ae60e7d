//! Gridwatch core types and pure geometry.
//!
//! This crate has zero internal dependencies so it can be used by the
//! engine, the event infrastructure, and the API layer alike:
//!
//! - [`types`] — shared aliases and the [`WorldPos`](types::WorldPos)
//!   coordinate type.
//! - [`error`] — the [`CoreError`](error::CoreError) domain error taxonomy.
//! - [`coords`] — liberal decoding of heterogeneous location values into a
//!   normalized world position.
//! - [`viewport`] — world-to-screen projection and the pan/zoom transform.

pub mod coords;
pub mod error;
pub mod types;
pub mod viewport;

pub use error::CoreError;
pub use types::{Timestamp, WorldPos};

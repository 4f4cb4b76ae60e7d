//! WebSocket push transport.
//!
//! Browser clients connect to `GET /ws` and receive every engine event as a
//! JSON text frame. The surface is deliberately small: [`WsManager`] is a
//! registry of outbound queues, [`handler`] drives one socket per observer,
//! and [`forwarder`] is the single pump that feeds the bus into them (and
//! keeps idle connections alive with periodic pings).

pub mod forwarder;
pub mod handler;
pub mod manager;

pub use handler::ws_handler;
pub use manager::WsManager;

//! Live reload system for development mode.
//!
//! Provides file watching and WebSocket-based reload notifications
//! to connected clients when source files change.

mod broadcast;
mod manager;
mod script;
mod websocket;

pub use broadcast::{BroadcastReport, Broadcaster, Connection, ConnectionError, RELOAD_MESSAGE};
pub use manager::{LiveReload, LiveReloadOptions};

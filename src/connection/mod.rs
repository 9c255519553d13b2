//! Connection management for the persistent device link
//!
//! This module handles:
//! - One long-lived TCP session with automatic reconnection at a fixed interval
//! - Ordered delivery of inbound text to a single listener
//! - Fire-and-forget outbound text lines and raw bytes
//! - Heartbeat management

mod heartbeat;
mod listener;
mod manager;
mod reconnect;

pub use heartbeat::HeartbeatTask;
pub use listener::{ConnectionEvent, ConnectionListener};
pub use manager::{ConnectionInfo, ConnectionManager, LinkOptions};
pub use reconnect::FixedBackoff;

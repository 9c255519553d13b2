//! Device Link Shared Types
//!
//! This crate provides the connection state machine, error taxonomy and
//! line codec used by the device-side connection manager and the
//! development peer.

pub mod codec;
pub mod error;
pub mod state_machine;

use std::time::{SystemTime, UNIX_EPOCH};

pub use error::LinkError;
pub use state_machine::{ConnectionState, Trigger};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Default parameters of the deployed link
pub mod defaults {
    /// Fixed delay between reconnection attempts
    pub const RECONNECT_INTERVAL_MS: u64 = 5000;

    /// Connect timeout used when the caller does not supply one
    pub const CONNECT_TIMEOUT_MS: u64 = 5000;

    /// Socket read timeout; a timeout only lets the read loop observe cancellation
    pub const READ_TIMEOUT_MS: u64 = 5000;

    /// Size of a single socket read
    pub const READ_BUFFER_SIZE: usize = 1024;

    /// Production control server
    pub const DEFAULT_SERVER_HOST: &str = "146.56.250.203";

    /// TCP port of the control server
    pub const DEFAULT_SERVER_PORT: u16 = 8013;
}

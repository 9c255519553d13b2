//! Connection State Machine
//!
//! Defines the valid transitions of a persistent link. The manager consults
//! this table before touching any session resource.

use std::fmt;

/// Manager-wide connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket, no attempt in flight
    #[default]
    Disconnected,
    /// One connection attempt in flight
    Connecting,
    /// Socket established and read/write tasks running
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Caller or reconnect loop started an attempt
    ConnectRequested,
    /// Socket established and streams opened
    Established,
    /// Timeout, refusal or resolution failure at connect time
    ConnectFailed,
    /// Peer closed the stream (read returned zero bytes)
    StreamClosed,
    /// Read or write error on an established socket
    IoFailed,
    /// Caller asked to disconnect
    DisconnectRequested,
}

impl Trigger {
    /// Whether this transition should leave a reconnect loop behind
    pub fn schedules_reconnect(self) -> bool {
        matches!(
            self,
            Trigger::ConnectFailed | Trigger::StreamClosed | Trigger::IoFailed
        )
    }
}

impl ConnectionState {
    /// Get the next state for a given trigger, if the transition is valid
    pub fn next(self, trigger: Trigger) -> Option<ConnectionState> {
        use ConnectionState::*;
        use Trigger::*;

        match (self, trigger) {
            (Disconnected, ConnectRequested) => Some(Connecting),

            (Connecting, Established) => Some(Connected),
            (Connecting, ConnectFailed) => Some(Disconnected),

            (Connected, StreamClosed | IoFailed | DisconnectRequested) => Some(Disconnected),

            _ => None,
        }
    }

    /// Check if the link is usable for sending
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

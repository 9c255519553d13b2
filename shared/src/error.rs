//! Error taxonomy for the persistent link

use thiserror::Error;

/// Errors reported by the connection manager
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// DNS failure, refusal or timeout while connecting
    #[error("{0}")]
    ConnectFailure(String),

    /// Read or write failure on an established connection
    #[error("{0}")]
    IoFailure(String),

    /// A read timed out; the read loop keeps going
    #[error("read timeout")]
    ProtocolTimeout,

    /// Operation requires a live connection
    #[error("not connected, cannot {operation}")]
    NotConnected { operation: &'static str },

    /// The manager was destroyed and can't be reused
    #[error("manager destroyed")]
    Destroyed,
}

impl LinkError {
    /// Connect attempt exceeded its deadline
    pub fn connect_timeout() -> Self {
        LinkError::ConnectFailure("connect timeout".into())
    }

    /// Connect attempt failed with an I/O error
    pub fn connect_failed(target: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        LinkError::ConnectFailure(format!("connect to {} failed: {}", target, err))
    }

    /// Peer closed the stream
    pub fn closed_by_peer() -> Self {
        LinkError::IoFailure("connection closed by peer".into())
    }

    /// Caller misused the API; no state change follows
    pub fn is_misuse(&self) -> bool {
        matches!(self, LinkError::NotConnected { .. } | LinkError::Destroyed)
    }

    /// Failure is handled locally by the reconnect loop
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LinkError::ConnectFailure(_) | LinkError::IoFailure(_) | LinkError::ProtocolTimeout
        )
    }
}

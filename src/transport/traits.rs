//! Transport trait abstraction for pluggable network backends

use async_trait::async_trait;
use device_link_shared::LinkError;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

/// Where to connect and how long to wait for it
///
/// Cached by the manager so every reconnect reuses the most recent target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
}

impl ConnectionTarget {
    pub fn new(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
        }
    }

    /// `host:port` form accepted by the socket resolver
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A transport stream that can read and write bytes
///
/// Dropping the stream closes it.
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Human-readable remote endpoint
    fn peer_description(&self) -> String;
}

/// Factory for creating transport connections
#[async_trait]
pub trait TransportConnector: Send + Sync + 'static {
    /// The stream type this connector produces
    type Stream: TransportStream;

    /// Attempt to connect, returning a stream on success
    ///
    /// The deadline in `target` is enforced by the caller.
    async fn connect(&self, target: &ConnectionTarget) -> Result<Self::Stream, LinkError>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}

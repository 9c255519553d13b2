//! TCP transport implementation for the control server link

use crate::transport::traits::{ConnectionTarget, TransportConnector, TransportStream};
use async_trait::async_trait;
use device_link_shared::LinkError;
use tokio::net::TcpStream;

impl TransportStream for TcpStream {
    fn peer_description(&self) -> String {
        match self.peer_addr() {
            Ok(addr) => addr.to_string(),
            Err(_) => "unknown peer".into(),
        }
    }
}

/// TCP connector for plain socket connections
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl TcpConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportConnector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, target: &ConnectionTarget) -> Result<Self::Stream, LinkError> {
        let stream = TcpStream::connect(target.address())
            .await
            .map_err(|e| LinkError::connect_failed(target, e))?;
        // Heartbeats and control lines are small
        stream
            .set_nodelay(true)
            .map_err(|e| LinkError::connect_failed(target, e))?;
        Ok(stream)
    }

    fn name(&self) -> &'static str {
        "TCP"
    }
}

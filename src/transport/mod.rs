//! Byte-stream transports the connection manager runs on

pub mod tcp;
pub mod traits;

pub use tcp::TcpConnector;
pub use traits::{ConnectionTarget, TransportConnector, TransportStream};

//! Device Link
//!
//! Keeps one persistent TCP session to the control server alive across
//! transient failures and exposes it as a simple asynchronous message
//! interface.

pub mod config;
pub mod connection;
pub mod report;
pub mod transport;

pub use config::{HeartbeatSettings, Settings, SettingsError};
pub use connection::{ConnectionEvent, ConnectionInfo, ConnectionListener, ConnectionManager};
pub use device_link_shared::{ConnectionState, LinkError};

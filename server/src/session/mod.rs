//! Session management for connected devices
//!
//! This module handles:
//! - Tracking every connected device link
//! - Logging and optionally echoing inbound text
//! - Idle detection and reaping of silent links

mod connection;
mod manager;

pub use connection::{PeerSession, SessionHandle};
pub use manager::SessionManager;

//! Link settings loaded from TOML
//!
//! Every field has a default, so a missing key (or an empty file) falls
//! back to the deployed values in `device_link_shared::defaults`.

use device_link_shared::defaults;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while reading settings
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Invalid settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

/// Periodic keep-alive configuration
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct HeartbeatSettings {
    pub interval_ms: u64,
    pub payload: String,
}

/// Configuration for the device link
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Control server host
    pub host: String,
    /// Control server port
    pub port: u16,
    /// Connection timeout
    pub connect_timeout_ms: u64,
    /// Bounded socket read, lets the read loop notice cancellation
    pub read_timeout_ms: u64,
    /// Fixed delay between reconnect attempts
    pub reconnect_interval_ms: u64,
    /// Bytes requested per socket read
    pub read_buffer_size: usize,
    /// Keep-alive, off when absent
    pub heartbeat: Option<HeartbeatSettings>,
    /// Serial number stamped on time reports
    pub serial_number: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: defaults::DEFAULT_SERVER_HOST.into(),
            port: defaults::DEFAULT_SERVER_PORT,
            connect_timeout_ms: defaults::CONNECT_TIMEOUT_MS,
            read_timeout_ms: defaults::READ_TIMEOUT_MS,
            reconnect_interval_ms: defaults::RECONNECT_INTERVAL_MS,
            read_buffer_size: defaults::READ_BUFFER_SIZE,
            heartbeat: None,
            serial_number: String::new(),
        }
    }
}

impl Settings {
    /// Parse settings from a TOML document
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.host.trim().is_empty() {
            return Err(SettingsError::Invalid("host must not be empty".into()));
        }
        if self.read_timeout_ms == 0 {
            return Err(SettingsError::Invalid("read_timeout_ms must be > 0".into()));
        }
        if self.reconnect_interval_ms == 0 {
            return Err(SettingsError::Invalid(
                "reconnect_interval_ms must be > 0".into(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(SettingsError::Invalid("read_buffer_size must be > 0".into()));
        }
        if let Some(hb) = &self.heartbeat {
            if hb.interval_ms == 0 {
                return Err(SettingsError::Invalid(
                    "heartbeat.interval_ms must be > 0".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

//! Time-event reports sent to the control server
//!
//! Each report is one JSON line carrying the event timestamp and the
//! device serial number, e.g. `{"takeoff_time":1718000000000,"sn":"SN123456"}`.

use crate::connection::ConnectionManager;
use crate::transport::TransportConnector;
use device_link_shared::{now_ms, LinkError};
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

/// Well-known event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeEvent {
    Takeoff,
    Landing,
}

impl TimeEvent {
    pub fn key(self) -> &'static str {
        match self {
            TimeEvent::Takeoff => "takeoff_time",
            TimeEvent::Landing => "landing_time",
        }
    }
}

impl fmt::Display for TimeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Build the JSON line for one report
pub fn time_report(kind: &str, timestamp_ms: u64, serial_number: &str) -> String {
    let mut payload = Map::new();
    payload.insert(kind.to_owned(), Value::from(timestamp_ms));
    payload.insert("sn".into(), Value::from(serial_number));
    Value::Object(payload).to_string()
}

/// Sends time reports for one device over a connection manager
pub struct TimeReporter<C: TransportConnector> {
    manager: ConnectionManager<C>,
    serial_number: String,
}

impl<C: TransportConnector> TimeReporter<C> {
    pub fn new(manager: ConnectionManager<C>, serial_number: impl Into<String>) -> Self {
        Self {
            manager,
            serial_number: serial_number.into(),
        }
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    /// Replace the serial number once the device identifies itself
    pub fn set_serial_number(&mut self, serial_number: impl Into<String>) {
        self.serial_number = serial_number.into();
    }

    /// Report that `kind` happened now
    pub fn report(&self, kind: &str) -> Result<(), LinkError> {
        let line = time_report(kind, now_ms(), &self.serial_number);
        debug!("[REPORT] {}", line);
        self.manager.send_message(&line)
    }

    pub fn report_event(&self, event: TimeEvent) -> Result<(), LinkError> {
        self.report(event.key())
    }
}

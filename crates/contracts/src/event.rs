//! Event - the unit handed to the dispatcher
//!
//! One telemetry occurrence produced upstream: an identifier, the name of the
//! originating device and its readings. Field names follow the camelCase wire
//! shape used by the collection pipeline.

use serde::{Deserialize, Serialize};

/// Telemetry event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Unique per occurrence
    pub id: String,

    /// Originating device name
    pub device: String,

    /// Origin timestamp (ms since epoch) set by the device service
    #[serde(default)]
    pub origin: i64,

    /// Upstream bookkeeping timestamps (ms since epoch, 0 = unset)
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub modified: i64,
    #[serde(default)]
    pub pushed: i64,

    /// Payload
    #[serde(default)]
    pub readings: Vec<Reading>,
}

impl Event {
    /// Create an event without readings
    pub fn new(id: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            device: device.into(),
            origin: 0,
            created: 0,
            modified: 0,
            pushed: 0,
            readings: Vec::new(),
        }
    }

    /// Builder-style reading append
    pub fn with_reading(mut self, reading: Reading) -> Self {
        self.readings.push(reading);
        self
    }
}

/// A single measured value inside an [`Event`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    #[serde(default)]
    pub id: String,

    /// Resource name ("temperature", "humidity", ...)
    pub name: String,

    /// Stringified value
    #[serde(default)]
    pub value: String,

    #[serde(default)]
    pub origin: i64,

    #[serde(default)]
    pub device: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_value: Option<Vec<u8>>,
}

impl Reading {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            value: value.into(),
            origin: 0,
            device: String::new(),
            value_type: None,
            media_type: None,
            binary_value: None,
        }
    }
}

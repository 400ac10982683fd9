//! ForwarderSettings - Config Loader output
//!
//! Describes the full process configuration: broker connection, metadata
//! service, optional event store and the dispatch tuning knobs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete forwarder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwarderSettings {
    /// Broker connection and topics
    pub mqtt: MqttSettings,

    /// Device metadata service
    pub metadata: MetadataSettings,

    /// Event store used for mark-pushed (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_data: Option<CoreDataSettings>,

    /// Dispatch tuning
    #[serde(default)]
    pub dispatch: DispatchSettings,
}

/// MQTT broker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttSettings {
    /// Broker URL, e.g. `tls://broker.example.com:8883`
    pub server: String,

    pub client_id: String,

    #[serde(default)]
    pub user_name: String,

    #[serde(default)]
    pub password: String,

    /// Client certificate (PEM); requires `key_file`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<PathBuf>,

    /// Client private key (PEM); requires `cert_file`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,

    /// CA bundle (PEM); system roots are used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,

    /// Northbound topic for events
    pub event_topic: String,

    /// Northbound topic for device announcements
    pub new_device_topic: String,

    /// Southbound topic for commands
    pub command_topic: String,

    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Largest packet sent or accepted, in bytes
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,

    /// How long a publish may wait for the broker's acknowledgement
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_reconnect_interval_ms() -> u64 {
    1000
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_max_packet_size() -> usize {
    256 * 1024
}

fn default_ack_timeout_ms() -> u64 {
    10_000
}

impl MqttSettings {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

/// Device metadata service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataSettings {
    /// Base URL, e.g. `http://localhost:48081`
    pub uri: String,

    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
}

/// Event store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreDataSettings {
    /// Base URL, e.g. `http://localhost:48080`
    pub uri: String,

    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_http_timeout_ms() -> u64 {
    5000
}

/// Dispatch tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Discovery queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Wait between failed sends
    #[serde(default = "default_send_failure_wait_ms")]
    pub send_failure_wait_ms: u64,

    /// Indent northbound JSON payloads
    #[serde(default)]
    pub pretty_json: bool,

    /// Upper bound on remembered devices (None = unbounded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_cache_capacity: Option<usize>,

    /// Where undeliverable events are appended once retries run out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dead_letter_path: Option<PathBuf>,

    #[serde(default)]
    pub retry: RetrySettings,
}

fn default_queue_capacity() -> usize {
    16
}

fn default_send_failure_wait_ms() -> u64 {
    1000
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            send_failure_wait_ms: default_send_failure_wait_ms(),
            pretty_json: false,
            device_cache_capacity: None,
            dead_letter_path: None,
            retry: RetrySettings::default(),
        }
    }
}

/// Retry shape; the defaults retry forever at a fixed interval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,

    /// None = retry until the send succeeds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_max_interval_ms() -> u64 {
    60_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            backoff_multiplier: default_backoff_multiplier(),
            max_interval_ms: default_max_interval_ms(),
            max_attempts: None,
        }
    }
}

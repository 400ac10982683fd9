//! Layered error definitions
//!
//! Categorized by source: config / lookup / upstream / transport / encode

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Metadata Errors =====
    /// Device is unknown to the metadata service
    #[error("device '{device}' not found")]
    DeviceNotFound { device: String },

    /// Metadata service call failed (transport, timeout, bad status, bad body)
    #[error("device lookup for '{device}' failed: {message}")]
    Lookup { device: String, message: String },

    // ===== Upstream Errors =====
    /// Upstream source refused the pushed mark
    #[error("mark pushed failed for event '{event_id}': {message}")]
    MarkPushed { event_id: String, message: String },

    // ===== Transport Errors =====
    /// Transport connection error
    #[error("transport error: {message}")]
    Transport { message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create device lookup error
    pub fn lookup(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Lookup {
            device: device.into(),
            message: message.into(),
        }
    }

    /// Create mark pushed error
    pub fn mark_pushed(event_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MarkPushed {
            event_id: event_id.into(),
            message: message.into(),
        }
    }

    /// Create transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Serialization failure reported by an [`Encoder`](crate::Encoder)
#[derive(Debug, Error)]
#[error("encode error ({format}): {message}")]
pub struct EncodeError {
    /// Wire format that failed ("json", ...)
    pub format: &'static str,
    pub message: String,
}

impl EncodeError {
    pub fn new(format: &'static str, message: impl Into<String>) -> Self {
        Self {
            format,
            message: message.into(),
        }
    }
}

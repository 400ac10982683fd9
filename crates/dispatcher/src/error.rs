//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
///
/// Only construction can fail; runtime failures are reported as
/// [`DeliveryOutcome`](crate::DeliveryOutcome) values.
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Rejected configuration value
    #[error("invalid dispatcher config '{field}': {message}")]
    InvalidConfig { field: String, message: String },

    /// Dead-letter file could not be opened or written
    #[error("dead letter file '{path}': {message}")]
    DeadLetter { path: String, message: String },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatcherError {
    /// Create an invalid config error
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a dead-letter error
    pub fn dead_letter(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DeadLetter {
            path: path.into(),
            message: message.into(),
        }
    }
}

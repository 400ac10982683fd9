//! Transport error types

use contracts::ContractError;
use thiserror::Error;

/// Transport specific error
///
/// Only raised while building collaborators at startup; runtime failures are
/// reported through the capability traits instead.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Endpoint URL could not be used
    #[error("invalid endpoint '{url}': {message}")]
    InvalidEndpoint { url: String, message: String },

    /// Broker connection error
    #[error("failed to connect to broker at {server}: {message}")]
    ConnectionFailed { server: String, message: String },

    /// Command topic subscription error
    #[error("failed to subscribe to '{topic}': {message}")]
    SubscribeFailed { topic: String, message: String },

    /// TLS material could not be loaded or combined
    #[error("tls configuration error: {message}")]
    Tls { message: String },

    /// HTTP client construction error
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error (reading certificate files)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped ContractError
    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl TransportError {
    /// Create invalid endpoint error
    pub fn invalid_endpoint(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create connection error
    pub fn connection(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Create TLS error
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls {
            message: message.into(),
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, TransportError>;

//! # Transport
//!
//! Concrete collaborators behind the capability traits in `contracts`.
//!
//! Responsibilities:
//! - MQTT publish/subscribe with TLS and automatic reconnect ([`MqttTransport`])
//! - Device metadata lookup over HTTP ([`HttpDeviceLookup`])
//! - Mark-pushed callback against the event store ([`CoreDataMarker`])
//! - JSON encoding ([`JsonCodec`])
//! - Southbound command logging ([`LoggingCommandHandler`])
//! - Mock collaborators with failure injection ([`mock`])

pub mod codec;
pub mod command;
pub mod core_data;
pub mod error;
pub mod metadata;
pub mod mock;
pub mod mqtt;

pub use codec::JsonCodec;
pub use command::LoggingCommandHandler;
pub use core_data::{CoreDataMarker, NoopMarker, UpstreamMarker};
pub use error::{Result, TransportError};
pub use metadata::HttpDeviceLookup;
pub use mock::{MockLookup, MockMarker, MockSender, ScriptedEncoder, SentMessage};
pub use mqtt::{BrokerEndpoint, MqttTransport};

//! Capability traits consumed by the dispatcher
//!
//! Every I/O collaborator is reached through one of these seams so it can be
//! replaced by a mock in tests.

use bytes::Bytes;
use serde::Serialize;

use crate::{ContractError, DeviceRecord, EncodeError, Event};

/// Publish capability
///
/// Implementations must tolerate concurrent use from the caller path and the
/// discovery task.
#[trait_variant::make(MessageSender: Send)]
pub trait LocalMessageSender {
    /// Sender name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Publish `payload` on `topic`
    ///
    /// Failure is reported as `false`, never as an error; there are no
    /// partial-send semantics.
    async fn send(&self, topic: &str, payload: Bytes) -> bool;

    /// Release the underlying resource (unsubscribe, disconnect)
    async fn shutdown(&self);
}

/// Device metadata resolution
#[trait_variant::make(DeviceLookup: Send)]
pub trait LocalDeviceLookup {
    /// Resolve `name` to its metadata record
    ///
    /// # Errors
    /// [`ContractError::DeviceNotFound`] or [`ContractError::Lookup`]; callers
    /// treat both the same way.
    async fn device_for_name(&self, name: &str) -> Result<DeviceRecord, ContractError>;
}

/// Signals the upstream source that an event was durably forwarded
#[trait_variant::make(PushMarker: Send)]
pub trait LocalPushMarker {
    async fn mark_pushed(&self, event: &Event) -> Result<(), ContractError>;
}

/// Serialization capability
pub trait Encoder: Send + Sync {
    /// Encode `value` to bytes
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, EncodeError>;
}

/// Receives southbound command strings
pub trait CommandHandler: Send + Sync {
    fn receive(&self, command: &str);
}

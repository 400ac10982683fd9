//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the forwarder.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Collaborators
//! - [`MessageSender`]: publish bytes to a topic, report success as `bool`
//! - [`DeviceLookup`]: resolve a device name to its [`DeviceRecord`]
//! - [`Encoder`]: serialize a value to bytes
//! - [`PushMarker`]: tell the upstream source an event left the box
//! - [`CommandHandler`]: receive southbound command strings

mod capability;
mod device;
mod error;
mod event;
mod settings;

pub use capability::*;
pub use device::*;
pub use error::*;
pub use event::*;
pub use settings::*;

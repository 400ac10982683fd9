//! New-device announcement

use std::sync::Arc;

use bytes::Bytes;
use contracts::{DeviceLookup, Encoder, Event, MessageSender};
use tracing::{error, instrument};

/// One announcement attempt for the device of an event
#[trait_variant::make(DeviceNotifier: Send)]
pub trait LocalDeviceNotifier {
    /// Returns `true` only when the announcement reached the transport
    async fn notify(&self, event: &Event) -> bool;
}

/// Looks the device up, encodes its record and publishes it
///
/// Failures at any step are logged and reported as `false`; the tracker
/// tries again on the next event from the same device.
pub struct Notifier<S, L, E> {
    sender: Arc<S>,
    lookup: Arc<L>,
    encoder: Arc<E>,
    topic: String,
}

impl<S, L, E> Notifier<S, L, E> {
    pub fn new(sender: Arc<S>, lookup: Arc<L>, encoder: Arc<E>, topic: impl Into<String>) -> Self {
        Self {
            sender,
            lookup,
            encoder,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl<S, L, E> DeviceNotifier for Notifier<S, L, E>
where
    S: MessageSender + Send + Sync,
    L: DeviceLookup + Send + Sync,
    E: Encoder,
{
    #[instrument(
        name = "notifier_notify",
        skip(self, event),
        fields(event_id = %event.id, device = %event.device)
    )]
    async fn notify(&self, event: &Event) -> bool {
        let record = match self.lookup.device_for_name(&event.device).await {
            Ok(record) => record,
            Err(e) => {
                error!(event_id = %event.id, error = %e, "Device lookup failed");
                return false;
            }
        };

        let payload = match self.encoder.encode(&record) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                error!(event_id = %event.id, error = %e, "Device record encoding failed");
                return false;
            }
        };

        self.sender.send(&self.topic, payload).await
    }
}

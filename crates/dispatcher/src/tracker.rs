//! Discovery tracker - background task announcing first-seen devices

use std::sync::Arc;

use contracts::Event;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use crate::cache::DeviceCache;
use crate::metrics::DispatchMetrics;
use crate::notifier::DeviceNotifier;

/// Drains the discovery queue and announces each device once
///
/// The cache is owned by the task. One notification is in flight at a time,
/// and a failed one is retried on the next event from that device.
pub struct DiscoveryTracker<N> {
    notifier: N,
    cache: DeviceCache,
    queue: mpsc::Receiver<Arc<Event>>,
    metrics: Arc<DispatchMetrics>,
}

impl<N> DiscoveryTracker<N>
where
    N: DeviceNotifier + Sync + 'static,
{
    pub fn new(
        notifier: N,
        cache: DeviceCache,
        queue: mpsc::Receiver<Arc<Event>>,
        metrics: Arc<DispatchMetrics>,
    ) -> Self {
        Self {
            notifier,
            cache,
            queue,
            metrics,
        }
    }

    /// Run until the queue is closed and drained
    #[instrument(name = "discovery_tracker_run", skip(self))]
    pub async fn run(mut self) {
        debug!("Discovery tracker started");

        let mut seen: u64 = 0;
        while let Some(event) = self.queue.recv().await {
            seen += 1;
            self.metrics.set_queue_len(self.queue.len());
            observability::record_queue_depth(self.queue.len());
            self.observe(&event).await;
        }

        info!(
            events = seen,
            devices = self.cache.len(),
            "Discovery queue closed, tracker exiting"
        );
    }

    /// Spawn the tracker as a background task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn observe(&mut self, event: &Event) {
        if self.cache.contains(&event.device) {
            return;
        }

        let announced = self.notifier.notify(event).await;
        observability::record_device_notification(announced);

        if announced {
            self.cache.insert(event.device.clone());
            self.metrics.inc_devices_detected();
            observability::record_known_devices(self.cache.len());
            debug!(device = %event.device, "detected new device {}", event.device);
        } else {
            self.metrics.inc_notify_failures();
        }
    }
}

//! EventSource trait

use std::sync::Arc;

use async_channel::Sender;
use contracts::Event;

use crate::metrics::IngestionMetrics;

/// A producer of events
///
/// `start` spawns the producer and returns immediately. The producer drops
/// its sender when the input is exhausted or the receiver is gone.
pub trait EventSource: Send + Sync {
    /// Source ID (used for logging/metrics)
    fn source_id(&self) -> &str;

    /// Start producing into `tx`
    fn start(&self, tx: Sender<Event>, metrics: Arc<IngestionMetrics>);

    /// Stop producing
    fn stop(&self);

    fn is_running(&self) -> bool;
}

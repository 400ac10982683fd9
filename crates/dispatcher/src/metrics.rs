//! Dispatch metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// Counters shared by the caller path and the discovery tracker
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    /// Current discovery queue length
    queue_len: AtomicUsize,
    /// Events passed to `handle`
    events_handled: AtomicU64,
    /// Events confirmed by the transport
    delivered: AtomicU64,
    /// Events dropped because they could not be encoded
    encode_failures: AtomicU64,
    /// Events abandoned after the retry budget ran out
    dead_lettered: AtomicU64,
    /// Events whose retry was interrupted by cancellation
    cancelled: AtomicU64,
    /// Event sends, including failures
    send_attempts: AtomicU64,
    /// Failed event sends
    send_failures: AtomicU64,
    /// Failed mark-pushed callbacks
    mark_pushed_failures: AtomicU64,
    /// Devices announced successfully
    devices_detected: AtomicU64,
    /// Failed announcements
    notify_failures: AtomicU64,
}

impl DispatchMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn inc_events_handled(&self) {
        self.events_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_encode_failures(&self) {
        self.encode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_send_attempts(&self) {
        self.send_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_send_failures(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_mark_pushed_failures(&self) {
        self.mark_pushed_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_devices_detected(&self) {
        self.devices_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notify_failures(&self) {
        self.notify_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            events_handled: self.events_handled.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            send_attempts: self.send_attempts.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            mark_pushed_failures: self.mark_pushed_failures.load(Ordering::Relaxed),
            devices_detected: self.devices_detected.load(Ordering::Relaxed),
            notify_failures: self.notify_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatch metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub events_handled: u64,
    pub delivered: u64,
    pub encode_failures: u64,
    pub dead_lettered: u64,
    pub cancelled: u64,
    pub send_attempts: u64,
    pub send_failures: u64,
    pub mark_pushed_failures: u64,
    pub devices_detected: u64,
    pub notify_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = DispatchMetrics::new();
        metrics.inc_events_handled();
        metrics.inc_send_attempts();
        metrics.inc_send_attempts();
        metrics.inc_send_failures();
        metrics.inc_delivered();
        metrics.set_queue_len(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.events_handled, 1);
        assert_eq!(snapshot.send_attempts, 2);
        assert_eq!(snapshot.send_failures, 1);
        assert_eq!(snapshot.delivered, 1);
        assert_eq!(snapshot.queue_len, 3);
        assert_eq!(snapshot.dead_lettered, 0);
    }
}

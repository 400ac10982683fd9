//! Dispatcher - at-least-once event delivery plus first-seen device discovery

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use contracts::{DeviceLookup, Encoder, Event, ForwarderSettings, MessageSender, PushMarker};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::DeviceCache;
use crate::dead_letter::DeadLetterFile;
use crate::error::DispatcherError;
use crate::metrics::{DispatchMetrics, MetricsSnapshot};
use crate::notifier::Notifier;
use crate::retry::RetryPolicy;
use crate::tracker::DiscoveryTracker;

/// Default discovery queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// What `handle` did with one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Sent; mark-pushed was invoked
    Delivered { attempts: u32 },
    /// Could not be encoded; nothing was sent
    EncodeFailed,
    /// Retry budget ran out; handed to the dead-letter file when configured
    DeadLettered { attempts: u32 },
    /// Retry wait interrupted by the cancellation token
    Cancelled { attempts: u32 },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Number of send attempts made
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Delivered { attempts }
            | Self::DeadLettered { attempts }
            | Self::Cancelled { attempts } => *attempts,
            Self::EncodeFailed => 0,
        }
    }

    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Delivered { .. } => observability::metrics::OUTCOME_DELIVERED,
            Self::EncodeFailed => observability::metrics::OUTCOME_ENCODE_FAILED,
            Self::DeadLettered { .. } => observability::metrics::OUTCOME_DEAD_LETTERED,
            Self::Cancelled { .. } => observability::metrics::OUTCOME_CANCELLED,
        }
    }
}

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Topic for events
    pub event_topic: String,
    /// Topic for device announcements
    pub new_device_topic: String,
    /// Discovery queue capacity
    pub queue_capacity: usize,
    pub retry: RetryPolicy,
    /// Bound on remembered devices (None = unbounded)
    pub device_cache_capacity: Option<usize>,
    /// Where abandoned events are appended
    pub dead_letter_path: Option<PathBuf>,
}

impl DispatcherConfig {
    /// Defaults for everything but the topics
    pub fn new(event_topic: impl Into<String>, new_device_topic: impl Into<String>) -> Self {
        Self {
            event_topic: event_topic.into(),
            new_device_topic: new_device_topic.into(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            retry: RetryPolicy::default(),
            device_cache_capacity: None,
            dead_letter_path: None,
        }
    }

    /// Topics from `[mqtt]`, tuning from `[dispatch]`
    pub fn from_settings(settings: &ForwarderSettings) -> Self {
        let dispatch = &settings.dispatch;
        Self {
            event_topic: settings.mqtt.event_topic.clone(),
            new_device_topic: settings.mqtt.new_device_topic.clone(),
            queue_capacity: dispatch.queue_capacity,
            retry: RetryPolicy::from_settings(dispatch),
            device_cache_capacity: dispatch.device_cache_capacity,
            dead_letter_path: dispatch.dead_letter_path.clone(),
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_device_cache_capacity(mut self, capacity: usize) -> Self {
        self.device_cache_capacity = Some(capacity);
        self
    }

    pub fn with_dead_letter_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dead_letter_path = Some(path.into());
        self
    }
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder<S, L, E> {
    config: DispatcherConfig,
    sender: Arc<S>,
    lookup: Arc<L>,
    encoder: Arc<E>,
    cancel: CancellationToken,
}

impl<S, L, E> DispatcherBuilder<S, L, E>
where
    S: MessageSender + Send + Sync + 'static,
    L: DeviceLookup + Send + Sync + 'static,
    E: Encoder + 'static,
{
    /// Create a new DispatcherBuilder
    pub fn new(config: DispatcherConfig, sender: Arc<S>, lookup: Arc<L>, encoder: Arc<E>) -> Self {
        Self {
            config,
            sender,
            lookup,
            encoder,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Build the dispatcher and start the discovery tracker
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(
        name = "dispatcher_builder_build",
        skip(self),
        fields(
            event_topic = %self.config.event_topic,
            queue_capacity = self.config.queue_capacity
        )
    )]
    pub fn build(self) -> Result<Dispatcher<S, E>, DispatcherError> {
        let config = self.config;
        if config.queue_capacity == 0 {
            return Err(DispatcherError::invalid_config(
                "queue_capacity",
                "must be greater than 0",
            ));
        }

        let dead_letter = config
            .dead_letter_path
            .as_ref()
            .map(DeadLetterFile::open)
            .transpose()?
            .map(Arc::new);

        let metrics = Arc::new(DispatchMetrics::new());
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);

        let notifier = Notifier::new(
            Arc::clone(&self.sender),
            self.lookup,
            Arc::clone(&self.encoder),
            config.new_device_topic.clone(),
        );
        let tracker = DiscoveryTracker::new(
            notifier,
            DeviceCache::new(config.device_cache_capacity),
            queue_rx,
            Arc::clone(&metrics),
        )
        .spawn();

        info!(
            sender = self.sender.name(),
            new_device_topic = %config.new_device_topic,
            max_attempts = ?config.retry.max_attempts,
            "Dispatcher started"
        );

        Ok(Dispatcher {
            sender: self.sender,
            encoder: self.encoder,
            event_topic: config.event_topic,
            queue: queue_tx,
            tracker,
            retry: config.retry,
            dead_letter,
            cancel: self.cancel,
            metrics,
        })
    }
}

/// Entry point for events
///
/// `handle` takes `&self`, so one dispatcher can serve concurrent callers.
/// `close` consumes it, so nothing can be handled after shutdown.
pub struct Dispatcher<S, E> {
    sender: Arc<S>,
    encoder: Arc<E>,
    event_topic: String,
    queue: mpsc::Sender<Arc<Event>>,
    tracker: JoinHandle<()>,
    retry: RetryPolicy,
    dead_letter: Option<Arc<DeadLetterFile>>,
    cancel: CancellationToken,
    metrics: Arc<DispatchMetrics>,
}

impl<S, E> Dispatcher<S, E>
where
    S: MessageSender + Send + Sync + 'static,
    E: Encoder + 'static,
{
    /// Token that interrupts in-flight retry waits when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn event_topic(&self) -> &str {
        &self.event_topic
    }

    /// Get current metrics
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Forward one event
    ///
    /// Queues the event for device discovery and, at the same time, sends it
    /// to the event topic until the transport accepts it. Returns once both
    /// are done. A full discovery queue suspends the call until the tracker
    /// frees a slot or the cancellation token fires.
    #[instrument(
        name = "dispatcher_handle",
        skip(self, event, marker),
        fields(event_id = %event.id, device = %event.device)
    )]
    pub async fn handle<M>(&self, event: Event, marker: &M) -> DeliveryOutcome
    where
        M: PushMarker + Sync,
    {
        let started = Instant::now();
        self.metrics.inc_events_handled();

        let event = Arc::new(event);
        let ((), outcome) = tokio::join!(
            self.enqueue(Arc::clone(&event)),
            self.deliver(&event, marker)
        );

        observability::record_event_outcome(
            outcome.label(),
            outcome.attempts(),
            started.elapsed().as_secs_f64() * 1000.0,
        );
        outcome
    }

    async fn enqueue(&self, event: Arc<Event>) {
        let device = event.device.clone();
        tokio::select! {
            biased;
            sent = self.queue.send(event) => {
                if sent.is_err() {
                    warn!("Discovery queue closed, device not tracked");
                }
            }
            _ = self.cancel.cancelled() => {
                info!(device = %device, "Shutdown requested while discovery queue full, device not tracked");
            }
        }
        let depth = self.queue.max_capacity() - self.queue.capacity();
        self.metrics.set_queue_len(depth);
        observability::record_queue_depth(depth);
    }

    async fn deliver<M>(&self, event: &Event, marker: &M) -> DeliveryOutcome
    where
        M: PushMarker + Sync,
    {
        let payload = match self.encoder.encode(event) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "Event encoding failed, not sent");
                self.metrics.inc_encode_failures();
                return DeliveryOutcome::EncodeFailed;
            }
        };

        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            self.metrics.inc_send_attempts();

            let sent = self.sender.send(&self.event_topic, payload.clone()).await;
            observability::record_send_attempt(&self.event_topic, sent);

            if sent {
                debug!(event_id = %event.id, attempts, "sent");
                self.metrics.inc_delivered();
                self.mark_pushed(event, marker).await;
                return DeliveryOutcome::Delivered { attempts };
            }

            self.metrics.inc_send_failures();

            if self.retry.is_exhausted(attempts) {
                self.abandon(event, attempts).await;
                return DeliveryOutcome::DeadLettered { attempts };
            }

            let wait = self.retry.delay_after(attempts);
            warn!(
                event_id = %event.id,
                attempts,
                wait_ms = wait.as_millis() as u64,
                "Send failed, retrying"
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(event_id = %event.id, attempts, "Retry cancelled");
                    self.metrics.inc_cancelled();
                    return DeliveryOutcome::Cancelled { attempts };
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    async fn mark_pushed<M>(&self, event: &Event, marker: &M)
    where
        M: PushMarker + Sync,
    {
        match marker.mark_pushed(event).await {
            Ok(()) => observability::record_mark_pushed(true),
            Err(e) => {
                error!(event_id = %event.id, error = %e, "Failed to mark event pushed");
                self.metrics.inc_mark_pushed_failures();
                observability::record_mark_pushed(false);
            }
        }
    }

    async fn abandon(&self, event: &Event, attempts: u32) {
        self.metrics.inc_dead_lettered();

        let Some(dead_letter) = &self.dead_letter else {
            error!(event_id = %event.id, attempts, "Retries exhausted, event dropped");
            return;
        };

        match Arc::clone(dead_letter)
            .append_async(event.clone(), attempts)
            .await
        {
            Ok(()) => warn!(
                event_id = %event.id,
                attempts,
                path = %dead_letter.path().display(),
                "Retries exhausted, event dead-lettered"
            ),
            Err(e) => error!(
                event_id = %event.id,
                attempts,
                error = %e,
                "Retries exhausted, dead-letter write failed"
            ),
        }
    }

    /// Shut down
    ///
    /// Closes the discovery queue, waits for the tracker to drain it and exit,
    /// then releases the transport. Returns the final counters.
    #[instrument(name = "dispatcher_close", skip(self))]
    pub async fn close(self) -> MetricsSnapshot {
        let Self {
            sender,
            queue,
            tracker,
            metrics,
            ..
        } = self;

        drop(queue);
        if let Err(e) = tracker.await {
            error!(error = %e, "Discovery tracker terminated abnormally");
        }

        sender.shutdown().await;

        let snapshot = metrics.snapshot();
        info!(
            events = snapshot.events_handled,
            delivered = snapshot.delivered,
            devices = snapshot.devices_detected,
            "Dispatcher closed"
        );
        snapshot
    }
}

/// Convenience function to create a dispatcher from settings
pub fn create_dispatcher<S, L, E>(
    settings: &ForwarderSettings,
    sender: Arc<S>,
    lookup: Arc<L>,
    encoder: Arc<E>,
) -> Result<Dispatcher<S, E>, DispatcherError>
where
    S: MessageSender + Send + Sync + 'static,
    L: DeviceLookup + Send + Sync + 'static,
    E: Encoder + 'static,
{
    DispatcherBuilder::new(
        DispatcherConfig::from_settings(settings),
        sender,
        lookup,
        encoder,
    )
    .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use contracts::{ContractError, DeviceRecord, Reading};
    use tokio::sync::Semaphore;
    use tokio::time::timeout;
    use transport::{JsonCodec, MockLookup, MockMarker, MockSender, ScriptedEncoder};

    const EVENTS: &str = "events";
    const DEVICES: &str = "devices";

    struct Fixture {
        sender: Arc<MockSender>,
        lookup: Arc<MockLookup>,
        marker: MockMarker,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                sender: Arc::new(MockSender::new()),
                lookup: Arc::new(MockLookup::new()),
                marker: MockMarker::new(),
            }
        }

        fn dispatcher(&self, config: DispatcherConfig) -> Dispatcher<MockSender, JsonCodec> {
            DispatcherBuilder::new(
                config,
                Arc::clone(&self.sender),
                Arc::clone(&self.lookup),
                Arc::new(JsonCodec::new()),
            )
            .build()
            .unwrap()
        }
    }

    fn config() -> DispatcherConfig {
        DispatcherConfig::new(EVENTS, DEVICES)
    }

    fn event(id: &str, device: &str) -> Event {
        Event::new(id, device).with_reading(Reading::new("temperature", "21.5"))
    }

    /// Lookup that blocks until permits are added
    struct GatedLookup {
        gate: Semaphore,
    }

    impl DeviceLookup for GatedLookup {
        async fn device_for_name(&self, name: &str) -> Result<DeviceRecord, ContractError> {
            self.gate
                .acquire()
                .await
                .map_err(|e| ContractError::lookup(name, e.to_string()))?
                .forget();
            Ok(DeviceRecord::named(name))
        }
    }

    #[tokio::test]
    async fn test_each_device_announced_once() {
        let fx = Fixture::new();
        let dispatcher = fx.dispatcher(config());

        for (id, device) in [("e1", "A"), ("e2", "A"), ("e3", "B")] {
            let outcome = dispatcher.handle(event(id, device), &fx.marker).await;
            assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 1 });
        }
        let snapshot = dispatcher.close().await;

        assert_eq!(fx.lookup.calls(), vec!["A", "B"]);
        assert_eq!(fx.sender.sent_to(DEVICES).len(), 2);
        assert_eq!(fx.sender.sent_to(EVENTS).len(), 3);
        assert_eq!(fx.marker.marked(), vec!["e1", "e2", "e3"]);
        assert_eq!(snapshot.devices_detected, 2);
        assert_eq!(snapshot.delivered, 3);
    }

    #[tokio::test]
    async fn test_event_payload_is_encoded_event() {
        let fx = Fixture::new();
        let dispatcher = fx.dispatcher(config());

        let original = event("e1", "thermo-1");
        dispatcher.handle(original.clone(), &fx.marker).await;
        dispatcher.close().await;

        let sent = fx.sender.sent_to(EVENTS);
        let decoded: Event = serde_json::from_slice(&sent[0]).unwrap();
        assert_eq!(decoded, original);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_retried_until_success() {
        let fx = Fixture::new();
        fx.sender.fail_next(EVENTS, 2);
        let dispatcher = fx.dispatcher(config());

        let started = tokio::time::Instant::now();
        let outcome = dispatcher.handle(event("e1", "A"), &fx.marker).await;
        let elapsed = started.elapsed();

        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 3 });
        assert!(elapsed >= Duration::from_secs(2), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(3), "{elapsed:?}");
        assert_eq!(fx.sender.attempts(EVENTS), 3);
        assert_eq!(fx.marker.marked(), vec!["e1"]);

        let snapshot = dispatcher.close().await;
        assert_eq!(snapshot.send_attempts, 3);
        assert_eq!(snapshot.send_failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_to_cap() {
        let fx = Fixture::new();
        fx.sender.fail_next(EVENTS, 4);
        let retry = RetryPolicy::fixed(Duration::from_secs(1))
            .with_backoff(2.0, Duration::from_secs(3));
        let dispatcher = fx.dispatcher(config().with_retry(retry));

        let started = tokio::time::Instant::now();
        let outcome = dispatcher.handle(event("e1", "A"), &fx.marker).await;

        // waits of 1s, 2s, 3s, 3s
        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 5 });
        assert!(started.elapsed() >= Duration::from_secs(9));
        assert!(started.elapsed() < Duration::from_secs(10));
        dispatcher.close().await;
    }

    #[tokio::test]
    async fn test_encode_failure_skips_send_and_mark() {
        let fx = Fixture::new();
        let dispatcher = DispatcherBuilder::new(
            config(),
            Arc::clone(&fx.sender),
            Arc::clone(&fx.lookup),
            Arc::new(ScriptedEncoder::always_failing()),
        )
        .build()
        .unwrap();

        let outcome = dispatcher.handle(event("e1", "A"), &fx.marker).await;
        let snapshot = dispatcher.close().await;

        assert_eq!(outcome, DeliveryOutcome::EncodeFailed);
        assert_eq!(fx.sender.attempts(EVENTS), 0);
        assert!(fx.marker.marked().is_empty());
        assert_eq!(snapshot.encode_failures, 1);
        // discovery still saw the event
        assert_eq!(fx.lookup.call_count("A"), 1);
    }

    #[tokio::test]
    async fn test_mark_pushed_failure_keeps_delivery() {
        let fx = Fixture::new();
        let marker = MockMarker::failing();
        let dispatcher = fx.dispatcher(config());

        let outcome = dispatcher.handle(event("e1", "A"), &marker).await;
        let snapshot = dispatcher.close().await;

        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 1 });
        assert_eq!(marker.marked(), vec!["e1"]);
        assert_eq!(snapshot.mark_pushed_failures, 1);
    }

    #[tokio::test]
    async fn test_failed_announcement_retried_on_next_event() {
        let fx = Fixture::new();
        fx.lookup.fail_next("A", 1);
        let dispatcher = fx.dispatcher(config());

        for id in ["e1", "e2", "e3"] {
            dispatcher.handle(event(id, "A"), &fx.marker).await;
        }
        let snapshot = dispatcher.close().await;

        assert_eq!(fx.lookup.call_count("A"), 2);
        assert_eq!(fx.sender.sent_to(DEVICES).len(), 1);
        assert_eq!(snapshot.notify_failures, 1);
        assert_eq!(snapshot.devices_detected, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_dead_letter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dead.jsonl");

        let fx = Fixture::new();
        fx.sender.set_always_fail(true);
        let dispatcher = fx.dispatcher(
            config()
                .with_retry(RetryPolicy::default().with_max_attempts(3))
                .with_dead_letter_path(&path),
        );

        let outcome = dispatcher.handle(event("e1", "A"), &fx.marker).await;
        let snapshot = dispatcher.close().await;

        assert_eq!(outcome, DeliveryOutcome::DeadLettered { attempts: 3 });
        assert!(fx.marker.marked().is_empty());
        assert_eq!(snapshot.dead_lettered, 1);

        let content = std::fs::read_to_string(&path).unwrap();
        let record: serde_json::Value =
            serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(record["eventId"], "e1");
        assert_eq!(record["attempts"], 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_retry() {
        let fx = Fixture::new();
        fx.sender.set_always_fail(true);
        let dispatcher = fx.dispatcher(config());
        let token = dispatcher.cancellation_token();

        let (outcome, ()) = tokio::join!(
            dispatcher.handle(event("e1", "A"), &fx.marker),
            async {
                tokio::time::sleep(Duration::from_millis(2500)).await;
                token.cancel();
            }
        );

        // attempts at 0s, 1s and 2s; cancelled during the third wait
        assert_eq!(outcome, DeliveryOutcome::Cancelled { attempts: 3 });
        assert!(fx.marker.marked().is_empty());

        let snapshot = dispatcher.close().await;
        assert_eq!(snapshot.cancelled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_suspends_handle() {
        let sender = Arc::new(MockSender::new());
        let lookup = Arc::new(GatedLookup {
            gate: Semaphore::new(0),
        });
        let marker = MockMarker::new();
        let dispatcher = DispatcherBuilder::new(
            config(),
            Arc::clone(&sender),
            Arc::clone(&lookup),
            Arc::new(JsonCodec::new()),
        )
        .build()
        .unwrap();

        // the stalled tracker holds one event, the queue holds the next 16
        let mut completed = 0;
        for i in 0..40 {
            let handled = timeout(
                Duration::from_millis(100),
                dispatcher.handle(event(&format!("e{i}"), &format!("device-{i}")), &marker),
            )
            .await;
            if handled.is_err() {
                break;
            }
            completed += 1;
        }
        assert_eq!(completed, DEFAULT_QUEUE_CAPACITY + 1);
        assert_eq!(dispatcher.metrics().queue_len, DEFAULT_QUEUE_CAPACITY);

        lookup.gate.add_permits(1000);
        let handled = timeout(
            Duration::from_secs(1),
            dispatcher.handle(event("late", "device-late"), &marker),
        )
        .await;
        assert!(handled.is_ok());

        dispatcher.close().await;
        assert_eq!(sender.shutdown_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_releases_full_queue() {
        let sender = Arc::new(MockSender::new());
        let lookup = Arc::new(GatedLookup {
            gate: Semaphore::new(0),
        });
        let marker = MockMarker::new();
        let dispatcher = DispatcherBuilder::new(
            config(),
            Arc::clone(&sender),
            Arc::clone(&lookup),
            Arc::new(JsonCodec::new()),
        )
        .build()
        .unwrap();
        let token = dispatcher.cancellation_token();

        for i in 0..=DEFAULT_QUEUE_CAPACITY {
            dispatcher
                .handle(event(&format!("e{i}"), &format!("device-{i}")), &marker)
                .await;
        }

        let (handled, ()) = tokio::join!(
            timeout(
                Duration::from_secs(5),
                dispatcher.handle(event("blocked", "device-blocked"), &marker),
            ),
            async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                token.cancel();
            }
        );

        // the send half already succeeded, only the enqueue was waiting
        assert_eq!(handled.unwrap(), DeliveryOutcome::Delivered { attempts: 1 });
        assert_eq!(dispatcher.metrics().queue_len, DEFAULT_QUEUE_CAPACITY);

        lookup.gate.add_permits(1000);
        dispatcher.close().await;
        assert_eq!(sender.shutdown_count(), 1);
    }

    #[tokio::test]
    async fn test_bounded_cache_reannounces() {
        let fx = Fixture::new();
        let dispatcher = fx.dispatcher(config().with_device_cache_capacity(1));

        for (id, device) in [("e1", "A"), ("e2", "B"), ("e3", "A")] {
            dispatcher.handle(event(id, device), &fx.marker).await;
        }
        dispatcher.close().await;

        assert_eq!(fx.lookup.calls(), vec!["A", "B", "A"]);
    }

    #[tokio::test]
    async fn test_close_drains_and_shuts_down_sender() {
        let fx = Fixture::new();
        let dispatcher = fx.dispatcher(config());

        for i in 0..10 {
            dispatcher
                .handle(event(&format!("e{i}"), &format!("device-{i}")), &fx.marker)
                .await;
        }
        let snapshot = dispatcher.close().await;

        assert_eq!(fx.lookup.calls().len(), 10);
        assert_eq!(snapshot.devices_detected, 10);
        assert_eq!(fx.sender.shutdown_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers() {
        let fx = Fixture::new();
        let dispatcher = Arc::new(fx.dispatcher(config()));
        let marker = Arc::new(MockMarker::new());

        let mut tasks = Vec::new();
        for i in 0..8 {
            let dispatcher = Arc::clone(&dispatcher);
            let marker = Arc::clone(&marker);
            tasks.push(tokio::spawn(async move {
                dispatcher
                    .handle(event(&format!("e{i}"), "shared"), marker.as_ref())
                    .await
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap().is_delivered());
        }

        let dispatcher = Arc::into_inner(dispatcher).unwrap();
        dispatcher.close().await;

        assert_eq!(fx.sender.sent_to(EVENTS).len(), 8);
        assert_eq!(fx.lookup.call_count("shared"), 1);
        assert_eq!(marker.marked().len(), 8);
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        let fx = Fixture::new();
        let result = DispatcherBuilder::new(
            config().with_queue_capacity(0),
            Arc::clone(&fx.sender),
            Arc::clone(&fx.lookup),
            Arc::new(JsonCodec::new()),
        )
        .build();
        assert!(matches!(
            result,
            Err(DispatcherError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_outcome_accessors() {
        assert_eq!(DeliveryOutcome::Delivered { attempts: 2 }.attempts(), 2);
        assert_eq!(DeliveryOutcome::EncodeFailed.attempts(), 0);
        assert_eq!(
            DeliveryOutcome::DeadLettered { attempts: 5 }.label(),
            "dead_lettered"
        );
        assert!(!DeliveryOutcome::Cancelled { attempts: 1 }.is_delivered());
    }
}

//! Pipeline orchestrator - coordinates all components.
//!
//! Wires the event input, the dispatcher and the broker/HTTP collaborators
//! together and drives events through until the input ends, a limit is hit
//! or shutdown is requested.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{DeviceLookup, Encoder, ForwarderSettings, MessageSender, PushMarker};
use dispatcher::{DispatcherBuilder, DispatcherConfig};
use ingestion::{EventSource, IngestionPipeline, JsonLinesSource, MockEventSource, MockSourceConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use transport::{HttpDeviceLookup, JsonCodec, LoggingCommandHandler, MqttTransport, UpstreamMarker};

use super::PipelineStats;

/// Where events come from
#[derive(Debug, Clone, PartialEq)]
pub enum InputSource {
    /// JSON lines on standard input
    Stdin,

    /// JSON lines from a file
    File(PathBuf),

    /// Generated events for the given devices
    Mock { devices: Vec<String>, rate_hz: f64 },
}

impl InputSource {
    pub fn label(&self) -> String {
        match self {
            Self::Stdin => "stdin".to_string(),
            Self::File(path) => path.display().to_string(),
            Self::Mock { .. } => "mock".to_string(),
        }
    }

    fn into_source(self, limit: Option<u64>) -> Result<Box<dyn EventSource>> {
        Ok(match self {
            Self::Stdin => Box::new(JsonLinesSource::stdin()),
            Self::File(path) => Box::new(
                JsonLinesSource::open(&path)
                    .with_context(|| format!("Failed to open input {}", path.display()))?,
            ),
            Self::Mock { devices, rate_hz } => Box::new(MockEventSource::new(MockSourceConfig {
                devices,
                frequency_hz: rate_hz,
                limit,
                ..Default::default()
            })),
        })
    }
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Validated forwarder settings
    pub settings: ForwarderSettings,

    /// Event input
    pub input: InputSource,

    /// Maximum number of events to forward (None = unlimited)
    pub max_events: Option<u64>,

    /// Pipeline timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Ingestion channel buffer size
    pub buffer_size: usize,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Connect to the broker and services, then forward until done
    pub async fn run(self, shutdown: CancellationToken) -> Result<PipelineStats> {
        let settings = &self.config.settings;

        // Initialize Metrics (optional)
        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let lookup = HttpDeviceLookup::new(&settings.metadata)
            .context("Failed to set up metadata client")?;
        let marker = UpstreamMarker::from_settings(settings.core_data.as_ref())
            .context("Failed to set up core data client")?;
        if matches!(marker, UpstreamMarker::Noop(_)) {
            info!("No core data configured, events will not be marked pushed");
        }

        let encoder = if settings.dispatch.pretty_json {
            JsonCodec::pretty()
        } else {
            JsonCodec::new()
        };

        // connect last; forward shuts the transport down if its own setup fails
        info!(server = %settings.mqtt.server, "Connecting to broker...");
        let sender = MqttTransport::connect(&settings.mqtt, LoggingCommandHandler::new())
            .await
            .with_context(|| format!("Failed to connect to broker at {}", settings.mqtt.server))?;

        self.forward(
            Arc::new(sender),
            Arc::new(lookup),
            Arc::new(encoder),
            marker,
            shutdown,
        )
        .await
    }

    /// Forward events from the configured input through the given collaborators
    ///
    /// The sender is shut down on every exit path, including setup failures.
    pub async fn forward<S, L, E, M>(
        self,
        sender: Arc<S>,
        lookup: Arc<L>,
        encoder: Arc<E>,
        marker: M,
        shutdown: CancellationToken,
    ) -> Result<PipelineStats>
    where
        S: MessageSender + Send + Sync + 'static,
        L: DeviceLookup + Send + Sync + 'static,
        E: Encoder + 'static,
        M: PushMarker + Sync,
    {
        let start_time = Instant::now();
        let PipelineConfig {
            settings,
            input,
            max_events,
            timeout,
            buffer_size,
            ..
        } = self.config;

        let source_label = input.label();
        let source = match input.into_source(max_events) {
            Ok(source) => source,
            Err(e) => {
                sender.shutdown().await;
                return Err(e);
            }
        };

        // Setup Dispatcher
        info!("Setting up dispatcher...");
        let built = DispatcherBuilder::new(
            DispatcherConfig::from_settings(&settings),
            Arc::clone(&sender),
            lookup,
            encoder,
        )
        .cancellation_token(shutdown.clone())
        .build();
        let dispatcher = match built {
            Ok(dispatcher) => dispatcher,
            Err(e) => {
                sender.shutdown().await;
                return Err(e).context("Failed to create dispatcher");
            }
        };
        drop(sender);

        info!(
            event_topic = %dispatcher.event_topic(),
            new_device_topic = %settings.mqtt.new_device_topic,
            "Dispatcher started"
        );

        // Setup Ingestion Pipeline
        info!(source = %source_label, "Setting up ingestion pipeline...");
        let mut ingestion = IngestionPipeline::new(buffer_size);
        ingestion.register_source(source);
        let Some(ingestion_rx) = ingestion.take_receiver() else {
            dispatcher.close().await;
            anyhow::bail!("Failed to get ingestion receiver");
        };
        ingestion.start_all();

        info!(max_events = ?max_events, "Pipeline running");

        let mut stats = PipelineStats {
            source: source_label.clone(),
            ..Default::default()
        };
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, stopping intake");
                    break;
                }
                _ = sleep_until(deadline) => {
                    warn!(timeout_secs = timeout.map(|t| t.as_secs()), "Pipeline timed out");
                    stats.timed_out = true;
                    break;
                }
                received = ingestion_rx.recv() => match received {
                    Ok(event) => event,
                    Err(_) => {
                        info!("Input exhausted");
                        break;
                    }
                },
            };

            stats.events_received += 1;
            observability::record_event_received(&source_label);

            let device = event.device.clone();
            let started = Instant::now();
            let outcome = dispatcher.handle(event, &marker).await;
            stats.delivery.update(
                &device,
                outcome.label(),
                outcome.attempts(),
                started.elapsed().as_secs_f64() * 1000.0,
            );
            debug!(device = %device, outcome = outcome.label(), "Event handled");

            // Check max events limit
            if let Some(max) = max_events {
                if stats.events_received >= max {
                    info!(events = stats.events_received, "Reached max events limit");
                    break;
                }
            }
        }

        // Shutdown
        info!("Shutting down pipeline...");
        ingestion.stop_all();
        stats.ingestion = ingestion.metrics().snapshot();
        stats.dispatch = dispatcher.close().await;
        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            events_per_sec = format!("{:.2}", stats.events_per_sec()),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}

/// Sleep until `deadline`, or forever without one
async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{DispatchSettings, MetadataSettings, MqttSettings};
    use std::io::Write;
    use transport::{MockLookup, MockMarker, MockSender};

    fn settings() -> ForwarderSettings {
        ForwarderSettings {
            mqtt: MqttSettings {
                server: "tcp://localhost:1883".to_string(),
                client_id: "gw-test".to_string(),
                user_name: String::new(),
                password: String::new(),
                cert_file: None,
                key_file: None,
                ca_file: None,
                event_topic: "events".to_string(),
                new_device_topic: "devices".to_string(),
                command_topic: "commands".to_string(),
                keep_alive_secs: 30,
                reconnect_interval_ms: 1000,
                connect_timeout_secs: 10,
                max_packet_size: 256 * 1024,
                ack_timeout_ms: 10_000,
            },
            metadata: MetadataSettings {
                uri: "http://localhost:48081".to_string(),
                timeout_ms: 5000,
            },
            core_data: None,
            dispatch: DispatchSettings::default(),
        }
    }

    fn config(input: InputSource, max_events: Option<u64>) -> PipelineConfig {
        PipelineConfig {
            settings: settings(),
            input,
            max_events,
            timeout: None,
            buffer_size: 8,
            metrics_port: None,
        }
    }

    #[tokio::test]
    async fn test_forward_file_input() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id":"e-1","device":"thermo-1"}}"#).unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(file, r#"{{"id":"e-2","device":"thermo-1"}}"#).unwrap();
        writeln!(file, r#"{{"id":"e-3","device":"thermo-2"}}"#).unwrap();
        file.flush().unwrap();

        let sender = Arc::new(MockSender::new());
        let lookup = Arc::new(MockLookup::new());
        let stats = Pipeline::new(config(InputSource::File(file.path().to_path_buf()), None))
            .forward(
                Arc::clone(&sender),
                Arc::clone(&lookup),
                Arc::new(JsonCodec::new()),
                MockMarker::new(),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(stats.events_received, 3);
        assert_eq!(stats.ingestion.parse_errors, 1);
        assert_eq!(stats.dispatch.delivered, 3);
        assert_eq!(stats.dispatch.devices_detected, 2);
        assert_eq!(sender.sent_to("events").len(), 3);
        assert_eq!(sender.sent_to("devices").len(), 2);
        assert_eq!(sender.shutdown_count(), 1);
        assert_eq!(stats.delivery.summary().delivered, 3);
    }

    #[tokio::test]
    async fn test_forward_mock_input_with_limit() {
        let input = InputSource::Mock {
            devices: vec!["a".to_string(), "b".to_string()],
            rate_hz: 1000.0,
        };
        let sender = Arc::new(MockSender::new());
        let stats = Pipeline::new(config(input, Some(5)))
            .forward(
                Arc::clone(&sender),
                Arc::new(MockLookup::new()),
                Arc::new(JsonCodec::new()),
                MockMarker::new(),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(stats.events_received, 5);
        assert_eq!(stats.dispatch.devices_detected, 2);
        assert_eq!(stats.source, "mock");
    }

    #[tokio::test]
    async fn test_forward_stops_on_shutdown() {
        let input = InputSource::Mock {
            devices: vec!["a".to_string()],
            rate_hz: 100.0,
        };
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let sender = Arc::new(MockSender::new());
        let stats = Pipeline::new(config(input, None))
            .forward(
                Arc::clone(&sender),
                Arc::new(MockLookup::new()),
                Arc::new(JsonCodec::new()),
                MockMarker::new(),
                shutdown,
            )
            .await
            .unwrap();

        assert_eq!(stats.events_received, 0);
        assert_eq!(sender.shutdown_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_input_file() {
        let input = InputSource::File(PathBuf::from("/nonexistent/events.jsonl"));
        let sender = Arc::new(MockSender::new());
        let result = Pipeline::new(config(input, None))
            .forward(
                Arc::clone(&sender),
                Arc::new(MockLookup::new()),
                Arc::new(JsonCodec::new()),
                MockMarker::new(),
                CancellationToken::new(),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(sender.shutdown_count(), 1);
    }

    #[tokio::test]
    async fn test_dispatcher_setup_failure_shuts_sender_down() {
        let mut config = config(InputSource::Stdin, None);
        config.settings.dispatch.queue_capacity = 0;
        let sender = Arc::new(MockSender::new());

        let result = Pipeline::new(config)
            .forward(
                Arc::clone(&sender),
                Arc::new(MockLookup::new()),
                Arc::new(JsonCodec::new()),
                MockMarker::new(),
                CancellationToken::new(),
            )
            .await;

        assert!(result.unwrap_err().to_string().contains("dispatcher"));
        assert_eq!(sender.shutdown_count(), 1);
        assert!(sender.sent().is_empty());
    }

    #[test]
    fn test_input_labels() {
        assert_eq!(InputSource::Stdin.label(), "stdin");
        assert_eq!(
            InputSource::File(PathBuf::from("in.jsonl")).label(),
            "in.jsonl"
        );
    }
}

//! Ingestion Pipeline main entry

use std::collections::HashMap;
use std::sync::Arc;

use async_channel::{bounded, Receiver, Sender};
use contracts::Event;
use tracing::{debug, info, instrument, warn};

use crate::metrics::IngestionMetrics;
use crate::source::EventSource;

/// Ingestion Pipeline
///
/// Merges registered sources into one bounded stream. The stream ends once
/// every started source has finished.
pub struct IngestionPipeline {
    /// Registered sources
    sources: HashMap<String, Box<dyn EventSource>>,

    /// Shared metrics
    metrics: Arc<IngestionMetrics>,

    /// Data sender, handed out to the sources on start
    tx: Option<Sender<Event>>,

    /// Data receiver
    rx: Option<Receiver<Event>>,
}

impl IngestionPipeline {
    /// Create new Ingestion Pipeline
    ///
    /// # Arguments
    /// * `channel_capacity` - Channel capacity
    pub fn new(channel_capacity: usize) -> Self {
        let (tx, rx) = bounded(channel_capacity.max(1));

        Self {
            sources: HashMap::new(),
            metrics: Arc::new(IngestionMetrics::new()),
            tx: Some(tx),
            rx: Some(rx),
        }
    }

    /// Register an event source
    #[instrument(
        name = "ingestion_register_source",
        skip(self, source),
        fields(source_id = %source.source_id())
    )]
    pub fn register_source(&mut self, source: Box<dyn EventSource>) {
        if self.tx.is_none() {
            warn!("pipeline already started, source ignored");
            return;
        }
        let source_id = source.source_id().to_string();
        debug!(source_id = %source_id, "registered event source");
        self.sources.insert(source_id, source);
    }

    /// Start all registered sources
    ///
    /// The pipeline gives up its own sender here, so the receiver closes when
    /// the last source finishes.
    #[instrument(name = "ingestion_start_all", skip(self))]
    pub fn start_all(&mut self) {
        let Some(tx) = self.tx.take() else {
            warn!("pipeline already started");
            return;
        };

        info!(count = self.sources.len(), "starting all event sources");
        for (source_id, source) in &self.sources {
            debug!(source_id = %source_id, "starting source");
            source.start(tx.clone(), self.metrics.clone());
        }
    }

    /// Stop all sources
    #[instrument(name = "ingestion_stop_all", skip(self))]
    pub fn stop_all(&self) {
        for (source_id, source) in &self.sources {
            if source.is_running() {
                debug!(source_id = %source_id, "stopping source");
                source.stop();
            }
        }
    }

    /// Get data stream receiver
    ///
    /// Note: Can only be called once, subsequent calls return None
    pub fn take_receiver(&mut self) -> Option<Receiver<Event>> {
        self.rx.take()
    }

    /// Get metrics reference
    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    /// Get registered source count
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Check if specified source is running
    pub fn is_source_running(&self, source_id: &str) -> bool {
        self.sources
            .get(source_id)
            .map(|s| s.is_running())
            .unwrap_or(false)
    }
}

impl Drop for IngestionPipeline {
    fn drop(&mut self) {
        self.stop_all();
    }
}

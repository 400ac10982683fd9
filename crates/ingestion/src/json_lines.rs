//! JSON-lines event source
//!
//! One JSON-encoded event per line, from a file or stdin. Blank lines are
//! skipped; malformed lines are logged, counted and skipped.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_channel::Sender;
use contracts::Event;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::error::{IngestionError, Result};
use crate::metrics::IngestionMetrics;
use crate::source::EventSource;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Reads events from a line-oriented JSON stream
pub struct JsonLinesSource {
    source_id: String,
    reader: Mutex<Option<BoxedReader>>,
    running: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl JsonLinesSource {
    /// Wrap any async reader
    pub fn from_reader(
        source_id: impl Into<String>,
        reader: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            reader: Mutex::new(Some(Box::new(reader))),
            running: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    /// Open a file; fails immediately when it cannot be read
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| IngestionError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::from_reader(
            path.display().to_string(),
            tokio::fs::File::from_std(file),
        ))
    }

    /// Read from standard input
    pub fn stdin() -> Self {
        Self::from_reader("stdin", tokio::io::stdin())
    }
}

impl EventSource for JsonLinesSource {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    #[instrument(name = "json_lines_start", skip(self, tx, metrics), fields(source_id = %self.source_id))]
    fn start(&self, tx: Sender<Event>, metrics: Arc<IngestionMetrics>) {
        let reader = self.reader.lock().ok().and_then(|mut reader| reader.take());
        let Some(reader) = reader else {
            let err = IngestionError::AlreadyStarted {
                source_id: self.source_id.clone(),
            };
            warn!(error = %err, "Start ignored");
            return;
        };

        let source_id = self.source_id.clone();
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);

        let handle = tokio::spawn(async move {
            match pump(&source_id, reader, &tx, &metrics, &running).await {
                Ok(events) => debug!(source_id = %source_id, events, "Input exhausted"),
                Err(e) => error!(error = %e, "Source stopped"),
            }
            running.store(false, Ordering::SeqCst);
        });

        if let Ok(mut task) = self.task.lock() {
            *task = Some(handle);
        }
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        // a pending stdin read never observes the flag
        if let Some(handle) = self.task.lock().ok().and_then(|mut task| task.take()) {
            handle.abort();
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

async fn pump(
    source_id: &str,
    reader: BoxedReader,
    tx: &Sender<Event>,
    metrics: &IngestionMetrics,
    running: &AtomicBool,
) -> Result<u64> {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    let mut line_no: u64 = 0;
    let mut emitted: u64 = 0;

    while running.load(Ordering::Relaxed) {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .await
            .map_err(|source| IngestionError::Read {
                source_id: source_id.to_string(),
                source,
            })?;
        if read == 0 {
            break;
        }

        line_no += 1;
        metrics.record_line();

        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            continue;
        }

        // invalid UTF-8 fails here like any other malformed line
        let event = match serde_json::from_slice::<Event>(trimmed) {
            Ok(event) => event,
            Err(e) => {
                warn!(source_id, line = line_no, error = %e, "Malformed event line skipped");
                metrics.record_parse_error();
                observability::record_event_malformed(source_id);
                continue;
            }
        };

        if tx.send(event).await.is_err() {
            debug!(source_id, "Event channel closed");
            break;
        }
        emitted += 1;
        metrics.record_emitted();
        metrics.update_queue_len(tx.len());
    }

    Ok(emitted)
}

//! # Ingestion Pipeline
//!
//! Event ingestion module.
//!
//! Responsibilities:
//! - Register event sources (JSON lines from a file or stdin, or mock)
//! - Parse input into `Event`s, skipping and counting malformed lines
//! - Send to downstream via a bounded async-channel
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{IngestionPipeline, JsonLinesSource};
//!
//! let mut pipeline = IngestionPipeline::new(64);
//! pipeline.register_source(Box::new(JsonLinesSource::open("events.jsonl")?));
//!
//! let rx = pipeline.take_receiver().unwrap();
//! pipeline.start_all();
//! while let Ok(event) = rx.recv().await {
//!     // Forward event
//! }
//! ```

mod error;
mod json_lines;
mod metrics;
mod mock;
mod pipeline;
mod source;

// Re-exports
pub use contracts::Event;
pub use error::{IngestionError, Result};
pub use json_lines::JsonLinesSource;
pub use metrics::{IngestionMetrics, MetricsSnapshot};
pub use mock::{MockEventSource, MockSourceConfig};
pub use pipeline::IngestionPipeline;
pub use source::EventSource;

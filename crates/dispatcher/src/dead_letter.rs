//! DeadLetterFile - appends undeliverable events to a JSON-lines file

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use contracts::Event;
use serde::Serialize;
use tracing::debug;

use crate::error::DispatcherError;

/// One line of the dead-letter file
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeadLetterRecord<'a> {
    event_id: &'a str,
    device: &'a str,
    attempts: u32,
    dead_lettered_at: String,
    event: &'a Event,
}

/// Append-only sink for events whose retry budget ran out
#[derive(Debug)]
pub struct DeadLetterFile {
    path: PathBuf,
    file: Mutex<File>,
}

impl DeadLetterFile {
    /// Open (creating parent directories) in append mode
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DispatcherError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| DispatcherError::dead_letter(path.display().to_string(), e.to_string()))?;

        debug!(path = %path.display(), "Dead-letter file opened");
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush it
    pub fn append(&self, event: &Event, attempts: u32) -> Result<(), DispatcherError> {
        let record = DeadLetterRecord {
            event_id: &event.id,
            device: &event.device,
            attempts,
            dead_lettered_at: Utc::now().to_rfc3339(),
            event,
        };

        let mut line = serde_json::to_vec(&record).map_err(|e| self.error(e))?;
        line.push(b'\n');

        let mut file = self
            .file
            .lock()
            .map_err(|_| self.error("file lock poisoned"))?;
        file.write_all(&line).map_err(|e| self.error(e))?;
        file.flush().map_err(|e| self.error(e))?;
        Ok(())
    }

    /// [`append`](Self::append) on the blocking pool, off the async workers
    pub async fn append_async(
        self: Arc<Self>,
        event: Event,
        attempts: u32,
    ) -> Result<(), DispatcherError> {
        let path = self.path.display().to_string();
        tokio::task::spawn_blocking(move || self.append(&event, attempts))
            .await
            .map_err(|e| DispatcherError::dead_letter(path, e.to_string()))?
    }

    fn error(&self, message: impl ToString) -> DispatcherError {
        DispatcherError::dead_letter(self.path.display().to_string(), message.to_string())
    }
}

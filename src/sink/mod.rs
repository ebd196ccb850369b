//! Raw HTML hand-off to the storage writer
//!
//! HTML workers accumulate fetched pages into batches and hand them to an
//! [`HtmlSink`]. The enriched-format writer of the full system lives behind
//! this trait; the crate ships a newline-JSON file sink for standalone use
//! and a counting sink for tests. Batches are the crash-safety granularity:
//! a sink call either persists the whole batch or none of it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use thiserror::Error;

/// Errors from the storage writer
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// One fetched page plus its metadata snapshot
#[derive(Debug, Clone, Serialize)]
pub struct HtmlBatchEntry {
    pub url: String,
    pub html: String,
    pub content_hash: String,
    pub fetched_at: DateTime<Utc>,
}

/// Collaborator interface for the raw HTML writer
pub trait HtmlSink: Send + Sync {
    /// Persists one batch; must be idempotent at batch granularity
    fn save_html_batch(&self, batch: &[HtmlBatchEntry]) -> SinkResult<()>;
}

/// Appends batches as newline-delimited JSON to a single file
pub struct JsonlSink {
    file: Mutex<std::fs::File>,
}

impl JsonlSink {
    /// Opens (or creates) the output file in append mode
    pub fn open(path: &Path) -> SinkResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl HtmlSink for JsonlSink {
    fn save_html_batch(&self, batch: &[HtmlBatchEntry]) -> SinkResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        // Serialize the whole batch before taking the lock so a bad entry
        // cannot leave a half-written batch behind.
        let mut buffer = Vec::new();
        for entry in batch {
            serde_json::to_writer(&mut buffer, entry)?;
            buffer.push(b'\n');
        }

        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.write_all(&buffer)?;
        file.flush()?;
        Ok(())
    }
}

/// Test sink that counts batches and pages
#[derive(Default)]
pub struct CountingSink {
    pub batches: AtomicU64,
    pub pages: AtomicU64,
}

impl CountingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch_count(&self) -> u64 {
        self.batches.load(Ordering::SeqCst)
    }

    pub fn page_count(&self) -> u64 {
        self.pages.load(Ordering::SeqCst)
    }
}

impl HtmlSink for CountingSink {
    fn save_html_batch(&self, batch: &[HtmlBatchEntry]) -> SinkResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.pages.fetch_add(batch.len() as u64, Ordering::SeqCst);
        Ok(())
    }
}

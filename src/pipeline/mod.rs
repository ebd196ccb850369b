//! HTML processing stage
//!
//! Fetch workers hand accepted 200 bodies to the bounded [`HtmlQueue`];
//! HTML workers pull tasks, parse the DOM once, filter by language, batch
//! the raw bytes toward the storage writer, and feed extracted links back
//! into the frontier.

mod hash;
mod language;
mod quality;
mod worker;

pub use hash::{content_hash, hash_text, relevant_text};
pub use language::is_probably_english;
pub use quality::{check_quality, QualityVerdict, MIN_BODY_BYTES};
pub use worker::{run_html_worker, HtmlProcessor};

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio::sync::Mutex;

/// One page ready for HTML processing
///
/// Owned by whichever worker holds it; consumed exactly once.
#[derive(Debug)]
pub struct HtmlTask {
    pub url: String,
    pub domain: String,
    pub depth: u32,
    pub html: String,
    pub content_hash: String,
    pub fetched_at: DateTime<Utc>,
}

/// Bounded multi-producer queue between fetchers and HTML workers
///
/// Producers use the non-blocking [`try_enqueue`]; a full queue hands the
/// task back so the fetcher can fall back to synchronous processing
/// (REGULAR) or drop it (FRESH). Consumers block on [`recv`]; closing the
/// queue wakes them for shutdown once the backlog drains.
///
/// [`try_enqueue`]: HtmlQueue::try_enqueue
/// [`recv`]: HtmlQueue::recv
pub struct HtmlQueue {
    /// Dropped on close so blocked consumers see the channel end.
    /// std mutex: only ever held for a non-blocking try_send.
    tx: std::sync::Mutex<Option<mpsc::Sender<HtmlTask>>>,
    rx: Mutex<mpsc::Receiver<HtmlTask>>,
    depth: AtomicUsize,
    capacity: usize,
}

impl HtmlQueue {
    /// Creates a queue bounded to `capacity` tasks
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx: std::sync::Mutex::new(Some(tx)),
            rx: Mutex::new(rx),
            depth: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Non-blocking enqueue; returns the task back when full or closed
    pub fn try_enqueue(&self, task: HtmlTask) -> Result<(), HtmlTask> {
        let tx = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = tx.as_ref() else {
            return Err(task);
        };
        match tx.try_send(task) {
            Ok(()) => {
                self.depth.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(task))
            | Err(mpsc::error::TrySendError::Closed(task)) => Err(task),
        }
    }

    /// Blocking dequeue; `None` once the queue is closed and drained
    pub async fn recv(&self) -> Option<HtmlTask> {
        let task = self.rx.lock().await.recv().await;
        if task.is_some() {
            self.depth.fetch_sub(1, Ordering::Relaxed);
        }
        task
    }

    /// Closes the queue: producers start failing, consumers drain the
    /// backlog and then observe the end of the channel
    pub fn close(&self) {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    /// Tasks currently queued
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// True when no tasks are queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured bound
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

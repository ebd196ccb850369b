use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::Notify;

/// Process-wide stop signal
///
/// Every worker checks [`is_set`] at loop heads and completion-batch
/// boundaries; blocking waits pair it with [`wait`] so nothing sleeps
/// through a shutdown. Signals escalate: the count lets the front-end
/// decide between graceful, forced, and immediate exits.
///
/// [`is_set`]: StopFlag::is_set
/// [`wait`]: StopFlag::wait
#[derive(Default)]
pub struct StopFlag {
    stopped: AtomicBool,
    signals: AtomicU32,
    notify: Notify,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop; returns how many times a stop has been requested
    pub fn request_stop(&self) -> u32 {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        self.signals.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether a stop has been requested
    pub fn is_set(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Number of stop requests so far
    pub fn signal_count(&self) -> u32 {
        self.signals.load(Ordering::SeqCst)
    }

    /// Completes once a stop has been requested
    ///
    /// The wait is bounded: a notification raced away between the check and
    /// the sleep costs at most one re-check interval, never a hang.
    pub async fn wait(&self) {
        while !self.is_set() {
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
            }
        }
    }
}

use crate::frontier::UrlRecord;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Per-worker overflow deques with tail stealing
///
/// Each fetch worker owns one deque: the owner pushes and pops at the head,
/// idle workers steal from the tail. Thieves use `try_lock` and move on
/// rather than contending, so a steal attempt never blocks the owner.
pub struct WorkStealingDeques {
    deques: Vec<Mutex<VecDeque<UrlRecord>>>,
    capacity: usize,
    steal_cursor: AtomicUsize,
    push_cursor: AtomicUsize,
}

impl WorkStealingDeques {
    /// Creates `workers` deques, each bounded to `capacity` records
    pub fn new(workers: usize, capacity: usize) -> Self {
        Self {
            deques: (0..workers.max(1)).map(|_| Mutex::new(VecDeque::new())).collect(),
            capacity,
            steal_cursor: AtomicUsize::new(0),
            push_cursor: AtomicUsize::new(0),
        }
    }

    /// Number of worker slots
    pub fn workers(&self) -> usize {
        self.deques.len()
    }

    /// Bound applied to each deque
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pushes onto a worker's own deque head
    ///
    /// Returns the record back when the deque is full so the caller can
    /// spill it to disk (REGULAR) or drop it with a log (FRESH).
    pub fn push_local(&self, worker: usize, record: UrlRecord) -> Result<(), UrlRecord> {
        let mut deque = self.deques[worker].lock().unwrap_or_else(|e| e.into_inner());
        if deque.len() >= self.capacity {
            return Err(record);
        }
        deque.push_front(record);
        Ok(())
    }

    /// Pushes onto whichever deque the rotating cursor selects
    ///
    /// Used by producers without a deque of their own (HTML workers
    /// re-enqueueing link residuals).
    pub fn push_any(&self, record: UrlRecord) -> Result<(), UrlRecord> {
        let start = self.push_cursor.fetch_add(1, Ordering::Relaxed);
        let n = self.deques.len();
        let mut record = record;
        for i in 0..n {
            match self.push_local((start + i) % n, record) {
                Ok(()) => return Ok(()),
                Err(back) => record = back,
            }
        }
        Err(record)
    }

    /// Pops from a worker's own deque head
    pub fn pop_local(&self, worker: usize) -> Option<UrlRecord> {
        self.deques[worker]
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    /// Steals from another worker's tail
    ///
    /// Victims are visited round-robin from an atomic cursor; a locked or
    /// empty victim is skipped. Returns `None` when nothing was stealable
    /// this pass.
    pub fn try_steal(&self, thief: usize) -> Option<UrlRecord> {
        let n = self.deques.len();
        if n <= 1 {
            return None;
        }
        let start = self.steal_cursor.fetch_add(1, Ordering::Relaxed);
        for i in 0..n {
            let victim = (start + i) % n;
            if victim == thief {
                continue;
            }
            let Ok(mut deque) = self.deques[victim].try_lock() else {
                continue;
            };
            if let Some(record) = deque.pop_back() {
                return Some(record);
            }
        }
        None
    }

    /// Current length of one worker's deque
    pub fn len(&self, worker: usize) -> usize {
        self.deques[worker].lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Records across all deques
    pub fn total_len(&self) -> usize {
        self.deques
            .iter()
            .map(|d| d.lock().unwrap_or_else(|e| e.into_inner()).len())
            .sum()
    }

    /// Longest deque, for the monitor's overflow check
    pub fn max_len(&self) -> usize {
        self.deques
            .iter()
            .map(|d| d.lock().unwrap_or_else(|e| e.into_inner()).len())
            .max()
            .unwrap_or(0)
    }

    /// Removes tail records beyond `keep` from one worker's deque
    ///
    /// The monitor drains oversized deques to disk with this; the head
    /// (the owner's working end) is left untouched.
    pub fn drain_tail(&self, worker: usize, keep: usize) -> Vec<UrlRecord> {
        let mut deque = self.deques[worker].lock().unwrap_or_else(|e| e.into_inner());
        let mut drained = Vec::new();
        while deque.len() > keep {
            match deque.pop_back() {
                Some(record) => drained.push(record),
                None => break,
            }
        }
        drained
    }
}

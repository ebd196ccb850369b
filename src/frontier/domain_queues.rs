use crate::frontier::UrlRecord;
use dashmap::DashMap;
use std::collections::VecDeque;

/// Bound applied to each per-domain queue
pub const DOMAIN_QUEUE_CAP: usize = 100;

/// Per-domain FIFOs holding rate-limited URLs
///
/// When a fetcher pulls a URL whose domain is still inside its spacing
/// window, the URL is parked here instead of burning a frontier slot.
/// Queues are created lazily and idempotently on first park; the map's
/// sharded locking keeps independent domains from contending. Order within
/// a domain is strictly FIFO.
pub struct DomainQueues {
    queues: DashMap<String, VecDeque<UrlRecord>>,
    capacity: usize,
}

impl DomainQueues {
    /// Creates an empty queue set with the default per-domain bound
    pub fn new() -> Self {
        Self::with_capacity(DOMAIN_QUEUE_CAP)
    }

    /// Creates an empty queue set with a custom per-domain bound
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queues: DashMap::new(),
            capacity,
        }
    }

    /// Parks a URL behind its domain's window
    ///
    /// Returns the record back when the domain's queue is full.
    pub fn park(&self, domain: &str, record: UrlRecord) -> Result<(), UrlRecord> {
        let mut queue = self.queues.entry(domain.to_string()).or_default();
        if queue.len() >= self.capacity {
            return Err(record);
        }
        queue.push_back(record);
        Ok(())
    }

    /// Pops the oldest URL of some domain that `ready` reports eligible
    ///
    /// Scans the queue map, asking `ready(domain)` (normally the rate
    /// limiter) for each non-empty domain, and pops FIFO from the first
    /// eligible one.
    pub fn pop_ready(&self, ready: impl Fn(&str) -> bool) -> Option<(String, UrlRecord)> {
        // Collect candidates first: popping while iterating would take a
        // write lock under the iteration's read lock.
        let candidate = self
            .queues
            .iter()
            .find(|entry| !entry.value().is_empty() && ready(entry.key()))
            .map(|entry| entry.key().clone())?;

        let record = self.queues.get_mut(&candidate)?.pop_front()?;
        Some((candidate, record))
    }

    /// Total parked URLs across all domains
    pub fn total_len(&self) -> usize {
        self.queues.iter().map(|e| e.value().len()).sum()
    }

    /// True when nothing is parked
    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(|e| e.value().is_empty())
    }

    /// Drops empty per-domain queues
    pub fn prune_empty(&self) {
        self.queues.retain(|_, queue| !queue.is_empty());
    }

    /// Drains everything, for shutdown accounting
    pub fn drain_all(&self) -> Vec<UrlRecord> {
        let mut drained = Vec::new();
        for mut entry in self.queues.iter_mut() {
            drained.extend(entry.value_mut().drain(..));
        }
        drained
    }
}

impl Default for DomainQueues {
    fn default() -> Self {
        Self::new()
    }
}

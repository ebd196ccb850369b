use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide crawl counters
///
/// Plain relaxed atomics bumped from every worker; the monitor reads them
/// each tick and the engine prints the final summary from them. Losing a
/// tick's worth of precision is fine, losing increments is not, so
/// everything is `fetch_add`.
#[derive(Debug, Default)]
pub struct CrawlMetrics {
    pub pages_fetched: AtomicU64,
    pub pages_not_modified: AtomicU64,
    pub pages_unchanged: AtomicU64,
    pub bytes_fetched: AtomicU64,
    pub links_discovered: AtomicU64,
    pub links_enqueued: AtomicU64,
    pub duplicates_dropped: AtomicU64,
    pub robots_fetches: AtomicU64,
    pub robots_denied: AtomicU64,
    pub throttled_responses: AtomicU64,
    pub transport_errors: AtomicU64,
    pub http_errors: AtomicU64,
    pub https_fallbacks: AtomicU64,
    pub language_filtered: AtomicU64,
    pub quality_rejected: AtomicU64,
    pub parse_failures: AtomicU64,
    pub tasks_dropped: AtomicU64,
    pub spilled_to_disk: AtomicU64,
    pub batches_written: AtomicU64,
    pub emergency_injections: AtomicU64,
}

/// A point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub pages_fetched: u64,
    pub pages_not_modified: u64,
    pub pages_unchanged: u64,
    pub bytes_fetched: u64,
    pub links_discovered: u64,
    pub links_enqueued: u64,
    pub duplicates_dropped: u64,
    pub robots_fetches: u64,
    pub robots_denied: u64,
    pub throttled_responses: u64,
    pub transport_errors: u64,
    pub http_errors: u64,
    pub https_fallbacks: u64,
    pub language_filtered: u64,
    pub quality_rejected: u64,
    pub parse_failures: u64,
    pub tasks_dropped: u64,
    pub spilled_to_disk: u64,
    pub batches_written: u64,
    pub emergency_injections: u64,
}

impl MetricsSnapshot {
    /// All error-ish counters combined
    pub fn total_errors(&self) -> u64 {
        self.transport_errors + self.http_errors + self.parse_failures
    }
}

impl CrawlMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Copies every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            pages_fetched: get(&self.pages_fetched),
            pages_not_modified: get(&self.pages_not_modified),
            pages_unchanged: get(&self.pages_unchanged),
            bytes_fetched: get(&self.bytes_fetched),
            links_discovered: get(&self.links_discovered),
            links_enqueued: get(&self.links_enqueued),
            duplicates_dropped: get(&self.duplicates_dropped),
            robots_fetches: get(&self.robots_fetches),
            robots_denied: get(&self.robots_denied),
            throttled_responses: get(&self.throttled_responses),
            transport_errors: get(&self.transport_errors),
            http_errors: get(&self.http_errors),
            https_fallbacks: get(&self.https_fallbacks),
            language_filtered: get(&self.language_filtered),
            quality_rejected: get(&self.quality_rejected),
            parse_failures: get(&self.parse_failures),
            tasks_dropped: get(&self.tasks_dropped),
            spilled_to_disk: get(&self.spilled_to_disk),
            batches_written: get(&self.batches_written),
            emergency_injections: get(&self.emergency_injections),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = CrawlMetrics::new();
        CrawlMetrics::incr(&metrics.pages_fetched);
        CrawlMetrics::incr(&metrics.pages_fetched);
        CrawlMetrics::add(&metrics.bytes_fetched, 1024);

        let snap = metrics.snapshot();
        assert_eq!(snap.pages_fetched, 2);
        assert_eq!(snap.bytes_fetched, 1024);
        assert_eq!(snap.links_discovered, 0);
    }

    #[test]
    fn test_total_errors() {
        let metrics = CrawlMetrics::new();
        CrawlMetrics::incr(&metrics.transport_errors);
        CrawlMetrics::incr(&metrics.http_errors);
        CrawlMetrics::incr(&metrics.parse_failures);
        assert_eq!(metrics.snapshot().total_errors(), 3);
    }
}

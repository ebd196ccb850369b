//! Crawl health monitoring and auto-shutdown
//!
//! A single monitor task ticks at a fixed interval, reporting queue depths
//! and crawl rate, shuttling URLs between memory and disk, injecting
//! emergency seeds when the crawl runs dry, and finally setting the stop
//! flag when there is provably nothing left to do.

mod metrics;

pub use metrics::{CrawlMetrics, MetricsSnapshot};

use crate::blacklist::DomainBlacklist;
use crate::config::CrawlMode;
use crate::engine::StopFlag;
use crate::frontier::{DiskSpill, DomainQueues, Frontier, UrlRecord, WorkStealingDeques};
use crate::pipeline::HtmlQueue;
use crate::robots::RobotsGate;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Refill the frontier from disk when it drops below this many URLs
pub const REFILL_THRESHOLD: usize = 1000;

/// Frontier below this is considered starved
pub const LOW_QUEUE_THRESHOLD: usize = 100;

/// Total available URLs below this is considered terminal
pub const CRITICAL_QUEUE_THRESHOLD: usize = 10;

/// Pages/sec below which a starved frontier warrants emergency seeds
pub const SHUTDOWN_RATE_THRESHOLD: f64 = 5.0;

/// Pages/sec treated as effectively idle
pub const VERY_LOW_RATE: f64 = 1.0;

/// Emergency seed injections allowed per run
pub const MAX_EMERGENCY_INJECTIONS: u32 = 3;

/// Housekeeping (shard cleanup, blacklist purge) runs every N ticks
const CLEANUP_EVERY_TICKS: u64 = 12;

/// The monitor task's state and handles
pub struct Monitor {
    frontier: Arc<Frontier>,
    deques: Arc<WorkStealingDeques>,
    domain_queues: Arc<DomainQueues>,
    html_queue: Arc<HtmlQueue>,
    spill: Option<Arc<DiskSpill>>,
    robots: Arc<RobotsGate>,
    blacklist: Arc<DomainBlacklist>,
    metrics: Arc<CrawlMetrics>,
    stop: Arc<StopFlag>,
    emergency_seeds: Vec<String>,
    mode: CrawlMode,
    tick: Duration,

    started_at: Instant,
    tick_count: u64,
    last_pages: u64,
    low_ticks: u32,
    critical_ticks: u32,
    injections: u32,
}

impl Monitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        frontier: Arc<Frontier>,
        deques: Arc<WorkStealingDeques>,
        domain_queues: Arc<DomainQueues>,
        html_queue: Arc<HtmlQueue>,
        spill: Option<Arc<DiskSpill>>,
        robots: Arc<RobotsGate>,
        blacklist: Arc<DomainBlacklist>,
        metrics: Arc<CrawlMetrics>,
        stop: Arc<StopFlag>,
        emergency_seeds: Vec<String>,
        mode: CrawlMode,
        tick: Duration,
    ) -> Self {
        Self {
            frontier,
            deques,
            domain_queues,
            html_queue,
            spill,
            robots,
            blacklist,
            metrics,
            stop,
            emergency_seeds,
            mode,
            tick,
            started_at: Instant::now(),
            tick_count: 0,
            last_pages: 0,
            low_ticks: 0,
            critical_ticks: 0,
            injections: 0,
        }
    }

    /// One monitor tick; returns true if it requested a stop
    pub fn tick(&mut self) -> bool {
        self.tick_count += 1;
        let snapshot = self.metrics.snapshot();
        let rate = (snapshot.pages_fetched - self.last_pages) as f64 / self.tick.as_secs_f64();
        self.last_pages = snapshot.pages_fetched;

        let frontier_len = self.frontier.len();
        let deque_len = self.deques.total_len();
        let parked = self.domain_queues.total_len();
        let html_backlog = self.html_queue.len();
        let disk = self.spill.as_ref().map(|s| s.total_lines()).unwrap_or(0);

        tracing::info!(
            frontier = frontier_len,
            deques = deque_len,
            parked,
            html = html_backlog,
            disk,
            pages = snapshot.pages_fetched,
            rate = format!("{:.1}/s", rate),
            errors = snapshot.total_errors(),
            "crawl status"
        );

        self.shuffle_disk(frontier_len);

        if self.tick_count % CLEANUP_EVERY_TICKS == 0 {
            self.blacklist.purge_expired();
            self.domain_queues.prune_empty();
            if let Some(spill) = &self.spill {
                if let Err(e) = spill.cleanup_empty_shards() {
                    tracing::warn!(error = %e, "shard cleanup failed");
                }
            }
        }

        // FRESH starts with an empty frontier while the feed collaborator
        // warms up; hold off the starvation logic until the grace passes.
        let grace = Duration::from_secs(self.mode.startup_grace_secs());
        if self.started_at.elapsed() < grace {
            return false;
        }

        // URLs parked behind in-flight robots fetches are still pending work
        let available =
            frontier_len + deque_len + parked + html_backlog + self.robots.deferred_len();

        if frontier_len < LOW_QUEUE_THRESHOLD && rate < SHUTDOWN_RATE_THRESHOLD {
            self.low_ticks += 1;
        } else {
            self.low_ticks = 0;
        }
        if self.low_ticks >= 2
            && self.injections < MAX_EMERGENCY_INJECTIONS
            && !self.emergency_seeds.is_empty()
        {
            self.inject_emergency_seeds();
            self.low_ticks = 0;
        }

        if (available as u64 + disk) < CRITICAL_QUEUE_THRESHOLD as u64 && rate < VERY_LOW_RATE {
            self.critical_ticks += 1;
        } else {
            self.critical_ticks = 0;
        }
        if self.critical_ticks >= 3 {
            tracing::info!("no work left and the crawl rate is idle, requesting shutdown");
            self.stop.request_stop();
            return true;
        }
        false
    }

    /// Moves URLs between the frontier and the disk shards
    fn shuffle_disk(&mut self, frontier_len: usize) {
        let Some(spill) = &self.spill else {
            return;
        };

        // Refill a draining frontier
        if frontier_len < REFILL_THRESHOLD && spill.total_lines() > 0 {
            let want = REFILL_THRESHOLD - frontier_len;
            match spill.load_urls(want) {
                Ok(batch) if !batch.is_empty() => {
                    let loaded = batch.len();
                    let residual = self.frontier.enqueue_batch(batch);
                    let requeued = loaded - residual.len();
                    if !residual.is_empty() {
                        if let Err(e) = spill.save_urls(&residual) {
                            tracing::error!(error = %e, "failed to return residual to disk");
                        }
                    }
                    tracing::debug!(requeued, "refilled frontier from disk");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "disk refill failed"),
            }
        }

        // Drain overloaded memory to disk
        let frontier_high = self.frontier.max_size() * 8 / 10;
        let deque_cap = self.deques.capacity();
        let deque_high = deque_cap * 8 / 10;
        if frontier_len > frontier_high || self.deques.max_len() > deque_high {
            for worker in 0..self.deques.workers() {
                if self.deques.len(worker) <= deque_high {
                    continue;
                }
                let drained = self.deques.drain_tail(worker, deque_cap / 2);
                if drained.is_empty() {
                    continue;
                }
                match spill.save_urls(&drained) {
                    Ok(n) => CrawlMetrics::add(&self.metrics.spilled_to_disk, n as u64),
                    Err(e) => tracing::error!(error = %e, "failed to drain deque to disk"),
                }
            }
        }
    }

    fn inject_emergency_seeds(&mut self) {
        self.injections += 1;
        CrawlMetrics::incr(&self.metrics.emergency_injections);
        tracing::warn!(
            injection = self.injections,
            seeds = self.emergency_seeds.len(),
            "frontier starved, injecting emergency seeds"
        );

        let records: Vec<UrlRecord> = self
            .emergency_seeds
            .iter()
            .filter_map(|raw| crate::canonicalize_url(raw).ok())
            .map(|url| UrlRecord::seed(url.to_string()))
            .collect();
        let residual = self.frontier.enqueue_batch(records);
        if !residual.is_empty() {
            tracing::debug!(skipped = residual.len(), "emergency seeds did not fit");
        }
    }
}

/// Monitor task loop
pub async fn run_monitor(mut monitor: Monitor) {
    let stop = monitor.stop.clone();
    let tick = monitor.tick;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(tick) => {
                if monitor.tick() {
                    break;
                }
            }
            _ = stop.wait() => break,
        }
    }
    tracing::debug!("monitor exiting");
}

/// Prints the end-of-run summary
pub fn print_summary(snapshot: &MetricsSnapshot, elapsed: Duration, residual_urls: usize) {
    let secs = elapsed.as_secs_f64().max(f64::EPSILON);

    println!("=== Crawl Summary ===\n");
    println!("Pages:");
    println!("  Fetched (200):       {}", snapshot.pages_fetched);
    println!("  Not modified (304):  {}", snapshot.pages_not_modified);
    println!("  Content unchanged:   {}", snapshot.pages_unchanged);
    println!("  Bytes fetched:       {}", snapshot.bytes_fetched);
    println!();
    println!("Links:");
    println!("  Discovered:          {}", snapshot.links_discovered);
    println!("  Enqueued:            {}", snapshot.links_enqueued);
    println!("  Spilled to disk:     {}", snapshot.spilled_to_disk);
    println!();
    println!("Filtered / skipped:");
    println!("  Robots denied:       {}", snapshot.robots_denied);
    println!("  Language filtered:   {}", snapshot.language_filtered);
    println!("  Quality rejected:    {}", snapshot.quality_rejected);
    println!("  Duplicates dropped:  {}", snapshot.duplicates_dropped);
    println!("  Tasks dropped:       {}", snapshot.tasks_dropped);
    println!();
    println!("Errors:");
    println!("  Transport:           {}", snapshot.transport_errors);
    println!("  HTTP:                {}", snapshot.http_errors);
    println!("  Parse:               {}", snapshot.parse_failures);
    println!("  Server throttles:    {}", snapshot.throttled_responses);
    println!("  HTTPS fallbacks:     {}", snapshot.https_fallbacks);
    println!();
    println!("Residual URLs in queues: {}", residual_urls);
    println!(
        "Achieved rate: {:.1} pages/sec over {:.1}s",
        snapshot.pages_fetched as f64 / secs,
        elapsed.as_secs_f64()
    );
}

//! Engine assembly and lifecycle
//!
//! [`Engine::new`] builds every component in a fixed order from the loaded
//! configuration; [`Engine::run`] seeds the frontier, spawns the worker
//! pools and the monitor, waits out the crawl, and tears everything down in
//! the safe order: feed sources first, then queues, then the storage flush,
//! then frontier and metadata, then the backing stores.

mod stop;

pub use stop::StopFlag;

use crate::blacklist::DomainBlacklist;
use crate::config::{load_domain_boosts, load_line_list, Config};
use crate::fetch::{build_http_client, run_fetch_worker, FetchContext};
use crate::frontier::{DiskSpill, DomainQueues, Frontier, UrlRecord, WorkStealingDeques};
use crate::limiter::RateLimiter;
use crate::meta::{MetadataStore, SqliteMetaStore};
use crate::monitor::{print_summary, run_monitor, CrawlMetrics, MetricsSnapshot, Monitor};
use crate::pipeline::{run_html_worker, HtmlProcessor, HtmlQueue};
use crate::sink::{HtmlSink, JsonlSink};
use crate::url::DomainBoosts;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The assembled crawl engine
pub struct Engine {
    config: Config,
    seeds: Vec<String>,
    emergency_seeds: Vec<String>,
    frontier: Arc<Frontier>,
    deques: Arc<WorkStealingDeques>,
    domain_queues: Arc<DomainQueues>,
    spill: Option<Arc<DiskSpill>>,
    limiter: Arc<RateLimiter>,
    robots: Arc<crate::robots::RobotsGate>,
    blacklist: Arc<DomainBlacklist>,
    boosts: Arc<DomainBoosts>,
    meta: Arc<dyn MetadataStore>,
    html_queue: Arc<HtmlQueue>,
    processor: Arc<HtmlProcessor>,
    metrics: Arc<CrawlMetrics>,
    stop: Arc<StopFlag>,
}

impl Engine {
    /// Builds the engine from a validated configuration
    ///
    /// Components initialize in a fixed order so teardown can safely run in
    /// reverse. Any failure here is fatal (exit code 1 territory): a crawl
    /// must not limp along without its work directory or metadata store.
    pub fn new(config: Config) -> crate::Result<Self> {
        let mode = config.crawler.mode;
        let crawler = &config.crawler;
        let paths = &config.paths;

        // Input lists
        let seeds = load_line_list(Path::new(&paths.seeds))?;
        let emergency_seeds = match &paths.emergency_seeds {
            Some(path) => load_line_list(Path::new(path))?,
            None => Vec::new(),
        };
        let permanent_blacklist = match &paths.blacklist {
            Some(path) => load_line_list(Path::new(path))?,
            None => Vec::new(),
        };
        let boosts = match &paths.domain_boosts {
            Some(path) => load_domain_boosts(Path::new(path))?,
            None => DomainBoosts::default_table(),
        };

        // Feed and sitemap lists belong to the collaborators; we only
        // validate that they load and report their size.
        if let Some(path) = &paths.feeds {
            let feeds = load_line_list(Path::new(path))?;
            tracing::info!(feeds = feeds.len(), "feed list handed to RSS collaborator");
        }
        if let Some(path) = &paths.sitemaps {
            let sitemaps = load_line_list(Path::new(path))?;
            tracing::info!(sitemaps = sitemaps.len(), "sitemap list handed to collaborator");
        }

        let workers = crawler.effective_fetch_workers();

        // Core shared state, in initialization order
        let metrics = Arc::new(CrawlMetrics::new());
        let stop = Arc::new(StopFlag::new());
        let blacklist = Arc::new(DomainBlacklist::new(&permanent_blacklist));
        let boosts = Arc::new(boosts);
        let frontier = Arc::new(Frontier::new(
            crawler.frontier_partitions,
            crawler.frontier_max_size,
            crawler.max_depth,
        ));
        let deques = Arc::new(WorkStealingDeques::new(workers, mode.deque_capacity()));
        let domain_queues = Arc::new(DomainQueues::new());
        let spill = if mode.disk_spill_enabled() {
            Some(Arc::new(DiskSpill::open(Path::new(&paths.work_dir))?))
        } else {
            None
        };
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(
            crawler.min_request_gap_ms,
        )));
        let robots = Arc::new(crate::robots::RobotsGate::new(
            &config.user_agent.crawler_name,
        ));
        let meta: Arc<dyn MetadataStore> =
            Arc::new(SqliteMetaStore::open(Path::new(&paths.metadata_db))?);
        let sink: Arc<dyn HtmlSink> = Arc::new(JsonlSink::open(Path::new(&paths.batch_output))?);
        let html_queue = Arc::new(HtmlQueue::new(config.limits.html_queue_capacity));
        let processor = Arc::new(HtmlProcessor::new(
            frontier.clone(),
            deques.clone(),
            spill.clone(),
            blacklist.clone(),
            boosts.clone(),
            sink,
            metrics.clone(),
            mode,
            config.limits.batch_size,
            crawler.link_extraction_depth,
        ));

        Ok(Self {
            config,
            seeds,
            emergency_seeds,
            frontier,
            deques,
            domain_queues,
            spill,
            limiter,
            robots,
            blacklist,
            boosts,
            meta,
            html_queue,
            processor,
            metrics,
            stop,
        })
    }

    /// Stop handle for signal handlers and embedders
    pub fn stop_handle(&self) -> Arc<StopFlag> {
        self.stop.clone()
    }

    /// Frontier handle for the feed/sitemap collaborators
    pub fn frontier_handle(&self) -> Arc<Frontier> {
        self.frontier.clone()
    }

    /// Metrics handle
    pub fn metrics_handle(&self) -> Arc<CrawlMetrics> {
        self.metrics.clone()
    }

    /// Boost table handle, for collaborators that price their own URLs
    pub fn boosts_handle(&self) -> Arc<DomainBoosts> {
        self.boosts.clone()
    }

    /// Runs the crawl to completion and returns the final counters
    pub async fn run(self) -> crate::Result<MetricsSnapshot> {
        let started_at = Instant::now();
        let mode = self.config.crawler.mode;
        let workers = self.config.crawler.effective_fetch_workers();
        let html_workers = self.config.crawler.effective_html_workers();

        self.seed_frontier();
        tracing::info!(
            ?mode,
            workers,
            html_workers,
            seeds = self.seeds.len(),
            frontier = self.frontier.len(),
            "starting crawl"
        );

        // HTML workers first so fetchers never produce into a void
        let mut html_handles = Vec::with_capacity(html_workers);
        for id in 0..html_workers {
            html_handles.push(tokio::spawn(run_html_worker(
                id,
                self.html_queue.clone(),
                self.processor.clone(),
            )));
        }

        let fetch_ctx = Arc::new(FetchContext {
            frontier: self.frontier.clone(),
            deques: self.deques.clone(),
            domain_queues: self.domain_queues.clone(),
            spill: self.spill.clone(),
            limiter: self.limiter.clone(),
            robots: self.robots.clone(),
            blacklist: self.blacklist.clone(),
            meta: self.meta.clone(),
            html_queue: self.html_queue.clone(),
            processor: self.processor.clone(),
            metrics: self.metrics.clone(),
            stop: self.stop.clone(),
            mode,
            max_in_flight: self.config.crawler.max_in_flight,
            max_body_bytes: self.config.limits.max_body_bytes,
            min_text_chars: self.config.limits.min_text_chars,
            throttle_seconds: self.config.crawler.throttle_seconds,
            failure_blacklist_threshold: self.config.crawler.failure_blacklist_threshold,
        });

        let mut fetch_handles = Vec::with_capacity(workers);
        for id in 0..workers {
            // One client per worker: pools, DNS and TLS sessions are
            // worker-local by design
            let client = build_http_client(&self.config.user_agent)?;
            fetch_handles.push(tokio::spawn(run_fetch_worker(id, fetch_ctx.clone(), client)));
        }

        let monitor = Monitor::new(
            self.frontier.clone(),
            self.deques.clone(),
            self.domain_queues.clone(),
            self.html_queue.clone(),
            self.spill.clone(),
            self.robots.clone(),
            self.blacklist.clone(),
            self.metrics.clone(),
            self.stop.clone(),
            self.emergency_seeds.clone(),
            mode,
            Duration::from_millis(self.config.crawler.monitor_tick_ms),
        );
        let monitor_handle = tokio::spawn(run_monitor(monitor));

        // Fetchers exit once the stop flag is set and their in-flight
        // requests have drained (or the grace expires)
        for handle in fetch_handles {
            let _ = handle.await;
        }
        tracing::info!("fetch workers stopped");

        // Close the HTML queue: workers drain the backlog, then exit
        self.html_queue.close();
        for handle in html_handles {
            let _ = handle.await;
        }
        tracing::info!("HTML workers stopped");

        let _ = monitor_handle.await;

        // Teardown: sources are external and already stopped; queues next
        let parked = self.domain_queues.drain_all();
        if !parked.is_empty() {
            tracing::info!(parked = parked.len(), "residual URLs in domain queues");
        }

        // Storage flush before anything below it goes away
        self.processor.flush().map_err(crate::TrawlerError::from)?;

        let residual_urls =
            self.frontier.len() + self.deques.total_len() + parked.len() + self.html_queue.len();

        CrawlMetrics::add(
            &self.metrics.duplicates_dropped,
            self.frontier.duplicates_dropped(),
        );
        let snapshot = self.metrics.snapshot();
        print_summary(&snapshot, started_at.elapsed(), residual_urls);

        // Frontier, metadata and the key-value stores drop last, in field
        // order, with no worker left alive to observe them.
        Ok(snapshot)
    }

    /// Canonicalizes and enqueues the seed list
    fn seed_frontier(&self) {
        let records: Vec<UrlRecord> = self
            .seeds
            .iter()
            .filter_map(|raw| match crate::canonicalize_url(raw) {
                Ok(url) => Some(UrlRecord::seed(url.to_string())),
                Err(e) => {
                    tracing::warn!(url = %raw, error = %e, "skipping invalid seed");
                    None
                }
            })
            .collect();

        let residual = self.frontier.enqueue_batch(records);
        if !residual.is_empty() {
            tracing::warn!(
                skipped = residual.len(),
                "seed list exceeds frontier capacity"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CrawlMode, CrawlerConfig, LimitsConfig, PathsConfig, UserAgentConfig};
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, content: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path.display().to_string()
    }

    fn test_config(dir: &Path, mode: CrawlMode) -> Config {
        Config {
            crawler: CrawlerConfig {
                mode,
                max_depth: 3,
                fetch_workers: 2,
                html_workers: 1,
                max_in_flight: 5,
                frontier_max_size: 1000,
                frontier_partitions: 4,
                link_extraction_depth: 5,
                min_request_gap_ms: 10,
                throttle_seconds: 1,
                failure_blacklist_threshold: 3,
                monitor_tick_ms: 100,
            },
            user_agent: UserAgentConfig {
                crawler_name: "TestTrawler".to_string(),
                crawler_version: "0.3".to_string(),
                contact_url: "https://example.com/bot".to_string(),
                contact_email: "bot@example.com".to_string(),
            },
            paths: PathsConfig {
                work_dir: dir.join("work").display().to_string(),
                seeds: write_file(dir, "seeds.txt", "https://a.test/\n# comment\nhttps://b.test/\n"),
                emergency_seeds: None,
                feeds: None,
                sitemaps: None,
                blacklist: Some(write_file(dir, "blacklist.txt", "blocked.test\n")),
                domain_boosts: None,
                metadata_db: dir.join("meta.db").display().to_string(),
                batch_output: dir.join("batches.jsonl").display().to_string(),
            },
            limits: LimitsConfig::default(),
        }
    }

    #[test]
    fn test_engine_builds_regular() {
        let dir = TempDir::new().unwrap();
        let engine = Engine::new(test_config(dir.path(), CrawlMode::Regular)).unwrap();
        assert!(engine.spill.is_some());
        assert_eq!(engine.seeds.len(), 2);
        assert!(engine.blacklist.is_blacklisted("blocked.test"));
    }

    #[test]
    fn test_engine_fresh_has_no_spill() {
        let dir = TempDir::new().unwrap();
        let engine = Engine::new(test_config(dir.path(), CrawlMode::Fresh)).unwrap();
        assert!(engine.spill.is_none());
        assert_eq!(engine.deques.capacity(), 2000);
    }

    #[test]
    fn test_missing_seed_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(dir.path(), CrawlMode::Regular);
        config.paths.seeds = dir.path().join("nope.txt").display().to_string();
        assert!(Engine::new(config).is_err());
    }

    #[test]
    fn test_seed_frontier_dedups_and_canonicalizes() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(dir.path(), CrawlMode::Regular);
        config.paths.seeds = write_file(
            dir.path(),
            "seeds2.txt",
            "https://www.a.test/\nhttps://a.test/\nnot-a-url\n",
        );
        let engine = Engine::new(config).unwrap();
        engine.seed_frontier();
        // www-stripped duplicate and the garbage line both vanish
        assert_eq!(engine.frontier.len(), 1);
    }
}

use serde::Deserialize;

/// Operating mode of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlMode {
    /// Breadth-first deep crawl with disk-backed overflow
    Regular,
    /// Low-latency re-crawl of a fixed corpus, no disk overflow
    Fresh,
}

impl CrawlMode {
    /// Per-worker overflow deque capacity for this mode
    pub fn deque_capacity(&self) -> usize {
        match self {
            Self::Regular => 1000,
            Self::Fresh => 2000,
        }
    }

    /// Whether URLs that overflow memory spill to disk shards
    pub fn disk_spill_enabled(&self) -> bool {
        matches!(self, Self::Regular)
    }

    /// Startup grace before the monitor may auto-shutdown, in seconds
    ///
    /// FRESH crawls start with an empty frontier and wait for the feed
    /// collaborator to populate it.
    pub fn startup_grace_secs(&self) -> u64 {
        match self {
            Self::Regular => 0,
            Self::Fresh => 60,
        }
    }
}

/// Main configuration structure for trawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub paths: PathsConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Operating mode
    #[serde(default = "default_mode")]
    pub mode: CrawlMode,

    /// Maximum depth from seed URLs; deeper URLs are rejected at enqueue
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Number of fetch workers (0 = one per hardware thread, capped at 4 minimum)
    #[serde(rename = "fetch-workers", default = "default_fetch_workers")]
    pub fetch_workers: usize,

    /// Number of HTML workers (0 = fetch_workers / 4, minimum 1)
    #[serde(rename = "html-workers", default)]
    pub html_workers: usize,

    /// Maximum concurrent in-flight requests per fetch worker
    #[serde(rename = "max-in-flight", default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Maximum URLs held in the in-memory frontier
    #[serde(rename = "frontier-max-size", default = "default_frontier_max")]
    pub frontier_max_size: usize,

    /// Number of frontier partitions
    #[serde(rename = "frontier-partitions", default = "default_partitions")]
    pub frontier_partitions: usize,

    /// Outbound links are only extracted from pages shallower than this
    #[serde(rename = "link-extraction-depth", default = "default_link_depth")]
    pub link_extraction_depth: u32,

    /// Minimum spacing between requests to one domain, in milliseconds
    #[serde(rename = "min-request-gap-ms", default = "default_min_gap")]
    pub min_request_gap_ms: u64,

    /// Throttle window applied on 429/503, in seconds (overridden by Retry-After)
    #[serde(rename = "throttle-seconds", default = "default_throttle")]
    pub throttle_seconds: u64,

    /// Consecutive transport failures before a domain is temporarily blacklisted
    #[serde(rename = "failure-blacklist-threshold", default = "default_fail_threshold")]
    pub failure_blacklist_threshold: u32,

    /// Monitor tick interval in milliseconds
    #[serde(rename = "monitor-tick-ms", default = "default_monitor_tick")]
    pub monitor_tick_ms: u64,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// File locations consumed by the engine
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Directory for disk spill shards and scratch state
    #[serde(rename = "work-dir")]
    pub work_dir: String,

    /// Seed URL list, one per line
    pub seeds: String,

    /// Emergency seed list used when the frontier runs dry
    #[serde(rename = "emergency-seeds", default)]
    pub emergency_seeds: Option<String>,

    /// RSS/Atom feed list consumed by the feed collaborator
    #[serde(default)]
    pub feeds: Option<String>,

    /// Sitemap list consumed by the sitemap collaborator
    #[serde(default)]
    pub sitemaps: Option<String>,

    /// Domain blacklist, one domain per line, `#` comments
    #[serde(default)]
    pub blacklist: Option<String>,

    /// Domain boost table (TOML)
    #[serde(rename = "domain-boosts", default)]
    pub domain_boosts: Option<String>,

    /// Metadata / conditional-GET store database
    #[serde(rename = "metadata-db")]
    pub metadata_db: String,

    /// Output file for raw HTML batches
    #[serde(rename = "batch-output")]
    pub batch_output: String,
}

/// Processing limits
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum accepted response body size in bytes
    #[serde(rename = "max-body-bytes", default = "default_max_body")]
    pub max_body_bytes: usize,

    /// Minimum alphanumeric text characters for a page to be stored
    #[serde(rename = "min-text-chars", default = "default_min_text")]
    pub min_text_chars: usize,

    /// HTML batch size handed to the storage writer
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    /// Bounded HTML processing queue capacity
    #[serde(rename = "html-queue-capacity", default = "default_queue_cap")]
    pub html_queue_capacity: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body(),
            min_text_chars: default_min_text(),
            batch_size: default_batch_size(),
            html_queue_capacity: default_queue_cap(),
        }
    }
}

impl CrawlerConfig {
    /// Effective number of fetch workers
    pub fn effective_fetch_workers(&self) -> usize {
        if self.fetch_workers > 0 {
            return self.fetch_workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .max(1)
    }

    /// Effective number of HTML workers (fetch workers / 4, minimum 1)
    pub fn effective_html_workers(&self) -> usize {
        if self.html_workers > 0 {
            return self.html_workers;
        }
        (self.effective_fetch_workers() / 4).max(1)
    }
}

fn default_mode() -> CrawlMode {
    CrawlMode::Regular
}

fn default_max_depth() -> u32 {
    6
}

fn default_fetch_workers() -> usize {
    4
}

fn default_max_in_flight() -> usize {
    45
}

fn default_frontier_max() -> usize {
    100_000
}

fn default_partitions() -> usize {
    16
}

fn default_link_depth() -> u32 {
    5
}

fn default_min_gap() -> u64 {
    50
}

fn default_throttle() -> u64 {
    10
}

fn default_fail_threshold() -> u32 {
    5
}

fn default_monitor_tick() -> u64 {
    5000
}

fn default_max_body() -> usize {
    2 * 1024 * 1024
}

fn default_min_text() -> usize {
    100
}

fn default_batch_size() -> usize {
    100
}

fn default_queue_cap() -> usize {
    1000
}

//! Page metadata and conditional-GET store
//!
//! The engine tracks, per canonical URL: the validators for conditional
//! requests (ETag / Last-Modified), the content hash of the last fetch, and
//! the freshness schedule derived from how often the content actually
//! changes. The store itself is a collaborator behind [`MetadataStore`];
//! this module ships a SQLite-backed implementation and an in-memory one
//! for tests and FRESH-mode smoke runs.

mod memory;
mod sqlite;

pub use memory::MemoryMetaStore;
pub use sqlite::SqliteMetaStore;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Base recrawl interval for freshly changed pages
pub const BASE_RECRAWL_SECS: i64 = 3600;

/// Cap on the exponential recrawl backoff (7 days)
pub const MAX_RECRAWL_SECS: i64 = 7 * 24 * 3600;

/// Errors from metadata store operations
#[derive(Debug, Error)]
pub enum MetaError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for metadata operations
pub type MetaResult<T> = Result<T, MetaError>;

/// Validators for a conditional GET
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheInfo {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl CacheInfo {
    /// True when no validator is available (first fetch)
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// Full metadata snapshot for one URL
#[derive(Debug, Clone)]
pub struct PageMeta {
    pub url: String,
    pub content_hash: Option<String>,
    pub last_crawled_at: Option<DateTime<Utc>>,
    pub next_recrawl_at: Option<DateTime<Utc>>,
    pub no_change_count: u32,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// Outcome of recording a crawl's content hash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentChange {
    /// First fetch or the hash differs from the stored one
    Changed,
    /// Byte-identical relevant content; carries the new streak length
    Unchanged { no_change_count: u32 },
}

/// Aggregate store statistics (for `--stats`)
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub total_urls: u64,
    pub urls_with_validators: u64,
    pub urls_unchanged_streak: u64,
}

/// Collaborator interface for the metadata / conditional-GET store
///
/// Implementations must be safe to call from every worker concurrently.
pub trait MetadataStore: Send + Sync {
    /// Validators for the next conditional GET of `url`
    fn cache_info(&self, url: &str) -> MetaResult<CacheInfo>;

    /// Records response validators after a 200
    fn update_cache(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> MetaResult<()>;

    /// Records a completed crawl and advances the freshness schedule
    ///
    /// An unchanged hash extends the no-change streak and pushes
    /// `next_recrawl_at` out exponentially; a changed hash resets both.
    fn update_after_crawl(&self, url: &str, content_hash: &str) -> MetaResult<ContentChange>;

    /// Records a 429/503 or permanent HTTP error for backoff scheduling
    fn record_temporary_failure(&self, url: &str) -> MetaResult<()>;

    /// Full snapshot for one URL, if known
    fn page_meta(&self, url: &str) -> MetaResult<Option<PageMeta>>;

    /// Aggregate statistics
    fn stats(&self) -> MetaResult<StoreStats>;
}

/// Recrawl interval for a given no-change streak
///
/// `BASE_RECRAWL_SECS · 2^streak`, capped at [`MAX_RECRAWL_SECS`]. Streak 0
/// (changed content) recrawls at the base interval.
pub fn recrawl_interval(no_change_count: u32) -> Duration {
    let shift = no_change_count.min(16);
    let secs = BASE_RECRAWL_SECS.saturating_mul(1i64 << shift).min(MAX_RECRAWL_SECS);
    Duration::seconds(secs)
}

//! Trawler: a high-throughput, polite web crawl engine
//!
//! This crate implements the fetch-and-extract core of a crawler: a
//! partitioned URL frontier with disk-backed overflow, a pool of fetch
//! workers each multiplexing many in-flight HTTP requests, an HTML
//! processing stage, per-domain rate limiting and robots.txt gating, and
//! the monitoring/shutdown machinery that binds them.
//!
//! Two operating modes exist: [`CrawlMode::Regular`] (breadth-first deep
//! crawl with disk spill) and [`CrawlMode::Fresh`] (low-latency re-crawl of
//! a fixed corpus, no disk spill).
//!
//! [`CrawlMode::Regular`]: config::CrawlMode::Regular
//! [`CrawlMode::Fresh`]: config::CrawlMode::Fresh

pub mod blacklist;
pub mod config;
pub mod engine;
pub mod fetch;
pub mod frontier;
pub mod limiter;
pub mod meta;
pub mod monitor;
pub mod pipeline;
pub mod robots;
pub mod sink;
pub mod url;

use thiserror::Error;

/// Main error type for trawler operations
#[derive(Debug, Error)]
pub enum TrawlerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Metadata store error: {0}")]
    Meta(#[from] meta::MetaError),

    #[error("Storage sink error: {0}")]
    Sink(#[from] sink::SinkError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to create work directory {path}: {source}")]
    WorkDir {
        path: String,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for trawler operations
pub type Result<T> = std::result::Result<T, TrawlerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::{Config, CrawlMode};
pub use frontier::{Frontier, UrlRecord};
pub use url::canonicalize_url;

//! Configuration loading for trawler
//!
//! The main configuration is a TOML file; seed lists, emergency seeds,
//! feed/sitemap lists and the domain blacklist are flat line files, and the
//! domain boost table is a small TOML table. All loaders live here.

mod parser;
mod types;
mod validation;

pub use parser::{
    compute_config_hash, load_config, load_config_with_hash, load_domain_boosts, load_line_list,
    parse_line_list,
};
pub use types::{
    Config, CrawlMode, CrawlerConfig, LimitsConfig, PathsConfig, UserAgentConfig,
};
pub use validation::validate;

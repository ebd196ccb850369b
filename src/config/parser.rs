use crate::config::types::Config;
use crate::config::validation::validate;
use crate::url::DomainBoosts;
use crate::ConfigError;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Used to detect configuration drift between runs.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Loads a flat line-oriented list file
///
/// Blank lines and lines starting with `#` are skipped; surrounding
/// whitespace is trimmed. Seed lists, emergency seed lists, feed lists,
/// sitemap lists, and the domain blacklist all use this format.
pub fn load_line_list(path: &Path) -> Result<Vec<String>, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_line_list(&content))
}

/// Parses line-list content (see [`load_line_list`])
pub fn parse_line_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Deserialize)]
struct BoostFile {
    #[serde(default)]
    domain: Vec<BoostEntry>,
}

#[derive(Debug, Deserialize)]
struct BoostEntry {
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    suffix: Option<String>,
    boost: f64,
}

/// Loads the domain boost table from a TOML file
///
/// Entries carry either a `host` (exact match, covers subdomains) or a
/// `suffix` (e.g. `.edu`) plus a `boost` multiplier. Entries with neither
/// are rejected.
pub fn load_domain_boosts(path: &Path) -> Result<DomainBoosts, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let parsed: BoostFile = toml::from_str(&content)?;

    let mut boosts = DomainBoosts::default_table();
    for entry in parsed.domain {
        match (&entry.host, &entry.suffix) {
            (Some(host), _) => boosts.insert_exact(host, entry.boost),
            (None, Some(suffix)) => boosts.insert_suffix(suffix, entry.boost),
            (None, None) => {
                return Err(ConfigError::Validation(
                    "domain boost entry needs a host or a suffix".to_string(),
                ))
            }
        }
    }
    Ok(boosts)
}

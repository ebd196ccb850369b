use crate::config::types::Config;
use crate::ConfigError;

/// Validates a parsed configuration
///
/// Checks ranges and cross-field consistency that the type system cannot
/// express. Returns the first violation found.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let crawler = &config.crawler;

    if crawler.max_in_flight == 0 {
        return Err(ConfigError::Validation(
            "max-in-flight must be at least 1".to_string(),
        ));
    }

    if crawler.frontier_max_size == 0 {
        return Err(ConfigError::Validation(
            "frontier-max-size must be at least 1".to_string(),
        ));
    }

    if crawler.frontier_partitions == 0 {
        return Err(ConfigError::Validation(
            "frontier-partitions must be at least 1".to_string(),
        ));
    }

    if crawler.frontier_partitions > crawler.frontier_max_size {
        return Err(ConfigError::Validation(format!(
            "frontier-partitions ({}) exceeds frontier-max-size ({})",
            crawler.frontier_partitions, crawler.frontier_max_size
        )));
    }

    if crawler.min_request_gap_ms == 0 {
        return Err(ConfigError::Validation(
            "min-request-gap-ms must be at least 1".to_string(),
        ));
    }

    let ua = &config.user_agent;
    if ua.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-name must not be empty".to_string(),
        ));
    }
    if !ua.contact_url.starts_with("http://") && !ua.contact_url.starts_with("https://") {
        return Err(ConfigError::InvalidUrl(ua.contact_url.clone()));
    }
    if !ua.contact_email.contains('@') {
        return Err(ConfigError::Validation(format!(
            "contact-email does not look like an email address: {}",
            ua.contact_email
        )));
    }

    if config.paths.work_dir.is_empty() {
        return Err(ConfigError::Validation(
            "work-dir must not be empty".to_string(),
        ));
    }
    if config.paths.seeds.is_empty() {
        return Err(ConfigError::Validation(
            "seeds path must not be empty".to_string(),
        ));
    }

    if config.limits.batch_size == 0 {
        return Err(ConfigError::Validation(
            "batch-size must be at least 1".to_string(),
        ));
    }
    if config.limits.html_queue_capacity == 0 {
        return Err(ConfigError::Validation(
            "html-queue-capacity must be at least 1".to_string(),
        ));
    }

    Ok(())
}

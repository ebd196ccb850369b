use crate::config::UserAgentConfig;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;

/// Connect timeout applied to every request
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total per-request timeout
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(12);

/// Maximum redirect hops followed
pub const MAX_REDIRECTS: usize = 3;

/// Builds the crawler's User-Agent string
///
/// Format: `CrawlerName/Version (+ContactURL; ContactEmail)` so site
/// operators can identify and reach us.
pub fn user_agent_string(config: &UserAgentConfig) -> String {
    format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    )
}

/// Builds one worker's HTTP client
///
/// Each fetch worker owns exactly one client; connection pooling, DNS and
/// TLS session caches are shared across that worker's in-flight requests
/// and never across workers. HTTP/2 is negotiated where the server offers
/// it, compressed transfer is accepted, and redirects are capped.
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent_string(config))
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .deflate(true)
        .brotli(true)
        .tcp_nodelay(true)
        .tcp_keepalive(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> UserAgentConfig {
        UserAgentConfig {
            crawler_name: "TestTrawler".to_string(),
            crawler_version: "0.3".to_string(),
            contact_url: "https://example.com/bot".to_string(),
            contact_email: "bot@example.com".to_string(),
        }
    }

    #[test]
    fn test_user_agent_format() {
        let ua = user_agent_string(&create_test_config());
        assert_eq!(
            ua,
            "TestTrawler/0.3 (+https://example.com/bot; bot@example.com)"
        );
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(&create_test_config()).is_ok());
    }
}

//! robots.txt rule evaluation
//!
//! Allow/disallow matching is delegated to the robotstxt crate's
//! `DefaultMatcher`; Crawl-delay is not exposed by that crate, so it is
//! extracted here with a small group-aware scan.

use robotstxt::DefaultMatcher;

/// Parsed robots.txt rules for one domain
///
/// An empty content string (or an explicit allow-all, used as the
/// permissive default when the fetch fails) allows every path.
#[derive(Debug, Clone)]
pub struct RobotRules {
    content: String,
    allow_all: bool,
    crawl_delay_secs: Option<f64>,
}

impl RobotRules {
    /// Parses rules from raw robots.txt content
    ///
    /// # Arguments
    ///
    /// * `content` - The raw robots.txt body
    /// * `user_agent` - The crawler's user agent token, used to select the
    ///   Crawl-delay group
    pub fn from_content(content: &str, user_agent: &str) -> Self {
        Self {
            crawl_delay_secs: parse_crawl_delay(content, user_agent),
            content: content.to_string(),
            allow_all: false,
        }
    }

    /// Permissive rules used when robots.txt cannot be fetched
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
            crawl_delay_secs: None,
        }
    }

    /// Checks whether a path is allowed for the given user agent
    pub fn is_allowed(&self, path: &str, user_agent: &str) -> bool {
        if self.allow_all || self.content.is_empty() {
            return true;
        }
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, path)
    }

    /// The Crawl-delay declared for our user agent, in seconds
    pub fn crawl_delay_secs(&self) -> Option<f64> {
        self.crawl_delay_secs
    }
}

/// Extracts the Crawl-delay for a user agent from robots.txt content
///
/// Groups open with one or more `User-agent:` lines; a delay in a group
/// naming our agent wins over one in the wildcard group.
fn parse_crawl_delay(content: &str, user_agent: &str) -> Option<f64> {
    let ua_lower = user_agent.to_lowercase();
    let mut group_agents: Vec<String> = Vec::new();
    let mut in_group_header = true;
    let mut wildcard_delay: Option<f64> = None;
    let mut specific_delay: Option<f64> = None;

    for raw_line in content.lines() {
        // Strip comments and whitespace
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let field = field.trim().to_lowercase();
        let value = value.trim();

        match field.as_str() {
            "user-agent" => {
                if !in_group_header {
                    group_agents.clear();
                    in_group_header = true;
                }
                group_agents.push(value.to_lowercase());
            }
            "crawl-delay" => {
                in_group_header = false;
                if let Ok(delay) = value.parse::<f64>() {
                    for agent in &group_agents {
                        if agent == "*" {
                            wildcard_delay.get_or_insert(delay);
                        } else if ua_lower.contains(agent.as_str()) {
                            specific_delay.get_or_insert(delay);
                        }
                    }
                }
            }
            _ => {
                in_group_header = false;
            }
        }
    }

    specific_delay.or(wildcard_delay)
}

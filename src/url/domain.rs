use std::collections::HashMap;
use url::Url;

/// Extracts the host from a URL in lowercase
///
/// # Examples
///
/// ```
/// use url::Url;
/// use trawler::url::extract_domain;
///
/// let url = Url::parse("https://Blog.Example.com/post").unwrap();
/// assert_eq!(extract_domain(&url), Some("blog.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Table-driven priority multipliers for domains
///
/// Boosts come from two sources: exact host entries (trusted reference
/// sites) and suffix entries (educational/government TLDs). Exact matches
/// win over suffix matches; unlisted domains get a neutral 1.0.
#[derive(Debug, Clone)]
pub struct DomainBoosts {
    exact: HashMap<String, f64>,
    suffixes: Vec<(String, f64)>,
}

impl DomainBoosts {
    /// Creates an empty table (every domain boosts to 1.0)
    pub fn new() -> Self {
        Self {
            exact: HashMap::new(),
            suffixes: Vec::new(),
        }
    }

    /// Creates the built-in default table
    pub fn default_table() -> Self {
        let mut boosts = Self::new();
        boosts.insert_exact("wikipedia.org", 1.5);
        boosts.insert_exact("en.wikipedia.org", 1.5);
        boosts.insert_suffix(".edu", 1.3);
        boosts.insert_suffix(".gov", 1.3);
        boosts.insert_suffix(".org", 1.1);
        boosts
    }

    /// Adds or replaces an exact-host entry
    pub fn insert_exact(&mut self, domain: &str, boost: f64) {
        self.exact.insert(domain.to_lowercase(), boost);
    }

    /// Adds a suffix entry (e.g. `.edu`)
    pub fn insert_suffix(&mut self, suffix: &str, boost: f64) {
        self.suffixes.push((suffix.to_lowercase(), boost));
    }

    /// Looks up the boost for a domain
    ///
    /// Exact entries take precedence; otherwise the first matching suffix
    /// wins; otherwise 1.0.
    pub fn boost_for(&self, domain: &str) -> f64 {
        if let Some(boost) = self.exact.get(domain) {
            return *boost;
        }
        // An exact entry also covers its subdomains
        for (host, boost) in &self.exact {
            if domain.ends_with(&format!(".{}", host)) {
                return *boost;
            }
        }
        for (suffix, boost) in &self.suffixes {
            if domain.ends_with(suffix.as_str()) {
                return *boost;
            }
        }
        1.0
    }
}

impl Default for DomainBoosts {
    fn default() -> Self {
        Self::new()
    }
}

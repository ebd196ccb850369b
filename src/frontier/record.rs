use crate::url::DomainBoosts;
use chrono::{DateTime, Utc};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Penalty subtracted from the base priority per level of depth
pub const DEPTH_PENALTY: f64 = 0.1;

/// Lower clamp for computed priorities
pub const MIN_PRIORITY: f64 = 0.1;

/// Upper clamp for computed priorities (before the domain boost)
pub const MAX_PRIORITY: f64 = 1.0;

/// A canonical URL queued for fetching
///
/// Records are created at discovery, owned by whichever queue currently
/// holds them, and consumed exactly once by a fetch worker.
#[derive(Debug, Clone)]
pub struct UrlRecord {
    /// Canonical URL string
    pub url: String,

    /// Priority, higher is fetched sooner
    pub priority: f64,

    /// Link distance from the seed set
    pub depth: u32,

    /// Host of the page that discovered this URL (empty for seeds)
    pub referring_domain: String,

    /// When the URL was discovered
    pub discovered_at: DateTime<Utc>,
}

impl UrlRecord {
    /// Creates a record with a priority computed from depth and domain boost
    pub fn new(url: String, domain: &str, depth: u32, referring_domain: &str, boosts: &DomainBoosts) -> Self {
        Self {
            priority: compute_priority(depth, boosts.boost_for(domain)),
            url,
            depth,
            referring_domain: referring_domain.to_string(),
            discovered_at: Utc::now(),
        }
    }

    /// Creates a depth-zero seed record at maximum priority
    pub fn seed(url: String) -> Self {
        Self {
            url,
            priority: MAX_PRIORITY,
            depth: 0,
            referring_domain: String::new(),
            discovered_at: Utc::now(),
        }
    }
}

/// Computes the frontier priority for a URL
///
/// `clamp(1.0 − depth·DEPTH_PENALTY, MIN_PRIORITY, MAX_PRIORITY) × boost`.
/// Deeper pages sink, boosted domains float; ties are broken by the frontier
/// ordering (lower depth first, then insertion order).
pub fn compute_priority(depth: u32, domain_boost: f64) -> f64 {
    let base = (1.0 - f64::from(depth) * DEPTH_PENALTY).clamp(MIN_PRIORITY, MAX_PRIORITY);
    base * domain_boost
}

/// Stable dedup key for a canonical URL string
pub fn url_key(url: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_decreases_with_depth() {
        let p0 = compute_priority(0, 1.0);
        let p3 = compute_priority(3, 1.0);
        assert!(p0 > p3);
        assert_eq!(p0, 1.0);
        assert!((p3 - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_priority_clamped_at_min() {
        // Depth 20 would go negative without the clamp
        assert_eq!(compute_priority(20, 1.0), MIN_PRIORITY);
    }

    #[test]
    fn test_boost_multiplies() {
        assert!((compute_priority(0, 1.5) - 1.5).abs() < 1e-9);
        assert!((compute_priority(2, 1.3) - 0.8 * 1.3).abs() < 1e-9);
    }

    #[test]
    fn test_seed_record() {
        let rec = UrlRecord::seed("https://a.test/".to_string());
        assert_eq!(rec.depth, 0);
        assert_eq!(rec.priority, MAX_PRIORITY);
        assert!(rec.referring_domain.is_empty());
    }

    #[test]
    fn test_url_key_stable() {
        assert_eq!(url_key("https://a.test/x"), url_key("https://a.test/x"));
        assert_ne!(url_key("https://a.test/x"), url_key("https://a.test/y"));
    }
}

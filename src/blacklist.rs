//! Domain blacklisting
//!
//! Two layers: a permanent list loaded from the blacklist file (one domain
//! per line, `#` comments) and a temporary layer fed by the fetchers'
//! consecutive-failure accounting. Temporary entries expire on their own.

use dashmap::DashMap;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Default lifetime of a temporary blacklist entry
pub const TEMP_BLACKLIST_TTL: Duration = Duration::from_secs(600);

/// Permanent + temporary domain blacklist
pub struct DomainBlacklist {
    permanent: HashSet<String>,
    temporary: DashMap<String, Instant>,
    ttl: Duration,
}

impl DomainBlacklist {
    /// Creates a blacklist from permanently banned domains
    pub fn new<I, S>(permanent: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            permanent: permanent
                .into_iter()
                .map(|d| d.as_ref().trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
            temporary: DashMap::new(),
            ttl: TEMP_BLACKLIST_TTL,
        }
    }

    /// Creates an empty blacklist with a custom temporary TTL
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            permanent: HashSet::new(),
            temporary: DashMap::new(),
            ttl,
        }
    }

    /// Whether a domain (or any parent domain on the list) is blocked
    pub fn is_blacklisted(&self, domain: &str) -> bool {
        let domain = domain.to_lowercase();

        if self.matches_permanent(&domain) {
            return true;
        }

        if let Some(expiry) = self.temporary.get(&domain) {
            if expiry.value() > &Instant::now() {
                return true;
            }
        }
        false
    }

    fn matches_permanent(&self, domain: &str) -> bool {
        if self.permanent.contains(domain) {
            return true;
        }
        // A listed domain covers its subdomains
        let mut rest = domain;
        while let Some(idx) = rest.find('.') {
            rest = &rest[idx + 1..];
            if self.permanent.contains(rest) {
                return true;
            }
        }
        false
    }

    /// Temporarily blacklists a failing domain
    pub fn add_temporary(&self, domain: &str) {
        tracing::warn!(domain, "temporarily blacklisting failing domain");
        self.temporary
            .insert(domain.to_lowercase(), Instant::now() + self.ttl);
    }

    /// Drops expired temporary entries
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.temporary.retain(|_, expiry| *expiry > now);
    }

    /// Number of permanent entries
    pub fn permanent_len(&self) -> usize {
        self.permanent.len()
    }

    /// Number of live temporary entries
    pub fn temporary_len(&self) -> usize {
        let now = Instant::now();
        self.temporary.iter().filter(|e| e.value() > &now).count()
    }
}

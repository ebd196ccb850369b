use crate::frontier::UrlRecord;
use crate::robots::RobotRules;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::Duration;

/// Lifecycle of a domain's robots.txt knowledge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotsState {
    /// Nothing known yet
    Unknown,
    /// A robots.txt fetch is in flight
    Fetching,
    /// Rules are loaded and queryable
    Ready,
    /// The fetch failed; the permissive default applies
    Failed,
}

/// Cached robots data for one domain
#[derive(Debug, Clone)]
pub struct RobotsRecord {
    pub rules: RobotRules,
    pub fetched_at: Option<DateTime<Utc>>,
    pub state: RobotsState,
}

impl RobotsRecord {
    fn fetching() -> Self {
        Self {
            rules: RobotRules::allow_all(),
            fetched_at: None,
            state: RobotsState::Fetching,
        }
    }

    /// Whether the cached rules are older than 24 hours
    pub fn is_stale(&self) -> bool {
        match self.fetched_at {
            Some(at) => Utc::now() - at > chrono::Duration::hours(24),
            None => true,
        }
    }
}

/// Outcome of a robots query
#[derive(Debug, PartialEq, Eq)]
pub enum RobotsDecision {
    /// The path may be fetched
    Allowed,
    /// robots.txt forbids this path
    Disallowed,
    /// Rules are not loaded yet; the URL must wait on the deferred list.
    /// `fetch_needed` is true for exactly one caller per domain, which must
    /// submit the robots.txt request.
    Deferred { fetch_needed: bool },
}

/// Thread-safe robots gate with the deferred-fetch protocol
///
/// The first query against an unknown domain flips the record to FETCHING
/// and tells that caller (alone) to emit a robots.txt request; concurrent
/// queriers only append their URLs to the domain's deferred list. When the
/// fetch completes (or fails, yielding the permissive default) the deferred
/// URLs are handed back for re-enqueue.
pub struct RobotsGate {
    records: DashMap<String, RobotsRecord>,
    deferred: DashMap<String, Vec<UrlRecord>>,
    user_agent: String,
}

impl RobotsGate {
    /// Creates a gate evaluating rules for the given user agent token
    pub fn new(user_agent: &str) -> Self {
        Self {
            records: DashMap::new(),
            deferred: DashMap::new(),
            user_agent: user_agent.to_string(),
        }
    }

    /// Queries whether `path` on `domain` may be fetched
    pub fn check(&self, domain: &str, path: &str) -> RobotsDecision {
        let mut entry = self
            .records
            .entry(domain.to_string())
            .or_insert_with(|| RobotsRecord {
                rules: RobotRules::allow_all(),
                fetched_at: None,
                state: RobotsState::Unknown,
            });

        match entry.state {
            RobotsState::Ready => {
                if entry.rules.is_allowed(path, &self.user_agent) {
                    RobotsDecision::Allowed
                } else {
                    RobotsDecision::Disallowed
                }
            }
            // Liveness over strictness when the fetch failed
            RobotsState::Failed => RobotsDecision::Allowed,
            RobotsState::Fetching => RobotsDecision::Deferred { fetch_needed: false },
            RobotsState::Unknown => {
                *entry = RobotsRecord::fetching();
                RobotsDecision::Deferred { fetch_needed: true }
            }
        }
    }

    /// Parks a URL behind the domain's in-flight robots fetch
    pub fn defer(&self, domain: &str, record: UrlRecord) {
        self.deferred.entry(domain.to_string()).or_default().push(record);
    }

    /// Stores the outcome of a robots.txt fetch and releases deferred URLs
    ///
    /// `body` of `None` marks the fetch failed and installs the permissive
    /// default. Returns every URL that queued up behind the fetch.
    pub fn store_result(&self, domain: &str, body: Option<&str>) -> Vec<UrlRecord> {
        let record = match body {
            Some(content) => RobotsRecord {
                rules: RobotRules::from_content(content, &self.user_agent),
                fetched_at: Some(Utc::now()),
                state: RobotsState::Ready,
            },
            None => RobotsRecord {
                rules: RobotRules::allow_all(),
                fetched_at: Some(Utc::now()),
                state: RobotsState::Failed,
            },
        };
        self.records.insert(domain.to_string(), record);

        self.deferred
            .remove(domain)
            .map(|(_, urls)| urls)
            .unwrap_or_default()
    }

    /// Crawl-delay declared by a READY domain, if any
    pub fn crawl_delay(&self, domain: &str) -> Option<Duration> {
        let record = self.records.get(domain)?;
        if record.state != RobotsState::Ready {
            return None;
        }
        record
            .rules
            .crawl_delay_secs()
            .map(Duration::from_secs_f64)
    }

    /// Current state of a domain's record
    pub fn state(&self, domain: &str) -> RobotsState {
        self.records
            .get(domain)
            .map(|r| r.state)
            .unwrap_or(RobotsState::Unknown)
    }

    /// URLs currently parked behind robots fetches
    pub fn deferred_len(&self) -> usize {
        self.deferred.iter().map(|e| e.value().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(url: &str) -> UrlRecord {
        UrlRecord::seed(url.to_string())
    }

    #[test]
    fn test_unknown_domain_defers_with_single_fetch() {
        let gate = RobotsGate::new("TestBot");

        // First caller triggers the fetch
        assert_eq!(
            gate.check("a.test", "/x"),
            RobotsDecision::Deferred { fetch_needed: true }
        );
        // Everyone after queues without fetching
        assert_eq!(
            gate.check("a.test", "/y"),
            RobotsDecision::Deferred { fetch_needed: false }
        );
        assert_eq!(
            gate.check("a.test", "/z"),
            RobotsDecision::Deferred { fetch_needed: false }
        );
        assert_eq!(gate.state("a.test"), RobotsState::Fetching);
    }

    #[test]
    fn test_store_result_releases_deferred() {
        let gate = RobotsGate::new("TestBot");
        gate.check("a.test", "/x");
        gate.defer("a.test", rec("https://a.test/x"));
        gate.defer("a.test", rec("https://a.test/y"));
        assert_eq!(gate.deferred_len(), 2);

        let released = gate.store_result("a.test", Some("User-agent: *\nAllow: /"));
        assert_eq!(released.len(), 2);
        assert_eq!(gate.deferred_len(), 0);
        assert_eq!(gate.state("a.test"), RobotsState::Ready);
    }

    #[test]
    fn test_ready_rules_are_queried() {
        let gate = RobotsGate::new("TestBot");
        gate.check("f.test", "/private/x");
        gate.store_result("f.test", Some("User-agent: *\nDisallow: /private/"));

        assert_eq!(gate.check("f.test", "/private/x"), RobotsDecision::Disallowed);
        assert_eq!(gate.check("f.test", "/public/"), RobotsDecision::Allowed);
    }

    #[test]
    fn test_failed_fetch_is_permissive() {
        let gate = RobotsGate::new("TestBot");
        gate.check("a.test", "/x");
        let released = gate.store_result("a.test", None);
        assert!(released.is_empty());

        assert_eq!(gate.state("a.test"), RobotsState::Failed);
        assert_eq!(gate.check("a.test", "/anything"), RobotsDecision::Allowed);
    }

    #[test]
    fn test_concurrent_unknown_fetch_is_exactly_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let gate = Arc::new(RobotsGate::new("TestBot"));
        let fetches = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let gate = gate.clone();
                let fetches = fetches.clone();
                std::thread::spawn(move || {
                    let url = format!("https://a.test/{}", i);
                    match gate.check("a.test", &format!("/{}", i)) {
                        RobotsDecision::Deferred { fetch_needed } => {
                            gate.defer("a.test", rec(&url));
                            if fetch_needed {
                                fetches.fetch_add(1, Ordering::SeqCst);
                            }
                        }
                        _ => panic!("expected deferral"),
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        let released = gate.store_result("a.test", Some("User-agent: *\nAllow: /"));
        assert_eq!(released.len(), 8);
    }

    #[test]
    fn test_crawl_delay_only_when_ready() {
        let gate = RobotsGate::new("TestBot");
        assert!(gate.crawl_delay("a.test").is_none());

        gate.check("a.test", "/");
        gate.store_result("a.test", Some("User-agent: *\nCrawl-delay: 2"));
        assert_eq!(gate.crawl_delay("a.test"), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_staleness() {
        let record = RobotsRecord {
            rules: RobotRules::allow_all(),
            fetched_at: Some(Utc::now() - chrono::Duration::hours(25)),
            state: RobotsState::Ready,
        };
        assert!(record.is_stale());

        let fresh = RobotsRecord {
            rules: RobotRules::allow_all(),
            fetched_at: Some(Utc::now()),
            state: RobotsState::Ready,
        };
        assert!(!fresh.is_stale());
    }
}

//! Per-domain request spacing
//!
//! A lock-free, sharded limiter: each domain hashes to one of 256 shards
//! holding a last-request timestamp and a consecutive-failure count, both
//! plain atomics. Two domains only interact if they collide into the same
//! shard, and even then only through relaxed atomic traffic.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Number of limiter shards
pub const NUM_SHARDS: usize = 256;

/// Base adaptive backoff added per failing domain, in milliseconds
const BACKOFF_BASE_MS: u64 = 2;

/// Cap on the adaptive backoff, in milliseconds
const BACKOFF_CAP_MS: u64 = 20;

/// Timestamp sentinel for "never requested"
const NEVER: u64 = 0;

struct Shard {
    /// Nanoseconds since the limiter's epoch of the most recent request.
    /// A throttle pushes this into the future.
    last_request_ns: AtomicU64,
    consecutive_failures: AtomicU32,
}

/// Sharded per-domain rate limiter
pub struct RateLimiter {
    shards: Vec<Shard>,
    min_gap: Duration,
    epoch: Instant,
}

impl RateLimiter {
    /// Creates a limiter with the given minimum inter-request gap
    pub fn new(min_gap: Duration) -> Self {
        Self {
            shards: (0..NUM_SHARDS)
                .map(|_| Shard {
                    last_request_ns: AtomicU64::new(NEVER),
                    consecutive_failures: AtomicU32::new(0),
                })
                .collect(),
            min_gap,
            epoch: Instant::now(),
        }
    }

    fn now_ns(&self) -> u64 {
        // The +1 keeps a request in the very first nanosecond distinguishable
        // from the NEVER sentinel.
        self.epoch.elapsed().as_nanos() as u64 + 1
    }

    fn shard(&self, domain: &str) -> &Shard {
        let key = crate::frontier::url_key(domain);
        &self.shards[(key % NUM_SHARDS as u64) as usize]
    }

    /// Configured minimum gap
    pub fn min_gap(&self) -> Duration {
        self.min_gap
    }

    /// Adaptive backoff for a failure count: 2 ms doubling up to 20 ms
    fn backoff_ns(failures: u32) -> u64 {
        if failures == 0 {
            return 0;
        }
        let ms = (BACKOFF_BASE_MS << (failures - 1).min(4)).min(BACKOFF_CAP_MS);
        ms * 1_000_000
    }

    /// Whether the domain is past its spacing window
    pub fn can_request_now(&self, domain: &str) -> bool {
        self.can_request_with_gap(domain, self.min_gap)
    }

    /// Like [`can_request_now`] but with a caller-supplied gap
    ///
    /// Used when robots.txt declares a crawl-delay longer than the
    /// configured minimum.
    ///
    /// [`can_request_now`]: Self::can_request_now
    pub fn can_request_with_gap(&self, domain: &str, gap: Duration) -> bool {
        let shard = self.shard(domain);
        let last = shard.last_request_ns.load(Ordering::Relaxed);
        if last == NEVER {
            return true;
        }

        let failures = shard.consecutive_failures.load(Ordering::Relaxed);
        let required = gap.as_nanos() as u64 + Self::backoff_ns(failures);
        self.now_ns().saturating_sub(last) >= required
    }

    /// Atomically claims the domain's window for one request
    ///
    /// The check and the timestamp write are a single CAS, so two workers
    /// racing on the same domain cannot both pass: exactly one wins the
    /// window, the other parks its URL. A concurrent throttle writing a
    /// future timestamp makes the CAS fail and the retry observe it.
    pub fn try_acquire(&self, domain: &str, gap: Duration) -> bool {
        let shard = self.shard(domain);
        let failures = shard.consecutive_failures.load(Ordering::Relaxed);
        let required = gap.as_nanos() as u64 + Self::backoff_ns(failures);

        loop {
            let last = shard.last_request_ns.load(Ordering::Relaxed);
            let now = self.now_ns();
            if last != NEVER && now.saturating_sub(last) < required {
                return false;
            }
            match shard.last_request_ns.compare_exchange(
                last,
                now,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(_) => continue,
            }
        }
    }

    /// Records that a request was just dispatched to the domain
    ///
    /// `fetch_max` keeps a concurrent throttle (which writes a future
    /// timestamp) from being clobbered by an in-flight dispatch.
    pub fn record_request(&self, domain: &str) {
        let now = self.now_ns();
        self.shard(domain)
            .last_request_ns
            .fetch_max(now, Ordering::Relaxed);
    }

    /// Records a transport failure; returns the new consecutive count
    pub fn record_failure(&self, domain: &str) -> u32 {
        self.shard(domain)
            .consecutive_failures
            .fetch_add(1, Ordering::Relaxed)
            + 1
    }

    /// Clears the failure streak after a successful response
    pub fn record_success(&self, domain: &str) {
        self.shard(domain)
            .consecutive_failures
            .store(0, Ordering::Relaxed);
    }

    /// Pushes the domain's window `secs` seconds into the future (429/503)
    pub fn throttle_domain(&self, domain: &str, secs: u64) {
        let until = self.now_ns() + secs * 1_000_000_000;
        self.shard(domain)
            .last_request_ns
            .fetch_max(until, Ordering::Relaxed);
    }

    /// Current consecutive-failure count for a domain
    pub fn failures(&self, domain: &str) -> u32 {
        self.shard(domain).consecutive_failures.load(Ordering::Relaxed)
    }
}

//! Fetch worker
//!
//! Each worker drives one completion multiplexer holding up to
//! `max_in_flight` concurrent requests over its own HTTP client. The loop
//! alternates between topping up the multiplexer from the URL sources
//! (ready domain queues, then the frontier, then its own deque, then
//! stealing, then disk in REGULAR mode) and draining completions in the
//! order the multiplexer reports them.

use crate::blacklist::DomainBlacklist;
use crate::config::CrawlMode;
use crate::engine::StopFlag;
use crate::fetch::{
    execute_page_request, execute_robots_request, FetchCompletion, FetchOutcome, RequestContext,
    RequestTag, TransportKind,
};
use crate::frontier::{DiskSpill, DomainQueues, Frontier, UrlRecord, WorkStealingDeques};
use crate::limiter::RateLimiter;
use crate::meta::{CacheInfo, MetadataStore};
use crate::monitor::CrawlMetrics;
use crate::pipeline::{check_quality, hash_text, relevant_text, HtmlProcessor, HtmlQueue, HtmlTask};
use crate::robots::{RobotsDecision, RobotsGate};
use crate::url::extract_domain;
use chrono::Utc;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// Sleep when no URL source has work
const IDLE_SLEEP: Duration = Duration::from_millis(50);

/// Bounded wait on the multiplexer before re-checking sources and stop flag
const COMPLETION_WAIT: Duration = Duration::from_millis(100);

/// How long in-flight requests may run after a stop is requested
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// URLs pulled per disk-spill refill
const DISK_LOAD_BATCH: usize = 50;

type InFlight = FuturesUnordered<BoxFuture<'static, FetchCompletion>>;

/// Shared handles a fetch worker operates on
pub struct FetchContext {
    pub frontier: Arc<Frontier>,
    pub deques: Arc<WorkStealingDeques>,
    pub domain_queues: Arc<DomainQueues>,
    pub spill: Option<Arc<DiskSpill>>,
    pub limiter: Arc<RateLimiter>,
    pub robots: Arc<RobotsGate>,
    pub blacklist: Arc<DomainBlacklist>,
    pub meta: Arc<dyn MetadataStore>,
    pub html_queue: Arc<HtmlQueue>,
    pub processor: Arc<HtmlProcessor>,
    pub metrics: Arc<CrawlMetrics>,
    pub stop: Arc<StopFlag>,
    pub mode: CrawlMode,
    pub max_in_flight: usize,
    pub max_body_bytes: usize,
    pub min_text_chars: usize,
    pub throttle_seconds: u64,
    pub failure_blacklist_threshold: u32,
}

/// Worker loop; returns when stopped (after the in-flight grace)
pub async fn run_fetch_worker(id: usize, ctx: Arc<FetchContext>, client: Client) {
    tracing::debug!(worker = id, "fetch worker started");
    let mut in_flight: InFlight = FuturesUnordered::new();
    let mut stopping_since: Option<Instant> = None;

    loop {
        if ctx.stop.is_set() && stopping_since.is_none() {
            stopping_since = Some(Instant::now());
            tracing::debug!(worker = id, in_flight = in_flight.len(), "draining in-flight requests");
        }

        // Top up the multiplexer while we are not shutting down
        if stopping_since.is_none() {
            while in_flight.len() < ctx.max_in_flight {
                match acquire_url(id, &ctx) {
                    Some(record) => submit_url(id, &ctx, &client, record, &mut in_flight),
                    None => break,
                }
            }
        }

        if in_flight.is_empty() {
            if stopping_since.is_some() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(IDLE_SLEEP) => {}
                _ = ctx.stop.wait() => {}
            }
            continue;
        }

        if let Some(since) = stopping_since {
            if since.elapsed() >= SHUTDOWN_GRACE {
                tracing::warn!(
                    worker = id,
                    abandoned = in_flight.len(),
                    "grace period over, abandoning in-flight requests"
                );
                break;
            }
        }

        tokio::select! {
            completion = in_flight.next() => {
                if let Some(completion) = completion {
                    handle_completion(id, &ctx, &client, completion, &mut in_flight);
                }
            }
            _ = tokio::time::sleep(COMPLETION_WAIT) => {}
        }
    }
    tracing::debug!(worker = id, "fetch worker exiting");
}

/// Pulls the next URL, trying sources in preference order
fn acquire_url(id: usize, ctx: &FetchContext) -> Option<UrlRecord> {
    // 1. A domain whose rate-limit window has reopened
    if let Some((_, record)) = ctx
        .domain_queues
        .pop_ready(|domain| ctx.limiter.can_request_now(domain))
    {
        return Some(record);
    }

    // 2. The main frontier
    if let Some(record) = ctx.frontier.dequeue() {
        return Some(record);
    }

    // 3. Our own overflow
    if let Some(record) = ctx.deques.pop_local(id) {
        return Some(record);
    }

    // 4. Someone else's overflow
    if let Some(record) = ctx.deques.try_steal(id) {
        return Some(record);
    }

    // 5. Disk spill (REGULAR only): refill through the frontier so the
    //    seen-set still vets every reloaded URL
    if let Some(spill) = &ctx.spill {
        match spill.load_urls(DISK_LOAD_BATCH) {
            Ok(batch) if !batch.is_empty() => {
                let residual = ctx.frontier.enqueue_batch(batch);
                for record in residual {
                    overflow_record(id, ctx, record);
                }
                return ctx.frontier.dequeue();
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "disk spill load failed"),
        }
    }

    None
}

/// Routes a record that found no in-memory home
fn overflow_record(id: usize, ctx: &FetchContext, record: UrlRecord) {
    let Err(record) = ctx.deques.push_local(id, record) else {
        return;
    };
    match &ctx.spill {
        Some(spill) => match spill.save_urls(std::slice::from_ref(&record)) {
            Ok(n) => CrawlMetrics::add(&ctx.metrics.spilled_to_disk, n as u64),
            Err(e) => tracing::error!(error = %e, url = %record.url, "failed to spill URL"),
        },
        None => {
            tracing::debug!(url = %record.url, "dropped overflow URL");
            CrawlMetrics::incr(&ctx.metrics.tasks_dropped);
        }
    }
}

/// Gates one URL (blacklist → robots → rate limit) and submits it
fn submit_url(id: usize, ctx: &FetchContext, client: &Client, record: UrlRecord, in_flight: &mut InFlight) {
    let Ok(parsed) = Url::parse(&record.url) else {
        tracing::debug!(url = %record.url, "unparseable URL reached the fetcher");
        return;
    };
    let Some(domain) = extract_domain(&parsed) else {
        return;
    };

    if ctx.blacklist.is_blacklisted(&domain) {
        tracing::trace!(url = %record.url, "skipping blacklisted domain");
        return;
    }

    let path = match parsed.query() {
        Some(query) => format!("{}?{}", parsed.path(), query),
        None => parsed.path().to_string(),
    };
    match ctx.robots.check(&domain, &path) {
        RobotsDecision::Disallowed => {
            CrawlMetrics::incr(&ctx.metrics.robots_denied);
            return;
        }
        RobotsDecision::Deferred { fetch_needed } => {
            ctx.robots.defer(&domain, record);
            if fetch_needed {
                CrawlMetrics::incr(&ctx.metrics.robots_fetches);
                let origin = parsed.origin().ascii_serialization();
                let robots_ctx = RequestContext::robots(domain.clone(), &origin);
                ctx.limiter.record_request(&domain);
                in_flight.push(Box::pin(execute_robots_request(
                    client.clone(),
                    robots_ctx,
                )));
            }
            return;
        }
        RobotsDecision::Allowed => {}
    }

    // Honor a robots crawl-delay when it is stricter than our own gap.
    // try_acquire both checks and claims the window in one CAS, so two
    // workers racing on a domain cannot both dispatch inside the gap.
    let gap = ctx
        .robots
        .crawl_delay(&domain)
        .map(|delay| delay.max(ctx.limiter.min_gap()))
        .unwrap_or_else(|| ctx.limiter.min_gap());
    if !ctx.limiter.try_acquire(&domain, gap) {
        if let Err(record) = ctx.domain_queues.park(&domain, record) {
            overflow_record(id, ctx, record);
        }
        return;
    }

    let cache_info = ctx.meta.cache_info(&record.url).unwrap_or_else(|e| {
        tracing::warn!(error = %e, url = %record.url, "metadata lookup failed");
        CacheInfo::default()
    });

    let request_ctx = RequestContext::page(record, domain.clone());
    in_flight.push(Box::pin(execute_page_request(
        client.clone(),
        request_ctx,
        cache_info,
        ctx.max_body_bytes,
    )));
}

/// Handles one completion in multiplexer-reported order
fn handle_completion(
    id: usize,
    ctx: &FetchContext,
    client: &Client,
    completion: FetchCompletion,
    in_flight: &mut InFlight,
) {
    let FetchCompletion { ctx: request, outcome } = completion;

    match request.tag {
        RequestTag::RobotsTxt => handle_robots_completion(id, ctx, request, outcome),
        RequestTag::Page => match outcome {
            FetchOutcome::Transport { kind, error } => {
                handle_transport_failure(ctx, client, request, kind, error, in_flight)
            }
            FetchOutcome::Response {
                status,
                etag,
                last_modified,
                retry_after_secs,
                body,
                body_bytes,
            } => handle_page_response(
                ctx,
                request,
                status,
                etag,
                last_modified,
                retry_after_secs,
                body,
                body_bytes,
            ),
        },
    }
}

/// Stores fetched robots rules and re-enqueues the deferred URLs
fn handle_robots_completion(
    id: usize,
    ctx: &FetchContext,
    request: RequestContext,
    outcome: FetchOutcome,
) {
    let body = match &outcome {
        FetchOutcome::Response {
            status,
            body: Some(body),
            ..
        } if *status == StatusCode::OK => Some(body.as_str()),
        _ => None,
    };
    if body.is_none() {
        tracing::debug!(domain = %request.domain, "robots.txt fetch failed, default is permissive");
    }

    let released = ctx.robots.store_result(&request.domain, body);
    tracing::trace!(
        domain = %request.domain,
        released = released.len(),
        "robots rules stored"
    );
    // The deque head is LIFO; reverse so deferral order survives the re-enqueue
    for record in released.into_iter().rev() {
        overflow_record(id, ctx, record);
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_page_response(
    ctx: &FetchContext,
    request: RequestContext,
    status: StatusCode,
    etag: Option<String>,
    last_modified: Option<String>,
    retry_after_secs: Option<u64>,
    body: Option<String>,
    body_bytes: u64,
) {
    // Metadata stays keyed by the canonical URL even after an HTTP fallback
    let url = request
        .record
        .as_ref()
        .map(|r| r.url.clone())
        .unwrap_or_else(|| request.url.clone());

    if status == StatusCode::NOT_MODIFIED {
        tracing::debug!(url = %url, "not modified");
        CrawlMetrics::incr(&ctx.metrics.pages_not_modified);
        ctx.limiter.record_success(&request.domain);
        return;
    }

    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
        let secs = retry_after_secs.unwrap_or(ctx.throttle_seconds);
        tracing::debug!(domain = %request.domain, secs, "server throttling, backing off");
        ctx.limiter.throttle_domain(&request.domain, secs);
        CrawlMetrics::incr(&ctx.metrics.throttled_responses);
        if let Err(e) = ctx.meta.record_temporary_failure(&url) {
            tracing::warn!(error = %e, url = %url, "failed to record throttle");
        }
        return;
    }

    if status != StatusCode::OK {
        tracing::debug!(url = %url, status = status.as_u16(), "HTTP error");
        CrawlMetrics::incr(&ctx.metrics.http_errors);
        if status.is_server_error() {
            let failures = ctx.limiter.record_failure(&request.domain);
            if failures >= ctx.failure_blacklist_threshold {
                ctx.blacklist.add_temporary(&request.domain);
            }
        }
        if let Err(e) = ctx.meta.record_temporary_failure(&url) {
            tracing::warn!(error = %e, url = %url, "failed to record HTTP error");
        }
        return;
    }

    // 200 OK
    ctx.limiter.record_success(&request.domain);
    if let Err(e) = ctx.meta.update_cache(&url, etag.as_deref(), last_modified.as_deref()) {
        tracing::warn!(error = %e, url = %url, "failed to update validator cache");
    }
    CrawlMetrics::incr(&ctx.metrics.pages_fetched);
    CrawlMetrics::add(&ctx.metrics.bytes_fetched, body_bytes);

    let Some(body) = body else {
        // Non-HTML content type; headers were still useful
        CrawlMetrics::incr(&ctx.metrics.quality_rejected);
        return;
    };

    let text = relevant_text(&body);
    let content_hash = hash_text(&text);
    match ctx.meta.update_after_crawl(&url, &content_hash) {
        Ok(crate::meta::ContentChange::Unchanged { no_change_count }) => {
            tracing::trace!(url = %url, no_change_count, "content unchanged");
            CrawlMetrics::incr(&ctx.metrics.pages_unchanged);
        }
        Ok(crate::meta::ContentChange::Changed) => {}
        Err(e) => tracing::warn!(error = %e, url = %url, "failed to record crawl"),
    }

    let verdict = check_quality(&body, &text, ctx.max_body_bytes, ctx.min_text_chars);
    if !verdict.is_acceptable() {
        tracing::debug!(url = %url, ?verdict, "page failed quality check");
        CrawlMetrics::incr(&ctx.metrics.quality_rejected);
        return;
    }

    let depth = request.record.as_ref().map(|r| r.depth).unwrap_or(0);
    let task = HtmlTask {
        url,
        domain: request.domain,
        depth,
        html: body,
        content_hash,
        fetched_at: Utc::now(),
    };
    if let Err(task) = ctx.html_queue.try_enqueue(task) {
        match ctx.mode {
            // Backpressure fallback: do the extraction ourselves
            CrawlMode::Regular => ctx.processor.process(task),
            CrawlMode::Fresh => {
                tracing::debug!(url = %task.url, "HTML queue full, dropping task");
                CrawlMetrics::incr(&ctx.metrics.tasks_dropped);
            }
        }
    }
}

/// Transport errors: one-shot HTTPS→HTTP fallback for TLS, otherwise
/// failure accounting toward the temporary blacklist
fn handle_transport_failure(
    ctx: &FetchContext,
    client: &Client,
    request: RequestContext,
    kind: TransportKind,
    error: String,
    in_flight: &mut InFlight,
) {
    if kind == TransportKind::Tls && request.retry_count == 0 && request.url.starts_with("https://")
    {
        tracing::debug!(url = %request.url, "TLS failure, retrying over HTTP");
        CrawlMetrics::incr(&ctx.metrics.https_fallbacks);

        let cache_info = request
            .record
            .as_ref()
            .and_then(|r| ctx.meta.cache_info(&r.url).ok())
            .unwrap_or_default();
        let fallback = request.with_http_fallback();
        ctx.limiter.record_request(&fallback.domain);
        in_flight.push(Box::pin(execute_page_request(
            client.clone(),
            fallback,
            cache_info,
            ctx.max_body_bytes,
        )));
        return;
    }

    tracing::debug!(url = %request.url, ?kind, error = %error, "transport failure");
    CrawlMetrics::incr(&ctx.metrics.transport_errors);
    let failures = ctx.limiter.record_failure(&request.domain);
    if failures >= ctx.failure_blacklist_threshold {
        ctx.blacklist.add_temporary(&request.domain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::MemoryMetaStore;
    use crate::sink::CountingSink;
    use crate::url::DomainBoosts;

    fn test_context(mode: CrawlMode) -> Arc<FetchContext> {
        let frontier = Arc::new(Frontier::new(4, 1000, 5));
        let deques = Arc::new(WorkStealingDeques::new(2, 10));
        let blacklist = Arc::new(DomainBlacklist::new(["blocked.test"]));
        let boosts = Arc::new(DomainBoosts::new());
        let metrics = Arc::new(CrawlMetrics::new());
        let sink = Arc::new(CountingSink::new());
        let processor = Arc::new(HtmlProcessor::new(
            frontier.clone(),
            deques.clone(),
            None,
            blacklist.clone(),
            boosts,
            sink,
            metrics.clone(),
            mode,
            100,
            5,
        ));
        Arc::new(FetchContext {
            frontier,
            deques,
            domain_queues: Arc::new(DomainQueues::new()),
            spill: None,
            limiter: Arc::new(RateLimiter::new(Duration::from_millis(50))),
            robots: Arc::new(RobotsGate::new("TestTrawler")),
            blacklist,
            meta: Arc::new(MemoryMetaStore::new()),
            html_queue: Arc::new(HtmlQueue::new(10)),
            processor,
            metrics,
            stop: Arc::new(StopFlag::new()),
            mode,
            max_in_flight: 4,
            max_body_bytes: 1 << 20,
            min_text_chars: 10,
            throttle_seconds: 10,
            failure_blacklist_threshold: 3,
        })
    }

    fn rec(url: &str) -> UrlRecord {
        UrlRecord::seed(url.to_string())
    }

    #[test]
    fn test_acquire_prefers_ready_domains() {
        let ctx = test_context(CrawlMode::Regular);
        ctx.frontier.enqueue(rec("https://frontier.test/"));
        ctx.domain_queues
            .park("parked.test", rec("https://parked.test/x"))
            .unwrap();

        let got = acquire_url(0, &ctx).unwrap();
        assert_eq!(got.url, "https://parked.test/x");
    }

    #[test]
    fn test_acquire_skips_unready_domains() {
        let ctx = test_context(CrawlMode::Regular);
        ctx.limiter.record_request("parked.test");
        ctx.domain_queues
            .park("parked.test", rec("https://parked.test/x"))
            .unwrap();
        ctx.frontier.enqueue(rec("https://frontier.test/"));

        let got = acquire_url(0, &ctx).unwrap();
        assert_eq!(got.url, "https://frontier.test/");
    }

    #[test]
    fn test_acquire_falls_back_to_own_deque_then_steal() {
        let ctx = test_context(CrawlMode::Regular);
        ctx.deques.push_local(0, rec("https://mine.test/")).unwrap();
        ctx.deques.push_local(1, rec("https://theirs.test/")).unwrap();

        assert_eq!(acquire_url(0, &ctx).unwrap().url, "https://mine.test/");
        assert_eq!(acquire_url(0, &ctx).unwrap().url, "https://theirs.test/");
        assert!(acquire_url(0, &ctx).is_none());
    }

    #[test]
    fn test_acquire_refills_from_disk_through_frontier() {
        let dir = tempfile::TempDir::new().unwrap();
        let spill = Arc::new(DiskSpill::open(dir.path()).unwrap());
        spill
            .save_urls(&[rec("https://spilled.test/1"), rec("https://spilled.test/2")])
            .unwrap();

        let mut ctx = test_context(CrawlMode::Regular);
        Arc::get_mut(&mut ctx).unwrap().spill = Some(spill.clone());

        let got = acquire_url(0, &ctx).unwrap();
        assert!(got.url.starts_with("https://spilled.test/"));
        // The second reloaded URL is waiting in the frontier
        assert_eq!(ctx.frontier.len(), 1);
        assert_eq!(spill.total_lines(), 0);
    }

    #[test]
    fn test_submit_blacklisted_is_dropped() {
        let ctx = test_context(CrawlMode::Regular);
        let client = crate::fetch::build_http_client(&crate::config::UserAgentConfig {
            crawler_name: "T".into(),
            crawler_version: "1".into(),
            contact_url: "https://t.test".into(),
            contact_email: "t@t.test".into(),
        })
        .unwrap();
        let mut in_flight: InFlight = FuturesUnordered::new();

        submit_url(0, &ctx, &client, rec("https://blocked.test/x"), &mut in_flight);
        assert!(in_flight.is_empty());
    }

    #[test]
    fn test_submit_unknown_robots_defers_and_fetches_once() {
        let ctx = test_context(CrawlMode::Regular);
        let client = crate::fetch::build_http_client(&crate::config::UserAgentConfig {
            crawler_name: "T".into(),
            crawler_version: "1".into(),
            contact_url: "https://t.test".into(),
            contact_email: "t@t.test".into(),
        })
        .unwrap();
        let mut in_flight: InFlight = FuturesUnordered::new();

        submit_url(0, &ctx, &client, rec("https://a.test/1"), &mut in_flight);
        submit_url(0, &ctx, &client, rec("https://a.test/2"), &mut in_flight);

        // Exactly one robots.txt request entered the multiplexer
        assert_eq!(in_flight.len(), 1);
        assert_eq!(ctx.metrics.snapshot().robots_fetches, 1);
        assert_eq!(ctx.robots.deferred_len(), 2);
    }

    #[test]
    fn test_submit_rate_limited_parks() {
        let ctx = test_context(CrawlMode::Regular);
        let client = crate::fetch::build_http_client(&crate::config::UserAgentConfig {
            crawler_name: "T".into(),
            crawler_version: "1".into(),
            contact_url: "https://t.test".into(),
            contact_email: "t@t.test".into(),
        })
        .unwrap();
        let mut in_flight: InFlight = FuturesUnordered::new();

        // Rules known and permissive, but the window is closed
        ctx.robots.check("a.test", "/");
        ctx.robots.store_result("a.test", Some("User-agent: *\nAllow: /"));
        ctx.limiter.record_request("a.test");

        submit_url(0, &ctx, &client, rec("https://a.test/x"), &mut in_flight);
        assert!(in_flight.is_empty());
        assert_eq!(ctx.domain_queues.total_len(), 1);
    }

    #[test]
    fn test_robots_completion_releases_deferred() {
        let ctx = test_context(CrawlMode::Regular);
        ctx.robots.check("a.test", "/");
        ctx.robots.defer("a.test", rec("https://a.test/1"));
        ctx.robots.defer("a.test", rec("https://a.test/2"));

        let request = RequestContext::robots("a.test".to_string(), "https://a.test");
        handle_robots_completion(
            0,
            &ctx,
            request,
            FetchOutcome::Response {
                status: StatusCode::OK,
                etag: None,
                last_modified: None,
                retry_after_secs: None,
                body: Some("User-agent: *\nAllow: /".to_string()),
                body_bytes: 22,
            },
        );

        // Released URLs landed on the worker's deque in deferral order
        assert_eq!(ctx.deques.len(0), 2);
        assert_eq!(ctx.robots.deferred_len(), 0);
        assert_eq!(ctx.deques.pop_local(0).unwrap().url, "https://a.test/1");
        assert_eq!(ctx.deques.pop_local(0).unwrap().url, "https://a.test/2");
    }

    #[test]
    fn test_throttled_response_throttles_domain() {
        let ctx = test_context(CrawlMode::Regular);
        let request = RequestContext::page(rec("https://c.test/x"), "c.test".to_string());

        handle_page_response(
            &ctx,
            request,
            StatusCode::TOO_MANY_REQUESTS,
            None,
            None,
            Some(30),
            None,
            0,
        );

        assert!(!ctx.limiter.can_request_now("c.test"));
        assert!(ctx.limiter.can_request_now("other.test"));
        assert_eq!(ctx.metrics.snapshot().throttled_responses, 1);
    }

    #[test]
    fn test_ok_response_produces_html_task() {
        let ctx = test_context(CrawlMode::Regular);
        let request = RequestContext::page(rec("https://a.test/"), "a.test".to_string());
        let body = format!(
            "<html><body><p>{}</p></body></html>",
            "The quick brown fox and all the other animals were there. ".repeat(5)
        );

        handle_page_response(
            &ctx,
            request,
            StatusCode::OK,
            Some("\"v1\"".to_string()),
            None,
            None,
            Some(body.clone()),
            body.len() as u64,
        );

        assert_eq!(ctx.html_queue.len(), 1);
        assert_eq!(ctx.metrics.snapshot().pages_fetched, 1);
        // Validators were cached for the next conditional GET
        let info = ctx.meta.cache_info("https://a.test/").unwrap();
        assert_eq!(info.etag.as_deref(), Some("\"v1\""));
    }

    #[test]
    fn test_not_modified_leaves_metadata_alone() {
        let ctx = test_context(CrawlMode::Regular);
        ctx.meta.update_after_crawl("https://a.test/", "h").unwrap();
        let before = ctx.meta.page_meta("https://a.test/").unwrap().unwrap();

        let request = RequestContext::page(rec("https://a.test/"), "a.test".to_string());
        handle_page_response(&ctx, request, StatusCode::NOT_MODIFIED, None, None, None, None, 0);

        let after = ctx.meta.page_meta("https://a.test/").unwrap().unwrap();
        assert_eq!(before.content_hash, after.content_hash);
        assert_eq!(ctx.metrics.snapshot().pages_not_modified, 1);
        assert!(ctx.html_queue.is_empty());
    }

    #[test]
    fn test_transport_failures_blacklist_domain() {
        let ctx = test_context(CrawlMode::Regular);
        let client = crate::fetch::build_http_client(&crate::config::UserAgentConfig {
            crawler_name: "T".into(),
            crawler_version: "1".into(),
            contact_url: "https://t.test".into(),
            contact_email: "t@t.test".into(),
        })
        .unwrap();
        let mut in_flight: InFlight = FuturesUnordered::new();

        for i in 0..3 {
            let request =
                RequestContext::page(rec(&format!("https://down.test/{}", i)), "down.test".to_string());
            handle_transport_failure(
                &ctx,
                &client,
                request,
                TransportKind::Connect,
                "connection refused".to_string(),
                &mut in_flight,
            );
        }

        assert!(ctx.blacklist.is_blacklisted("down.test"));
        assert_eq!(ctx.metrics.snapshot().transport_errors, 3);
    }

    #[test]
    fn test_tls_failure_resubmits_over_http_once() {
        let ctx = test_context(CrawlMode::Regular);
        let client = crate::fetch::build_http_client(&crate::config::UserAgentConfig {
            crawler_name: "T".into(),
            crawler_version: "1".into(),
            contact_url: "https://t.test".into(),
            contact_email: "t@t.test".into(),
        })
        .unwrap();
        let mut in_flight: InFlight = FuturesUnordered::new();

        let request = RequestContext::page(rec("https://e.test/"), "e.test".to_string());
        handle_transport_failure(
            &ctx,
            &client,
            request,
            TransportKind::Tls,
            "handshake failure".to_string(),
            &mut in_flight,
        );

        // The fallback went back into the multiplexer instead of failing
        assert_eq!(in_flight.len(), 1);
        assert_eq!(ctx.metrics.snapshot().https_fallbacks, 1);
        assert_eq!(ctx.metrics.snapshot().transport_errors, 0);

        // A second TLS failure (retry_count = 1) is terminal
        let mut retried = RequestContext::page(rec("https://e.test/"), "e.test".to_string());
        retried.retry_count = 1;
        handle_transport_failure(
            &ctx,
            &client,
            retried,
            TransportKind::Tls,
            "handshake failure".to_string(),
            &mut in_flight,
        );
        assert_eq!(in_flight.len(), 1);
        assert_eq!(ctx.metrics.snapshot().transport_errors, 1);
    }

    #[test]
    fn test_html_queue_full_regular_processes_inline() {
        let ctx = test_context(CrawlMode::Regular);
        // Fill the queue
        for i in 0..10 {
            ctx.html_queue
                .try_enqueue(HtmlTask {
                    url: format!("https://fill.test/{}", i),
                    domain: "fill.test".to_string(),
                    depth: 0,
                    html: String::new(),
                    content_hash: String::new(),
                    fetched_at: Utc::now(),
                })
                .unwrap();
        }

        let body = format!(
            "<html><body><p>{}</p><a href=\"https://found.test/x\">x</a></body></html>",
            "The quick brown fox and all of the other animals that were there. ".repeat(5)
        );
        let request = RequestContext::page(rec("https://a.test/"), "a.test".to_string());
        handle_page_response(
            &ctx,
            request,
            StatusCode::OK,
            None,
            None,
            None,
            Some(body.clone()),
            body.len() as u64,
        );

        // Inline fallback extracted the link into the frontier
        assert_eq!(ctx.frontier.len(), 1);
        assert_eq!(ctx.metrics.snapshot().tasks_dropped, 0);
    }
}

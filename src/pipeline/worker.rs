//! HTML processing worker
//!
//! Each task is parsed into a DOM exactly once; every later extraction
//! (title check, link harvest) reuses that parse. Non-English pages are
//! counted and dropped, accepted pages are batched toward the storage
//! writer, and outbound links flow back through the frontier with the same
//! canonicalization rules as every other URL.

use crate::blacklist::DomainBlacklist;
use crate::config::CrawlMode;
use crate::frontier::{DiskSpill, Frontier, UrlRecord, WorkStealingDeques};
use crate::monitor::CrawlMetrics;
use crate::pipeline::{is_probably_english, relevant_text, HtmlQueue, HtmlTask};
use crate::sink::{HtmlBatchEntry, HtmlSink, SinkResult};
use crate::url::{extract_domain, DomainBoosts};
use scraper::{Html, Selector};
use std::sync::{Arc, Mutex};
use url::Url;

/// Shared HTML processing logic
///
/// Used by the HTML worker pool, and directly by fetch workers when the
/// queue is full in REGULAR mode (the synchronous fallback).
pub struct HtmlProcessor {
    frontier: Arc<Frontier>,
    deques: Arc<WorkStealingDeques>,
    spill: Option<Arc<DiskSpill>>,
    blacklist: Arc<DomainBlacklist>,
    boosts: Arc<DomainBoosts>,
    sink: Arc<dyn HtmlSink>,
    metrics: Arc<CrawlMetrics>,
    mode: CrawlMode,
    batch_size: usize,
    link_extraction_depth: u32,
    batch: Mutex<Vec<HtmlBatchEntry>>,
}

impl HtmlProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        frontier: Arc<Frontier>,
        deques: Arc<WorkStealingDeques>,
        spill: Option<Arc<DiskSpill>>,
        blacklist: Arc<DomainBlacklist>,
        boosts: Arc<DomainBoosts>,
        sink: Arc<dyn HtmlSink>,
        metrics: Arc<CrawlMetrics>,
        mode: CrawlMode,
        batch_size: usize,
        link_extraction_depth: u32,
    ) -> Self {
        Self {
            frontier,
            deques,
            spill,
            blacklist,
            boosts,
            sink,
            metrics,
            mode,
            batch_size,
            link_extraction_depth,
            batch: Mutex::new(Vec::new()),
        }
    }

    /// Processes one task end to end
    ///
    /// Parse, language-filter, batch for storage, then extract and enqueue
    /// outbound links. Never returns an error: every failure is local
    /// (logged and counted) per the engine's propagation policy.
    pub fn process(&self, task: HtmlTask) {
        // The parse and everything that needs it happens in this block; the
        // body is then moved, not copied, into the storage batch.
        let (has_body, links) = {
            let document = Html::parse_document(&task.html);
            let has_body = Selector::parse("body")
                .ok()
                .map(|sel| document.select(&sel).next().is_some())
                .unwrap_or(false);

            let links = if has_body && task.depth < self.link_extraction_depth {
                match Url::parse(&task.url) {
                    Ok(base) => extract_links(&document, &base),
                    Err(_) => Vec::new(),
                }
            } else {
                Vec::new()
            };
            (has_body, links)
        };

        if !has_body {
            tracing::debug!(url = %task.url, "document has no body element");
            CrawlMetrics::incr(&self.metrics.parse_failures);
        }

        let text = relevant_text(&task.html);
        if !is_probably_english(&text) {
            tracing::debug!(url = %task.url, "dropped non-English page");
            CrawlMetrics::incr(&self.metrics.language_filtered);
            return;
        }

        let HtmlTask {
            url,
            domain,
            depth,
            html,
            content_hash,
            fetched_at,
        } = task;
        self.append_to_batch(HtmlBatchEntry {
            url,
            html,
            content_hash,
            fetched_at,
        });
        self.enqueue_links(&domain, depth, links);
    }

    /// Appends one entry, flushing when the batch is full (or always, FRESH)
    fn append_to_batch(&self, entry: HtmlBatchEntry) {
        let full_batch = {
            let mut batch = self.batch.lock().unwrap_or_else(|e| e.into_inner());
            batch.push(entry);
            if batch.len() >= self.batch_size || self.mode == CrawlMode::Fresh {
                Some(std::mem::take(&mut *batch))
            } else {
                None
            }
        };

        if let Some(batch) = full_batch {
            self.write_batch(batch);
        }
    }

    /// Flushes whatever is buffered; called by the engine on shutdown
    pub fn flush(&self) -> SinkResult<()> {
        let batch = {
            let mut batch = self.batch.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *batch)
        };
        if batch.is_empty() {
            return Ok(());
        }
        let len = batch.len();
        self.sink.save_html_batch(&batch)?;
        CrawlMetrics::incr(&self.metrics.batches_written);
        tracing::debug!(pages = len, "flushed final HTML batch");
        Ok(())
    }

    fn write_batch(&self, batch: Vec<HtmlBatchEntry>) {
        match self.sink.save_html_batch(&batch) {
            Ok(()) => CrawlMetrics::incr(&self.metrics.batches_written),
            Err(e) => tracing::error!(error = %e, pages = batch.len(), "failed to write HTML batch"),
        }
    }

    /// Canonicalizes, filters, prices, and enqueues discovered links
    fn enqueue_links(&self, referring_domain: &str, depth: u32, links: Vec<String>) {
        if links.is_empty() {
            return;
        }
        CrawlMetrics::add(&self.metrics.links_discovered, links.len() as u64);

        let mut records = Vec::with_capacity(links.len());
        for link in links {
            let Ok(canonical) = crate::canonicalize_url(&link) else {
                continue;
            };
            let Some(domain) = extract_domain(&canonical) else {
                continue;
            };
            if self.blacklist.is_blacklisted(&domain) {
                continue;
            }
            records.push(UrlRecord::new(
                canonical.to_string(),
                &domain,
                depth + 1,
                referring_domain,
                &self.boosts,
            ));
        }

        let attempted = records.len();
        let residual = self.frontier.enqueue_batch(records);
        CrawlMetrics::add(
            &self.metrics.links_enqueued,
            (attempted - residual.len()) as u64,
        );

        // Overflow: local deque first, then disk (REGULAR) or the floor (FRESH)
        let mut to_spill = Vec::new();
        for record in residual {
            if let Err(record) = self.deques.push_any(record) {
                to_spill.push(record);
            }
        }
        if to_spill.is_empty() {
            return;
        }

        match &self.spill {
            Some(spill) => match spill.save_urls(&to_spill) {
                Ok(n) => CrawlMetrics::add(&self.metrics.spilled_to_disk, n as u64),
                Err(e) => tracing::error!(error = %e, "failed to spill URLs to disk"),
            },
            None => {
                tracing::debug!(dropped = to_spill.len(), "dropped overflow URLs");
                CrawlMetrics::add(&self.metrics.tasks_dropped, to_spill.len() as u64);
            }
        }
    }
}

/// Extracts followable links from a parsed document
///
/// Anchors and the canonical link participate; `javascript:`, `mailto:`,
/// `tel:`, `data:` and fragment-only hrefs do not, nor do explicit
/// download links. Relative hrefs resolve against the base URL.
fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut links = Vec::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }
            if let Some(href) = element.value().attr("href") {
                if let Some(absolute) = resolve_link(href, base_url) {
                    links.push(absolute);
                }
            }
        }
    }

    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(href) = element.value().attr("href") {
                if let Some(absolute) = resolve_link(href, base_url) {
                    links.push(absolute);
                }
            }
        }
    }

    links
}

/// Resolves an href to an absolute HTTP(S) URL, or rejects it
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute) if absolute.scheme() == "http" || absolute.scheme() == "https" => {
            Some(absolute.to_string())
        }
        _ => None,
    }
}

/// Worker loop: block on the queue until it closes and drains
pub async fn run_html_worker(id: usize, queue: Arc<HtmlQueue>, processor: Arc<HtmlProcessor>) {
    tracing::debug!(worker = id, "HTML worker started");
    while let Some(task) = queue.recv().await {
        processor.process(task);
    }
    tracing::debug!(worker = id, "HTML worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::CountingSink;
    use chrono::Utc;

    fn processor(mode: CrawlMode, batch_size: usize) -> (Arc<HtmlProcessor>, Arc<Frontier>, Arc<CountingSink>) {
        let frontier = Arc::new(Frontier::new(4, 1000, 5));
        let deques = Arc::new(WorkStealingDeques::new(2, 100));
        let blacklist = Arc::new(DomainBlacklist::new(["blocked.test"]));
        let boosts = Arc::new(DomainBoosts::new());
        let sink = Arc::new(CountingSink::new());
        let metrics = Arc::new(CrawlMetrics::new());
        let proc = Arc::new(HtmlProcessor::new(
            frontier.clone(),
            deques,
            None,
            blacklist,
            boosts,
            sink.clone(),
            metrics,
            mode,
            batch_size,
            5,
        ));
        (proc, frontier, sink)
    }

    fn english_page(links: &[&str]) -> String {
        let anchors: String = links
            .iter()
            .map(|l| format!("<a href=\"{}\">link</a>", l))
            .collect();
        format!(
            "<html><head><title>T</title></head><body><p>{}</p>{}</body></html>",
            "The quick brown fox jumps over the lazy dog and all of the other \
             animals that were there with them in the forest. "
                .repeat(3),
            anchors
        )
    }

    fn task(url: &str, depth: u32, html: String) -> HtmlTask {
        HtmlTask {
            url: url.to_string(),
            domain: "a.test".to_string(),
            depth,
            content_hash: crate::pipeline::content_hash(&html),
            html,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_links_flow_into_frontier() {
        let (proc, frontier, _) = processor(CrawlMode::Regular, 100);
        let html = english_page(&["https://b.test/x", "/local"]);
        proc.process(task("https://a.test/", 0, html));

        assert_eq!(frontier.len(), 2);
        let urls: Vec<String> = std::iter::from_fn(|| frontier.dequeue())
            .map(|r| r.url)
            .collect();
        assert!(urls.contains(&"https://b.test/x".to_string()));
        assert!(urls.contains(&"https://a.test/local".to_string()));
    }

    #[test]
    fn test_discovered_depth_increments() {
        let (proc, frontier, _) = processor(CrawlMode::Regular, 100);
        proc.process(task("https://a.test/", 2, english_page(&["/deeper"])));

        let rec = frontier.dequeue().unwrap();
        assert_eq!(rec.depth, 3);
        assert_eq!(rec.referring_domain, "a.test");
    }

    #[test]
    fn test_no_links_past_extraction_depth() {
        let (proc, frontier, _) = processor(CrawlMode::Regular, 100);
        proc.process(task("https://a.test/", 5, english_page(&["/too-deep"])));
        assert_eq!(frontier.len(), 0);
    }

    #[test]
    fn test_blacklisted_links_filtered() {
        let (proc, frontier, _) = processor(CrawlMode::Regular, 100);
        proc.process(task(
            "https://a.test/",
            0,
            english_page(&["https://blocked.test/x", "https://ok.test/y"]),
        ));

        assert_eq!(frontier.len(), 1);
        assert_eq!(frontier.dequeue().unwrap().url, "https://ok.test/y");
    }

    #[test]
    fn test_non_english_dropped_before_storage() {
        let (proc, frontier, sink) = processor(CrawlMode::Fresh, 1);
        let html = format!(
            "<html><body><p>{}</p><a href=\"/x\">l</a></body></html>",
            "Der schnelle braune Fuchs springt über den faulen Hund und läuft \
             dann in den Wald mit allen anderen Tieren die vorher dort waren "
                .repeat(3)
        );
        proc.process(task("https://a.test/", 0, html));

        assert_eq!(sink.page_count(), 0);
        assert_eq!(frontier.len(), 0);
    }

    #[test]
    fn test_regular_batches_at_batch_size() {
        let (proc, _, sink) = processor(CrawlMode::Regular, 3);
        for i in 0..7 {
            proc.process(task(
                &format!("https://a.test/{}", i),
                0,
                english_page(&[]),
            ));
        }

        // Two full batches written, one partial still buffered
        assert_eq!(sink.batch_count(), 2);
        assert_eq!(sink.page_count(), 6);

        proc.flush().unwrap();
        assert_eq!(sink.page_count(), 7);
    }

    #[test]
    fn test_fresh_flushes_every_task() {
        let (proc, _, sink) = processor(CrawlMode::Fresh, 100);
        proc.process(task("https://a.test/1", 0, english_page(&[])));
        proc.process(task("https://a.test/2", 0, english_page(&[])));
        assert_eq!(sink.batch_count(), 2);
        assert_eq!(sink.page_count(), 2);
    }

    #[test]
    fn test_flush_empty_is_noop() {
        let (proc, _, sink) = processor(CrawlMode::Regular, 10);
        proc.flush().unwrap();
        assert_eq!(sink.batch_count(), 0);
    }

    #[test]
    fn test_extract_links_filters_schemes() {
        let base = Url::parse("https://a.test/page").unwrap();
        let html = Html::parse_document(
            r##"<html><body>
                <a href="/ok">ok</a>
                <a href="javascript:void(0)">js</a>
                <a href="mailto:x@y.z">mail</a>
                <a href="tel:+123">tel</a>
                <a href="data:text/html,x">data</a>
                <a href="#frag">frag</a>
                <a href="/file.pdf" download>dl</a>
                <a href="ftp://a.test/f">ftp</a>
            </body></html>"##,
        );
        let links = extract_links(&html, &base);
        assert_eq!(links, vec!["https://a.test/ok".to_string()]);
    }

    #[test]
    fn test_extract_canonical_link() {
        let base = Url::parse("https://a.test/page?ref=x").unwrap();
        let html = Html::parse_document(
            r#"<html><head><link rel="canonical" href="https://a.test/page"/></head>
               <body></body></html>"#,
        );
        let links = extract_links(&html, &base);
        assert_eq!(links, vec!["https://a.test/page".to_string()]);
    }

    #[tokio::test]
    async fn test_worker_drains_queue_then_exits() {
        let (proc, frontier, _) = processor(CrawlMode::Regular, 100);
        let queue = Arc::new(HtmlQueue::new(10));

        queue
            .try_enqueue(task("https://a.test/", 0, english_page(&["/found"])))
            .unwrap();
        queue.close();

        run_html_worker(0, queue, proc).await;
        assert_eq!(frontier.len(), 1);
    }
}

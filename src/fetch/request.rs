use crate::frontier::UrlRecord;
use crate::meta::CacheInfo;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use std::error::Error as _;

/// What an in-flight request is fetching
///
/// Completion handling branches on this tag; there is no type hierarchy
/// behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTag {
    /// An ordinary page fetch
    Page,
    /// A robots.txt fetch triggered by the deferred-fetch protocol
    RobotsTxt,
}

/// Context that travels with one multiplexed request
#[derive(Debug)]
pub struct RequestContext {
    pub tag: RequestTag,
    /// URL actually being fetched (after a possible HTTP fallback rewrite)
    pub url: String,
    pub domain: String,
    /// The frontier record being serviced (Page requests)
    pub record: Option<UrlRecord>,
    /// HTTPS→HTTP fallback count; at most one retry happens
    pub retry_count: u32,
    pub sent_at: DateTime<Utc>,
}

/// How a transport error presented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Tls,
    Timeout,
    Connect,
    Other,
}

/// Terminal result of one multiplexed request
#[derive(Debug)]
pub enum FetchOutcome {
    Response {
        status: StatusCode,
        etag: Option<String>,
        last_modified: Option<String>,
        retry_after_secs: Option<u64>,
        /// Body text; `None` for non-HTML content types and non-200s
        body: Option<String>,
        body_bytes: u64,
    },
    Transport {
        kind: TransportKind,
        error: String,
    },
}

/// A completed request as reported by the worker's multiplexer
#[derive(Debug)]
pub struct FetchCompletion {
    pub ctx: RequestContext,
    pub outcome: FetchOutcome,
}

/// Classifies a reqwest error for retry/fallback decisions
///
/// reqwest does not expose TLS failures directly, so the error chain's
/// rendering is scanned for the usual suspects.
pub fn classify_transport(error: &reqwest::Error) -> TransportKind {
    if error.is_timeout() {
        return TransportKind::Timeout;
    }

    let mut message = error.to_string().to_lowercase();
    let mut source: Option<&(dyn std::error::Error + 'static)> = error.source();
    while let Some(inner) = source {
        message.push(' ');
        message.push_str(&inner.to_string().to_lowercase());
        source = inner.source();
    }
    if ["tls", "ssl", "certificate", "handshake"]
        .iter()
        .any(|needle| message.contains(needle))
    {
        return TransportKind::Tls;
    }

    if error.is_connect() {
        return TransportKind::Connect;
    }
    TransportKind::Other
}

/// Executes one page request and classifies the result
///
/// Conditional headers come from the metadata store's validators. The body
/// is only downloaded for 200 responses whose Content-Type is HTML (or
/// absent, which some small servers omit).
pub async fn execute_page_request(
    client: Client,
    ctx: RequestContext,
    cache_info: CacheInfo,
    max_body_bytes: usize,
) -> FetchCompletion {
    let mut request = client.get(&ctx.url);
    if let Some(etag) = &cache_info.etag {
        request = request.header(IF_NONE_MATCH, etag);
    }
    if let Some(last_modified) = &cache_info.last_modified {
        request = request.header(IF_MODIFIED_SINCE, last_modified);
    }

    let outcome = match request.send().await {
        Ok(response) => {
            let status = response.status();
            let headers = response.headers();
            let etag = header_string(headers, ETAG.as_str());
            let last_modified = header_string(headers, LAST_MODIFIED.as_str());
            let retry_after_secs = header_string(headers, RETRY_AFTER.as_str())
                .and_then(|v| v.parse::<u64>().ok());
            let content_type = header_string(headers, "content-type").unwrap_or_default();

            let html_like = content_type.is_empty() || content_type.contains("text/html");
            let small_enough = response
                .content_length()
                .map(|len| len as usize <= max_body_bytes)
                .unwrap_or(true);

            if status == StatusCode::OK && html_like && small_enough {
                match response.text().await {
                    Ok(body) => FetchOutcome::Response {
                        status,
                        etag,
                        last_modified,
                        retry_after_secs,
                        body_bytes: body.len() as u64,
                        body: Some(body),
                    },
                    Err(e) => FetchOutcome::Transport {
                        kind: classify_transport(&e),
                        error: e.to_string(),
                    },
                }
            } else {
                FetchOutcome::Response {
                    status,
                    etag,
                    last_modified,
                    retry_after_secs,
                    body: None,
                    body_bytes: 0,
                }
            }
        }
        Err(e) => FetchOutcome::Transport {
            kind: classify_transport(&e),
            error: e.to_string(),
        },
    };

    FetchCompletion { ctx, outcome }
}

/// Executes one robots.txt request
///
/// Any non-200 (or transport failure) is reported without a body; the gate
/// turns that into the permissive default.
pub async fn execute_robots_request(client: Client, ctx: RequestContext) -> FetchCompletion {
    let outcome = match client.get(&ctx.url).send().await {
        Ok(response) => {
            let status = response.status();
            let body = if status == StatusCode::OK {
                response.text().await.ok()
            } else {
                None
            };
            FetchOutcome::Response {
                status,
                etag: None,
                last_modified: None,
                retry_after_secs: None,
                body_bytes: body.as_ref().map(|b| b.len() as u64).unwrap_or(0),
                body,
            }
        }
        Err(e) => FetchOutcome::Transport {
            kind: classify_transport(&e),
            error: e.to_string(),
        },
    };

    FetchCompletion { ctx, outcome }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

impl RequestContext {
    /// Context for a page fetch
    pub fn page(record: UrlRecord, domain: String) -> Self {
        Self {
            tag: RequestTag::Page,
            url: record.url.clone(),
            domain,
            record: Some(record),
            retry_count: 0,
            sent_at: Utc::now(),
        }
    }

    /// Context for a deferred robots.txt fetch
    ///
    /// `origin` is the serialized scheme://host[:port] of the URL that
    /// triggered the fetch, so non-default ports keep working.
    pub fn robots(domain: String, origin: &str) -> Self {
        Self {
            tag: RequestTag::RobotsTxt,
            url: format!("{}/robots.txt", origin),
            domain,
            record: None,
            retry_count: 0,
            sent_at: Utc::now(),
        }
    }

    /// Rewrites this context for the one-shot HTTPS→HTTP fallback
    pub fn with_http_fallback(mut self) -> Self {
        if let Some(rest) = self.url.strip_prefix("https://") {
            self.url = format!("http://{}", rest);
        }
        self.retry_count += 1;
        self.sent_at = Utc::now();
        self
    }
}

//! In-memory metadata store for tests and short-lived FRESH runs

use crate::meta::{
    recrawl_interval, CacheInfo, ContentChange, MetaResult, MetadataStore, PageMeta, StoreStats,
};
use chrono::Utc;
use dashmap::DashMap;

#[derive(Debug, Clone, Default)]
struct Entry {
    etag: Option<String>,
    last_modified: Option<String>,
    content_hash: Option<String>,
    last_crawled_at: Option<chrono::DateTime<Utc>>,
    next_recrawl_at: Option<chrono::DateTime<Utc>>,
    no_change_count: u32,
    failure_count: u32,
}

/// Metadata store that lives and dies with the process
#[derive(Default)]
pub struct MemoryMetaStore {
    entries: DashMap<String, Entry>,
}

impl MemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemoryMetaStore {
    fn cache_info(&self, url: &str) -> MetaResult<CacheInfo> {
        Ok(self
            .entries
            .get(url)
            .map(|e| CacheInfo {
                etag: e.etag.clone(),
                last_modified: e.last_modified.clone(),
            })
            .unwrap_or_default())
    }

    fn update_cache(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> MetaResult<()> {
        let mut entry = self.entries.entry(url.to_string()).or_default();
        entry.etag = etag.map(str::to_string);
        entry.last_modified = last_modified.map(str::to_string);
        Ok(())
    }

    fn update_after_crawl(&self, url: &str, content_hash: &str) -> MetaResult<ContentChange> {
        let now = Utc::now();
        let mut entry = self.entries.entry(url.to_string()).or_default();

        let change = match &entry.content_hash {
            Some(old) if old == content_hash => {
                entry.no_change_count += 1;
                ContentChange::Unchanged {
                    no_change_count: entry.no_change_count,
                }
            }
            _ => {
                entry.no_change_count = 0;
                ContentChange::Changed
            }
        };

        entry.content_hash = Some(content_hash.to_string());
        entry.last_crawled_at = Some(now);
        entry.next_recrawl_at = Some(now + recrawl_interval(entry.no_change_count));
        entry.failure_count = 0;
        Ok(change)
    }

    fn record_temporary_failure(&self, url: &str) -> MetaResult<()> {
        let now = Utc::now();
        let mut entry = self.entries.entry(url.to_string()).or_default();
        entry.failure_count += 1;
        entry.next_recrawl_at = Some(now + recrawl_interval(entry.failure_count.min(8)));
        Ok(())
    }

    fn page_meta(&self, url: &str) -> MetaResult<Option<PageMeta>> {
        Ok(self.entries.get(url).map(|e| PageMeta {
            url: url.to_string(),
            content_hash: e.content_hash.clone(),
            last_crawled_at: e.last_crawled_at,
            next_recrawl_at: e.next_recrawl_at,
            no_change_count: e.no_change_count,
            etag: e.etag.clone(),
            last_modified: e.last_modified.clone(),
        }))
    }

    fn stats(&self) -> MetaResult<StoreStats> {
        let mut stats = StoreStats {
            total_urls: self.entries.len() as u64,
            ..Default::default()
        };
        for entry in self.entries.iter() {
            if entry.etag.is_some() || entry.last_modified.is_some() {
                stats.urls_with_validators += 1;
            }
            if entry.no_change_count > 0 {
                stats.urls_unchanged_streak += 1;
            }
        }
        Ok(stats)
    }
}

//! SQLite-backed metadata store

use crate::meta::{
    recrawl_interval, CacheInfo, ContentChange, MetaResult, MetadataStore, PageMeta, StoreStats,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Metadata store persisted in a single SQLite database
///
/// One row per canonical URL. The connection is wrapped in a mutex; writes
/// are single statements, so contention stays short.
pub struct SqliteMetaStore {
    conn: Mutex<Connection>,
}

impl SqliteMetaStore {
    /// Opens (or creates) the store at the given path
    pub fn open(path: &Path) -> MetaResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory store (for testing)
    pub fn open_in_memory() -> MetaResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> MetaResult<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS page_meta (
                url             TEXT PRIMARY KEY,
                etag            TEXT,
                last_modified   TEXT,
                content_hash    TEXT,
                last_crawled_at TEXT,
                next_recrawl_at TEXT,
                no_change_count INTEGER NOT NULL DEFAULT 0,
                failure_count   INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_page_meta_recrawl
                ON page_meta(next_recrawl_at);
        ",
        )?;
        Ok(())
    }

    fn parse_ts(value: Option<String>) -> Option<DateTime<Utc>> {
        value
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl MetadataStore for SqliteMetaStore {
    fn cache_info(&self, url: &str) -> MetaResult<CacheInfo> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let row = conn
            .query_row(
                "SELECT etag, last_modified FROM page_meta WHERE url = ?1",
                params![url],
                |row| {
                    Ok(CacheInfo {
                        etag: row.get(0)?,
                        last_modified: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(row.unwrap_or_default())
    }

    fn update_cache(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> MetaResult<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT INTO page_meta (url, etag, last_modified) VALUES (?1, ?2, ?3)
             ON CONFLICT(url) DO UPDATE SET etag = ?2, last_modified = ?3",
            params![url, etag, last_modified],
        )?;
        Ok(())
    }

    fn update_after_crawl(&self, url: &str, content_hash: &str) -> MetaResult<ContentChange> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();

        let previous: Option<(Option<String>, u32)> = conn
            .query_row(
                "SELECT content_hash, no_change_count FROM page_meta WHERE url = ?1",
                params![url],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (change, streak) = match previous {
            Some((Some(old_hash), count)) if old_hash == content_hash => {
                let streak = count + 1;
                (ContentChange::Unchanged { no_change_count: streak }, streak)
            }
            _ => (ContentChange::Changed, 0),
        };

        let next_recrawl = now + recrawl_interval(streak);
        conn.execute(
            "INSERT INTO page_meta
                 (url, content_hash, last_crawled_at, next_recrawl_at, no_change_count, failure_count)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)
             ON CONFLICT(url) DO UPDATE SET
                 content_hash = ?2,
                 last_crawled_at = ?3,
                 next_recrawl_at = ?4,
                 no_change_count = ?5,
                 failure_count = 0",
            params![
                url,
                content_hash,
                now.to_rfc3339(),
                next_recrawl.to_rfc3339(),
                streak
            ],
        )?;

        Ok(change)
    }

    fn record_temporary_failure(&self, url: &str) -> MetaResult<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();

        let failures: u32 = conn
            .query_row(
                "SELECT failure_count FROM page_meta WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0)
            + 1;

        let next_recrawl = now + recrawl_interval(failures.min(8));
        conn.execute(
            "INSERT INTO page_meta (url, next_recrawl_at, failure_count) VALUES (?1, ?2, ?3)
             ON CONFLICT(url) DO UPDATE SET next_recrawl_at = ?2, failure_count = ?3",
            params![url, next_recrawl.to_rfc3339(), failures],
        )?;
        Ok(())
    }

    fn page_meta(&self, url: &str) -> MetaResult<Option<PageMeta>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let row = conn
            .query_row(
                "SELECT url, content_hash, last_crawled_at, next_recrawl_at,
                        no_change_count, etag, last_modified
                 FROM page_meta WHERE url = ?1",
                params![url],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, u32>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(
            |(url, content_hash, crawled, recrawl, streak, etag, last_modified)| PageMeta {
                url,
                content_hash,
                last_crawled_at: Self::parse_ts(crawled),
                next_recrawl_at: Self::parse_ts(recrawl),
                no_change_count: streak,
                etag,
                last_modified,
            },
        ))
    }

    fn stats(&self) -> MetaResult<StoreStats> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let total_urls: u64 = conn.query_row("SELECT COUNT(*) FROM page_meta", [], |r| r.get(0))?;
        let urls_with_validators: u64 = conn.query_row(
            "SELECT COUNT(*) FROM page_meta WHERE etag IS NOT NULL OR last_modified IS NOT NULL",
            [],
            |r| r.get(0),
        )?;
        let urls_unchanged_streak: u64 = conn.query_row(
            "SELECT COUNT(*) FROM page_meta WHERE no_change_count > 0",
            [],
            |r| r.get(0),
        )?;
        Ok(StoreStats {
            total_urls,
            urls_with_validators,
            urls_unchanged_streak,
        })
    }
}

use crate::frontier::{url_key, UrlRecord};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Number of disk shards
pub const SPILL_SHARDS: usize = 16;

struct Shard {
    path: PathBuf,
    lock: Mutex<()>,
    lines: AtomicU64,
}

/// Hash-sharded disk overflow for the frontier (REGULAR mode only)
///
/// URLs that fit nowhere in memory are appended to one of 16 flat text
/// files, one canonical URL per line, selected by `hash(url) % 16`. Each
/// shard has its own lock and line count, so writers to different shards
/// never contend. The files survive restarts; a fresh `DiskSpill` over the
/// same directory picks the residual back up.
pub struct DiskSpill {
    shards: Vec<Shard>,
    load_cursor: AtomicUsize,
}

impl DiskSpill {
    /// Opens (or creates) the spill directory and counts existing residue
    pub fn open(dir: &Path) -> crate::Result<Self> {
        std::fs::create_dir_all(dir).map_err(|source| crate::TrawlerError::WorkDir {
            path: dir.display().to_string(),
            source,
        })?;

        let mut shards = Vec::with_capacity(SPILL_SHARDS);
        for i in 0..SPILL_SHARDS {
            let path = dir.join(format!("spill-{:02}.urls", i));
            let lines = if path.exists() {
                let file = File::open(&path)?;
                BufReader::new(file).lines().count() as u64
            } else {
                0
            };
            shards.push(Shard {
                path,
                lock: Mutex::new(()),
                lines: AtomicU64::new(lines),
            });
        }

        Ok(Self {
            shards,
            load_cursor: AtomicUsize::new(0),
        })
    }

    fn shard_for(url: &str) -> usize {
        (url_key(url) % SPILL_SHARDS as u64) as usize
    }

    /// Appends a batch of records, grouped by shard to minimize contention
    ///
    /// Returns the number of URLs written.
    pub fn save_urls(&self, records: &[UrlRecord]) -> crate::Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut by_shard: HashMap<usize, Vec<&str>> = HashMap::new();
        for record in records {
            by_shard
                .entry(Self::shard_for(&record.url))
                .or_default()
                .push(record.url.as_str());
        }

        let mut written = 0;
        for (idx, urls) in by_shard {
            let shard = &self.shards[idx];
            let _guard = shard.lock.lock().unwrap_or_else(|e| e.into_inner());

            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&shard.path)?;
            for url in &urls {
                writeln!(file, "{}", url)?;
            }
            file.flush()?;

            shard.lines.fetch_add(urls.len() as u64, Ordering::Relaxed);
            written += urls.len();
        }

        tracing::debug!(written, "spilled URLs to disk");
        Ok(written)
    }

    /// Loads up to `max` URLs, round-robining the shards
    ///
    /// Each visited shard file is rewritten with its residual lines. Loaded
    /// URLs come back as depth-zero records; the frontier's seen-set still
    /// guards against re-fetch within the run.
    pub fn load_urls(&self, max: usize) -> crate::Result<Vec<UrlRecord>> {
        let mut loaded = Vec::with_capacity(max);
        if max == 0 {
            return Ok(loaded);
        }

        let start = self.load_cursor.fetch_add(1, Ordering::Relaxed) % SPILL_SHARDS;
        for i in 0..SPILL_SHARDS {
            if loaded.len() >= max {
                break;
            }
            let shard = &self.shards[(start + i) % SPILL_SHARDS];
            let _guard = shard.lock.lock().unwrap_or_else(|e| e.into_inner());

            if shard.lines.load(Ordering::Relaxed) == 0 || !shard.path.exists() {
                continue;
            }

            let file = File::open(&shard.path)?;
            let lines: Vec<String> = BufReader::new(file)
                .lines()
                .collect::<std::io::Result<_>>()?;

            let take = (max - loaded.len()).min(lines.len());
            for url in &lines[..take] {
                loaded.push(UrlRecord::seed(url.clone()));
            }

            // Rewrite the shard with whatever was not taken
            let residual = &lines[take..];
            let mut file = File::create(&shard.path)?;
            for url in residual {
                writeln!(file, "{}", url)?;
            }
            file.flush()?;
            shard.lines.store(residual.len() as u64, Ordering::Relaxed);
        }

        if !loaded.is_empty() {
            tracing::debug!(loaded = loaded.len(), "reloaded URLs from disk spill");
        }
        Ok(loaded)
    }

    /// URLs currently persisted across all shards
    pub fn total_lines(&self) -> u64 {
        self.shards
            .iter()
            .map(|s| s.lines.load(Ordering::Relaxed))
            .sum()
    }

    /// Removes shard files that have gone empty
    pub fn cleanup_empty_shards(&self) -> crate::Result<usize> {
        let mut removed = 0;
        for shard in &self.shards {
            let _guard = shard.lock.lock().unwrap_or_else(|e| e.into_inner());
            if shard.lines.load(Ordering::Relaxed) == 0 && shard.path.exists() {
                std::fs::remove_file(&shard.path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

//! The URL frontier and its overflow layers
//!
//! URLs waiting to be fetched live, in order of preference, in the
//! partitioned in-memory [`Frontier`], in per-worker [`WorkStealingDeques`],
//! or (REGULAR mode only) in the sharded [`DiskSpill`]. Rate-limited URLs
//! are parked in [`DomainQueues`] until their domain's window reopens.

mod deque;
mod domain_queues;
mod record;
mod spill;

pub use deque::WorkStealingDeques;
pub use domain_queues::DomainQueues;
pub use record::{compute_priority, url_key, UrlRecord, DEPTH_PENALTY, MAX_PRIORITY, MIN_PRIORITY};
pub use spill::DiskSpill;

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Mutex;

/// Heap entry: priority descending, then depth ascending, then insertion order
struct HeapEntry {
    record: UrlRecord,
    seq: u64,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops the maximum: the maximum is the highest priority,
        // then the shallowest, then the earliest inserted.
        self.record
            .priority
            .partial_cmp(&other.record.priority)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.record.depth.cmp(&self.record.depth))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Partition {
    heap: BinaryHeap<HeapEntry>,
    seen: HashSet<u64>,
}

/// Bounded, partitioned priority frontier with lifetime dedup
///
/// The seen-set and heap are split into P partitions keyed by
/// `hash(url) % P`, so an enqueue touches exactly one partition lock.
/// Dequeue scans partitions from a rotating anchor with `try_lock`,
/// skipping contended partitions rather than waiting on them.
///
/// Invariants: a canonical URL enters at most once for the lifetime of the
/// frontier; records deeper than `max_depth` are rejected at enqueue; the
/// total in-memory count never exceeds `max_size`.
pub struct Frontier {
    partitions: Vec<Mutex<Partition>>,
    size: AtomicUsize,
    max_size: AtomicUsize,
    max_depth: AtomicU32,
    anchor: AtomicUsize,
    seq: AtomicU64,
    duplicates: AtomicU64,
}

impl Frontier {
    /// Creates a frontier with the given partition count and limits
    pub fn new(partitions: usize, max_size: usize, max_depth: u32) -> Self {
        let partitions = partitions.max(1);
        Self {
            partitions: (0..partitions).map(|_| Mutex::new(Partition::default())).collect(),
            size: AtomicUsize::new(0),
            max_size: AtomicUsize::new(max_size),
            max_depth: AtomicU32::new(max_depth),
            anchor: AtomicUsize::new(0),
            seq: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
        }
    }

    fn partition_for(&self, key: u64) -> usize {
        (key % self.partitions.len() as u64) as usize
    }

    /// Reserves one slot against the global capacity
    fn reserve_slot(&self) -> bool {
        let max = self.max_size.load(AtomicOrdering::Relaxed);
        self.size
            .fetch_update(AtomicOrdering::Relaxed, AtomicOrdering::Relaxed, |s| {
                if s < max {
                    Some(s + 1)
                } else {
                    None
                }
            })
            .is_ok()
    }

    /// Enqueues a single record
    ///
    /// Returns `false` if the record is deeper than the depth cap, its
    /// canonical URL was already seen, or the frontier is at capacity.
    /// Only the capacity case leaves the URL eligible for a later retry
    /// (the seen-set is not updated for it).
    pub fn enqueue(&self, record: UrlRecord) -> bool {
        if record.depth > self.max_depth.load(AtomicOrdering::Relaxed) {
            return false;
        }

        let key = url_key(&record.url);
        let idx = self.partition_for(key);
        let mut part = self.partitions[idx].lock().unwrap_or_else(|e| e.into_inner());

        if part.seen.contains(&key) {
            self.duplicates.fetch_add(1, AtomicOrdering::Relaxed);
            return false;
        }
        if !self.reserve_slot() {
            return false;
        }

        part.seen.insert(key);
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        part.heap.push(HeapEntry { record, seq });
        true
    }

    /// Enqueues as many records as fit, returning the capacity residual
    ///
    /// Records are grouped by partition so each partition lock is taken at
    /// most once. Duplicates and depth-cap rejects are dropped outright;
    /// only records refused for capacity are returned, for the caller to
    /// spill to a deque or to disk.
    pub fn enqueue_batch(&self, records: Vec<UrlRecord>) -> Vec<UrlRecord> {
        let max_depth = self.max_depth.load(AtomicOrdering::Relaxed);
        let mut residual = Vec::new();
        let mut by_partition: HashMap<usize, Vec<(u64, UrlRecord)>> = HashMap::new();

        for record in records {
            if record.depth > max_depth {
                continue;
            }
            let key = url_key(&record.url);
            by_partition
                .entry(self.partition_for(key))
                .or_default()
                .push((key, record));
        }

        for (idx, group) in by_partition {
            let mut part = self.partitions[idx].lock().unwrap_or_else(|e| e.into_inner());
            for (key, record) in group {
                if part.seen.contains(&key) {
                    self.duplicates.fetch_add(1, AtomicOrdering::Relaxed);
                    continue;
                }
                if !self.reserve_slot() {
                    residual.push(record);
                    continue;
                }
                part.seen.insert(key);
                let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
                part.heap.push(HeapEntry { record, seq });
            }
        }

        residual
    }

    /// Dequeues the best available record
    ///
    /// Partitions are scanned from a rotating anchor; partitions whose lock
    /// is currently held are skipped rather than waited on, so ordering is
    /// strict within a partition but only approximate across them.
    pub fn dequeue(&self) -> Option<UrlRecord> {
        let n = self.partitions.len();
        let start = self.anchor.fetch_add(1, AtomicOrdering::Relaxed) % n;

        for i in 0..n {
            let idx = (start + i) % n;
            let Ok(mut part) = self.partitions[idx].try_lock() else {
                continue;
            };
            if let Some(entry) = part.heap.pop() {
                self.size.fetch_sub(1, AtomicOrdering::Relaxed);
                return Some(entry.record);
            }
        }
        None
    }

    /// Number of records currently queued in memory
    pub fn len(&self) -> usize {
        self.size.load(AtomicOrdering::Relaxed)
    }

    /// True when no records are queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity
    pub fn max_size(&self) -> usize {
        self.max_size.load(AtomicOrdering::Relaxed)
    }

    /// Adjusts the depth cap
    pub fn set_max_depth(&self, max_depth: u32) {
        self.max_depth.store(max_depth, AtomicOrdering::Relaxed);
    }

    /// Adjusts the capacity; queued records above the new cap stay queued
    pub fn set_max_queue_size(&self, max_size: usize) {
        self.max_size.store(max_size, AtomicOrdering::Relaxed);
    }

    /// How many enqueue attempts were dropped as already-seen
    pub fn duplicates_dropped(&self) -> u64 {
        self.duplicates.load(AtomicOrdering::Relaxed)
    }
}

//! `MemoryEngine`: a `BTreeMap` + `RwLock` implementation of [`StorageEngine`].
//!
//! Adapted from the teacher's `UnifiedStore` (BTreeMap-backed, RwLock for
//! thread-safety, `AtomicU64` generation counter), simplified to a plain
//! byte-string keyspace with no TTL or secondary indices — those concerns
//! live above this layer (the engine crate's thread/message indexing).

use crate::engine::{exclusive_after, exclusive_before, BatchOp, Entry, StorageEngine, WriteBatch};
use crate::metrics::{StorageMetrics, StorageMetricsSnapshot};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};

/// An in-memory, ordered key-value store.
#[derive(Default)]
pub struct MemoryEngine {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
    generation: AtomicU64,
    metrics: StorageMetrics,
}

impl MemoryEngine {
    /// An empty engine.
    pub fn new() -> Self {
        MemoryEngine::default()
    }

    /// Point-in-time read/write/scan counters for this engine instance.
    pub fn metrics(&self) -> StorageMetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl StorageEngine for MemoryEngine {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.metrics.record_read();
        self.data.read().get(key).cloned()
    }

    fn seek_ge(&self, key: &str) -> Option<Entry> {
        self.metrics.record_read();
        self.data
            .read()
            .range(key.to_string()..)
            .next()
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    fn seek_lt(&self, key: &str) -> Option<Entry> {
        self.metrics.record_read();
        self.data
            .read()
            .range::<String, _>((Bound::Unbounded, Bound::Excluded(key.to_string())))
            .next_back()
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    fn first(&self) -> Option<Entry> {
        self.metrics.record_read();
        self.data
            .read()
            .iter()
            .next()
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    fn last(&self) -> Option<Entry> {
        self.metrics.record_read();
        self.data
            .read()
            .iter()
            .next_back()
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    fn scan_prefix(&self, prefix: &str) -> Vec<Entry> {
        self.scan_prefix_from(prefix, None, usize::MAX)
    }

    fn scan_prefix_from(&self, prefix: &str, after: Option<&str>, limit: usize) -> Vec<Entry> {
        self.metrics.record_scan();
        let data = self.data.read();
        let lower = exclusive_after(after);
        data.range((lower, Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn scan_prefix_rev_from(&self, prefix: &str, before: Option<&str>, limit: usize) -> Vec<Entry> {
        self.metrics.record_scan();
        let data = self.data.read();
        let upper = exclusive_before(before);
        data.range((Bound::Unbounded, upper))
            .rev()
            .take_while(|(k, _)| k.starts_with(prefix))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn apply_batch(&self, batch: WriteBatch) {
        let mut data = self.data.write();
        let mut writes = 0u64;
        for op in batch.ops() {
            match op {
                BatchOp::Put { key, value } => {
                    data.insert(key.clone(), value.clone());
                    writes += 1;
                }
                BatchOp::Delete { key } => {
                    data.remove(key);
                    writes += 1;
                }
            }
        }
        drop(data);
        self.metrics.record_writes(writes);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

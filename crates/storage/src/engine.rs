//! The `StorageEngine` abstraction (spec.md §4.1): ordered KV with prefix
//! iteration and atomic multi-key batches.
//!
//! Two instances of this trait are wired up by the engine crate — "main"
//! (threads, messages, versions) and "index" (pagination counters) — per
//! spec.md §6. Shaped after the teacher's `Storage` trait
//! (`strata_core::traits::Storage`): ordered-map semantics over opaque
//! byte keys, with a version/generation counter for snapshot isolation.

use std::ops::Bound;

/// A single mutation within an [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Insert or overwrite `key` with `value`.
    Put {
        /// The key to write.
        key: String,
        /// The value to write.
        value: Vec<u8>,
    },
    /// Remove `key`, if present.
    Delete {
        /// The key to remove.
        key: String,
    },
}

/// An ordered set of mutations applied atomically by [`StorageEngine::apply_batch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// An empty batch.
    pub fn new() -> Self {
        WriteBatch::default()
    }

    /// Queue a put.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Put {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Queue a delete.
    pub fn delete(&mut self, key: impl Into<String>) -> &mut Self {
        self.ops.push(BatchOp::Delete { key: key.into() });
        self
    }

    /// Number of queued mutations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the batch has no queued mutations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Iterate queued mutations in insertion order.
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }
}

/// A key/value pair as returned by a scan.
pub type Entry = (String, Vec<u8>);

/// Ordered key-value storage with prefix iteration and atomic batches.
///
/// Implementors need not be durable themselves — durability is the
/// caller's job (write the WAL record, then `apply_batch`). This trait
/// only has to guarantee that a batch is all-or-nothing and that reads
/// observe a consistent snapshot of the map at call time.
pub trait StorageEngine: Send + Sync {
    /// Point lookup.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Whether `key` is present.
    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// The first entry at or after `key`, in key order.
    fn seek_ge(&self, key: &str) -> Option<Entry>;

    /// The last entry strictly before `key`, in key order.
    fn seek_lt(&self, key: &str) -> Option<Entry>;

    /// The first entry in the whole keyspace.
    fn first(&self) -> Option<Entry>;

    /// The last entry in the whole keyspace.
    fn last(&self) -> Option<Entry>;

    /// Every entry whose key starts with `prefix`, in ascending order.
    fn scan_prefix(&self, prefix: &str) -> Vec<Entry>;

    /// Every entry whose key starts with `prefix`, in ascending order,
    /// starting strictly after `after` when given.
    fn scan_prefix_from(&self, prefix: &str, after: Option<&str>, limit: usize) -> Vec<Entry>;

    /// Every entry whose key starts with `prefix`, in descending order,
    /// starting strictly before `before` when given.
    fn scan_prefix_rev_from(&self, prefix: &str, before: Option<&str>, limit: usize) -> Vec<Entry>;

    /// Count of keys with the given prefix. Implementations may keep a
    /// running counter rather than scanning; the in-memory reference
    /// implementation scans.
    fn count_prefix(&self, prefix: &str) -> u64 {
        self.scan_prefix(prefix).len() as u64
    }

    /// Apply every mutation in `batch` atomically.
    fn apply_batch(&self, batch: WriteBatch);

    /// Monotonically increasing counter bumped once per `apply_batch`
    /// call, usable as a cheap "has anything changed" snapshot token.
    fn generation(&self) -> u64;
}

/// Bound helper: map an optional exclusive cursor into a `Bound<String>`
/// for use with `BTreeMap::range`.
pub(crate) fn exclusive_after(key: Option<&str>) -> Bound<String> {
    match key {
        Some(k) => Bound::Excluded(k.to_string()),
        None => Bound::Unbounded,
    }
}

pub(crate) fn exclusive_before(key: Option<&str>) -> Bound<String> {
    match key {
        Some(k) => Bound::Excluded(k.to_string()),
        None => Bound::Unbounded,
    }
}

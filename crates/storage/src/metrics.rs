//! Always-on counters for storage engine activity.
//!
//! Simplified from the teacher's feature-gated `PerfTrace` (latency
//! histograms behind `perf-trace`) down to plain `AtomicU64` counters
//! that cost nothing to keep enabled. [`crate::memory::MemoryEngine`]
//! updates them on every call; nothing exports them anywhere beyond
//! `snapshot()` — there is no metrics sink in scope here.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time counters for a [`crate::engine::StorageEngine`].
#[derive(Debug, Default)]
pub struct StorageMetrics {
    reads: AtomicU64,
    writes: AtomicU64,
    scans: AtomicU64,
}

impl StorageMetrics {
    /// Fresh, zeroed counters.
    pub fn new() -> Self {
        StorageMetrics::default()
    }

    /// Record a point read.
    pub fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an applied batch's write count.
    pub fn record_writes(&self, count: u64) {
        self.writes.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a prefix scan.
    pub fn record_scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot the current counters.
    pub fn snapshot(&self) -> StorageMetricsSnapshot {
        StorageMetricsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            scans: self.scans.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`StorageMetrics`]'s counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageMetricsSnapshot {
    /// Total point reads observed.
    pub reads: u64,
    /// Total individual key writes observed (summed across batches).
    pub writes: u64,
    /// Total prefix scans observed.
    pub scans: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = StorageMetrics::new();
        metrics.record_read();
        metrics.record_read();
        metrics.record_writes(3);
        metrics.record_scan();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.reads, 2);
        assert_eq!(snapshot.writes, 3);
        assert_eq!(snapshot.scans, 1);
    }
}

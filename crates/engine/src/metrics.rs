//! Plain-atomics runtime counters (spec.md §10.2 ambient observability).
//!
//! Not wired to any exporter — there is no metrics transport in scope here
//! — but every counter a deployment would want to scrape sits behind one
//! atomic each, following the teacher's `SchedulerStats`
//! (`engine/src/background.rs`): a flat struct of `AtomicU64`s snapshotted
//! by value, no locking on the read path.

use std::sync::atomic::{AtomicU64, Ordering};

/// A point-in-time snapshot of [`RuntimeMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Ops that reached the ingest queue.
    pub ops_enqueued: u64,
    /// Ops the apply worker committed successfully.
    pub ops_applied: u64,
    /// Ops rejected by compute validation or failed at apply time.
    pub ops_failed: u64,
    /// Ops dropped because the ingest queue was full.
    pub queue_full_rejections: u64,
}

/// Counters updated from the ingest, compute, and apply stages.
#[derive(Debug, Default)]
pub struct RuntimeMetrics {
    ops_enqueued: AtomicU64,
    ops_applied: AtomicU64,
    ops_failed: AtomicU64,
    queue_full_rejections: AtomicU64,
}

impl RuntimeMetrics {
    /// A fresh, zeroed set of counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that an op reached the ingest queue.
    pub fn record_enqueued(&self) {
        self.ops_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Record that the apply worker committed an op.
    pub fn record_applied(&self) {
        self.ops_applied.fetch_add(1, Ordering::Relaxed);
    }

    /// Record that an op was rejected or failed.
    pub fn record_failed(&self) {
        self.ops_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record that `try_enqueue` bounced off a full queue.
    pub fn record_queue_full(&self) {
        self.queue_full_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// A consistent-enough snapshot for a health endpoint or log line;
    /// individual counters may be a few increments stale relative to one
    /// another since each is loaded independently.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ops_enqueued: self.ops_enqueued.load(Ordering::Relaxed),
            ops_applied: self.ops_applied.load(Ordering::Relaxed),
            ops_failed: self.ops_failed.load(Ordering::Relaxed),
            queue_full_rejections: self.queue_full_rejections.load(Ordering::Relaxed),
        }
    }
}

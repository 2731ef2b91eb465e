//! Bounded dead-letter log of ops the apply worker could not commit
//! (spec.md §7): a ring buffer an operator or health endpoint can drain
//! for observability, distinct from the per-caller `AppliedResult` that
//! already reported the error at the time it happened.

use crate::apply::AppliedResult;
use parking_lot::Mutex;
use progressdb_core::error::ProgressError;
use std::collections::VecDeque;

/// One dead-lettered op: enough to diagnose without replaying the WAL.
#[derive(Debug, Clone)]
pub struct FailedOp {
    /// The op's enqueue sequence.
    pub enq_seq: u64,
    /// Why it failed.
    pub error: String,
}

/// A fixed-capacity ring buffer of the most recent apply failures.
/// Oldest entries are dropped once `capacity` is reached, so a sustained
/// failure storm cannot grow this unboundedly.
pub struct FailedOpsLog {
    capacity: usize,
    entries: Mutex<VecDeque<FailedOp>>,
}

impl FailedOpsLog {
    /// A new log holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        FailedOpsLog {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Record an [`AppliedResult`] if it failed; a no-op on success.
    pub fn record(&self, result: &AppliedResult) {
        if let Err(error) = &result.outcome {
            self.push(result.enq_seq, error);
        }
    }

    /// Record a failure directly, for errors surfaced outside the apply
    /// path (e.g. compute-stage rejections).
    pub fn push(&self, enq_seq: u64, error: &ProgressError) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(FailedOp {
            enq_seq,
            error: error.to_string(),
        });
    }

    /// Snapshot the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<FailedOp> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Number of entries currently retained.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::AppliedOutcome;

    #[test]
    fn record_ignores_successes() {
        let log = FailedOpsLog::new(10);
        log.record(&AppliedResult {
            enq_seq: 1,
            outcome: Ok(AppliedOutcome::Thread { thread_key: "t1".into() }),
        });
        assert!(log.is_empty());
    }

    #[test]
    fn record_keeps_failures() {
        let log = FailedOpsLog::new(10);
        log.record(&AppliedResult {
            enq_seq: 1,
            outcome: Err(ProgressError::NotFound("thread t1".into())),
        });
        assert_eq!(log.len(), 1);
        assert_eq!(log.snapshot()[0].enq_seq, 1);
    }

    #[test]
    fn ring_buffer_drops_oldest_past_capacity() {
        let log = FailedOpsLog::new(2);
        log.push(1, &ProgressError::NotFound("a".into()));
        log.push(2, &ProgressError::NotFound("b".into()));
        log.push(3, &ProgressError::NotFound("c".into()));
        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].enq_seq, 2);
        assert_eq!(snapshot[1].enq_seq, 3);
    }
}

//! Stateless compute stage (spec.md §4.5, §4.6): validate a raw op.
//!
//! Seven handlers, one per [`Op`] variant. Each only validates and
//! normalizes input against [`Limits`] — it never touches storage or
//! assigns a `seq`, so many compute workers can run those validations
//! concurrently ahead of the single serialized apply worker. This two-
//! stage split is the same shape as the teacher's
//! `begin_validation`/`apply_writes` separation in `TransactionManager`,
//! generalized from MVCC read-set validation to simple input
//! validation (this domain never rejects an op for conflicting with
//! another in-flight one; conflicts are resolved last-write-wins at
//! apply time instead, per spec.md §4.8).

use crate::op::{ComputedOp, Op};
use crate::queue::{IngestQueue, QueueItem};
use crossbeam_channel::Sender;
use progressdb_core::error::ProgressError;
use progressdb_core::key::validate_thread_key;
use progressdb_core::limits::Limits;
use progressdb_core::types::Timestamp;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Validate and normalize one op. Returns the same op (possibly with
/// defaults filled in) or the validation error that should be surfaced
/// to whichever caller is awaiting this item's result.
pub fn compute_one(op: Op, limits: &Limits) -> Result<Op, ProgressError> {
    validate_thread_key(op.thread_key(), limits)
        .map_err(|e| ProgressError::InvalidInput(e.to_string()))?;

    match &op {
        Op::ThreadCreate { title, .. } | Op::ThreadUpdate { title, .. } => {
            if title.trim().is_empty() {
                return Err(ProgressError::InvalidInput("title must not be empty".into()));
            }
        }
        Op::MessageCreate { body, .. } | Op::MessageUpdate { body, .. } => {
            let encoded = serde_json::to_vec(body)
                .map_err(|e| ProgressError::InvalidInput(e.to_string()))?;
            limits
                .validate_body_length(&encoded)
                .map_err(|e| ProgressError::InvalidInput(e.to_string()))?;
        }
        Op::ReactionAdd { reaction, .. } | Op::ReactionDelete { reaction, .. } => {
            if reaction.trim().is_empty() {
                return Err(ProgressError::InvalidInput("reaction must not be empty".into()));
            }
        }
        Op::ThreadDelete { .. } | Op::MessageDelete { .. } => {}
    }

    Ok(op)
}

/// Spawn `worker_count` compute workers draining `queue`, each pushing
/// successfully validated ops onto `apply_tx` as a [`ComputedOp`].
/// Validation failures are dropped onto `rejected_tx` instead of being
/// silently discarded, so a caller waiting on that `enq_seq` can be
/// told why its op never reached apply.
pub fn spawn_compute_workers(
    queue: Arc<IngestQueue>,
    apply_tx: Sender<ComputedOp>,
    rejected_tx: Sender<(u64, ProgressError)>,
    limits: Limits,
    worker_count: usize,
) -> crate::pool::WorkerPool {
    crate::pool::WorkerPool::spawn("progressdb-compute", worker_count.max(1), move |shutdown: Arc<AtomicBool>| {
        compute_worker_loop(&queue, &apply_tx, &rejected_tx, &limits, &shutdown)
    })
}

fn compute_worker_loop(
    queue: &IngestQueue,
    apply_tx: &Sender<ComputedOp>,
    rejected_tx: &Sender<(u64, ProgressError)>,
    limits: &Limits,
    shutdown: &AtomicBool,
) {
    use std::sync::atomic::Ordering;
    while !shutdown.load(Ordering::Acquire) {
        let Some(QueueItem { enq_seq, op, pooled_buffer }) = queue.try_recv() else {
            std::thread::sleep(std::time::Duration::from_millis(1));
            continue;
        };
        let outcome = compute_one(op, limits);
        if let Some(buf) = pooled_buffer {
            buf.done();
        }
        match outcome {
            Ok(op) => {
                let computed = ComputedOp {
                    op,
                    enq_seq,
                    computed_ts: Timestamp::now(),
                };
                if apply_tx.send(computed).is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = rejected_tx.send((enq_seq, e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> Limits {
        Limits::default()
    }

    #[test]
    fn rejects_empty_title() {
        let op = Op::ThreadCreate {
            thread_key: "t1".into(),
            title: "  ".into(),
            author: "alice".into(),
        };
        assert!(compute_one(op, &limits()).is_err());
    }

    #[test]
    fn rejects_invalid_thread_key() {
        let op = Op::ThreadCreate {
            thread_key: "has space".into(),
            title: "ok".into(),
            author: "alice".into(),
        };
        assert!(compute_one(op, &limits()).is_err());
    }

    #[test]
    fn accepts_valid_message_create() {
        let op = Op::MessageCreate {
            thread_key: "t1".into(),
            author: "alice".into(),
            body: serde_json::json!({"text": "hi"}),
            reply_to: None,
        };
        assert!(compute_one(op, &limits()).is_ok());
    }

    #[test]
    fn rejects_oversized_body() {
        let small_limits = Limits::with_small_limits();
        let op = Op::MessageCreate {
            thread_key: "t1".into(),
            author: "alice".into(),
            body: serde_json::json!({"text": "x".repeat(1000)}),
            reply_to: None,
        };
        assert!(compute_one(op, &small_limits).is_err());
    }

    #[test]
    fn rejects_empty_reaction() {
        let op = Op::ReactionAdd {
            thread_key: "t1".into(),
            msg_key: "m1".into(),
            author: "alice".into(),
            reaction: "".into(),
        };
        assert!(compute_one(op, &limits()).is_err());
    }
}

//! Ingest concurrency: the bounded queue, compute worker pool, and the
//! single serialized apply worker (spec.md §4.5, §4.6, §4.8).
//!
//! The shape is stateless-compute-then-serialized-apply, the same split
//! the teacher's `TransactionManager` draws between `begin_validation`
//! (parallelizable) and `apply_writes` (serialized per branch). Here
//! there is no conflict to detect between concurrent writers — writes
//! are ordered last-write-wins once they reach the single apply worker —
//! so the split exists purely to keep expensive validation off the
//! apply worker's hot path.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod apply;
pub mod buffer_pool;
pub mod compute;
pub mod failed_ops;
pub mod op;
pub mod pool;
pub mod queue;
pub mod registry;

pub use apply::{count_key, decode_computed_op, run_apply_worker, AppliedOutcome, AppliedResult};
pub use buffer_pool::{BufferPool, PooledBuffer};
pub use compute::{compute_one, spawn_compute_workers};
pub use failed_ops::{FailedOp, FailedOpsLog};
pub use op::{ComputedOp, Op};
pub use pool::WorkerPool;
pub use queue::{IngestQueue, QueueItem};
pub use registry::ThreadLockRegistry;

//! Bounded ingest queue (spec.md §4.5).
//!
//! `try_enqueue` never blocks and rejects with `QueueFull` once the
//! bounded channel is at capacity; `enqueue` blocks the caller but can be
//! cancelled by a runtime shutdown signal so a slow producer doesn't wedge
//! `Runtime::shutdown` forever. Built on `crossbeam_channel::bounded`
//! rather than the teacher's condvar-driven `BackgroundScheduler` queue,
//! since a plain bounded MPMC channel already gives blocking/non-blocking
//! send and a `select!`-friendly receiver for cancellation — the teacher's
//! own condvar plumbing is reserved for primitives needing priority
//! ordering, which this FIFO queue does not.

use crate::buffer_pool::{BufferPool, PooledBuffer};
use crate::op::Op;
use crossbeam_channel::{bounded, Receiver, RecvError, SendError, Sender, TrySendError};
use progressdb_core::config::QueueConfig;
use progressdb_core::error::ProgressError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A queued item: the validated-at-the-boundary op, its assigned enqueue
/// sequence, and (for ops with a payload) the pooled buffer `TryEnqueue`
/// copied that payload into. The buffer is single-owner: whichever
/// consumer takes this item off the queue must call
/// [`PooledBuffer::done`] on it exactly once.
#[derive(Debug)]
pub struct QueueItem {
    /// Global monotonic sequence assigned at enqueue time.
    pub enq_seq: u64,
    /// The operation to compute and apply.
    pub op: Op,
    /// The op's payload, copied into a pooled buffer at enqueue time.
    pub pooled_buffer: Option<PooledBuffer>,
}

/// The bounded, multi-producer multi-consumer ingest queue.
pub struct IngestQueue {
    sender: Sender<QueueItem>,
    receiver: Receiver<QueueItem>,
    shutdown_rx: Receiver<()>,
    shutdown_tx: Sender<()>,
    next_enq_seq: AtomicU64,
    pool: Arc<BufferPool>,
}

impl IngestQueue {
    /// Construct a queue bounded by `config.capacity`.
    pub fn new(config: &QueueConfig) -> Arc<Self> {
        let (sender, receiver) = bounded(config.capacity.max(1));
        let (shutdown_tx, shutdown_rx) = bounded(1);
        Arc::new(IngestQueue {
            sender,
            receiver,
            shutdown_rx,
            shutdown_tx,
            next_enq_seq: AtomicU64::new(1),
            pool: BufferPool::new(config.max_pooled_buffer_bytes),
        })
    }

    /// Copy `op`'s payload (if it carries one) into a buffer drawn from
    /// this queue's pool. Ops with no payload (thread mutations,
    /// reactions, deletes) get `None` — there's nothing to pool.
    pub fn acquire_payload_buffer(&self, op: &Op) -> Option<PooledBuffer> {
        let body = match op {
            Op::MessageCreate { body, .. } | Op::MessageUpdate { body, .. } => body,
            _ => return None,
        };
        let mut buf = self.pool.acquire(0);
        if serde_json::to_writer(buf.bytes_mut(), body).is_err() {
            buf.done();
            return None;
        }
        Some(buf)
    }

    /// Allocate the next enqueue sequence without sending anything; used
    /// by callers that need the sequence before building a WAL record.
    pub fn next_seq(&self) -> u64 {
        self.next_enq_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Non-blocking enqueue. Returns `QueueFull` immediately if the
    /// channel is at capacity.
    pub fn try_enqueue(&self, op: Op) -> Result<u64, ProgressError> {
        let enq_seq = self.next_seq();
        let pooled_buffer = self.acquire_payload_buffer(&op);
        self.try_enqueue_item(QueueItem { enq_seq, op, pooled_buffer }).map(|()| enq_seq)
    }

    /// Blocking enqueue: waits for room, but returns early if the runtime
    /// is shutting down.
    pub fn enqueue(&self, op: Op) -> Result<u64, ProgressError> {
        let enq_seq = self.next_seq();
        let pooled_buffer = self.acquire_payload_buffer(&op);
        self.enqueue_item(QueueItem { enq_seq, op, pooled_buffer }).map(|()| enq_seq)
    }

    /// Non-blocking enqueue of a pre-built item, whose `enq_seq` the
    /// caller has already allocated (a caller that must register a
    /// waiter for that sequence before the item is visible to a compute
    /// worker, or WAL replay restoring an original `enq_seq`).
    pub fn try_enqueue_item(&self, item: QueueItem) -> Result<(), ProgressError> {
        match self.sender.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(rejected)) => {
                tracing::warn!(depth = self.len(), "ingest queue full, rejecting enqueue");
                if let Some(buf) = rejected.pooled_buffer {
                    buf.done();
                }
                Err(ProgressError::QueueFull)
            }
            Err(TrySendError::Disconnected(rejected)) => {
                if let Some(buf) = rejected.pooled_buffer {
                    buf.done();
                }
                Err(ProgressError::InternalError("ingest queue is closed".into()))
            }
        }
    }

    /// Blocking enqueue of a pre-built item; see [`Self::try_enqueue_item`].
    pub fn enqueue_item(&self, item: QueueItem) -> Result<(), ProgressError> {
        crossbeam_channel::select! {
            send(self.sender, item) -> result => match result {
                Ok(()) => Ok(()),
                Err(SendError(rejected)) => {
                    if let Some(buf) = rejected.pooled_buffer {
                        buf.done();
                    }
                    Err(ProgressError::InternalError("ingest queue is closed".into()))
                }
            },
            recv(self.shutdown_rx) -> _ => Err(ProgressError::InternalError("runtime is shutting down".into())),
        }
    }

    /// Bump the next-assigned sequence up to at least `at_least`, used
    /// after WAL replay has consumed enqueue sequences directly so a
    /// subsequent live enqueue never reuses one (spec.md §4.3: replay
    /// must preserve original `enq_seq`).
    pub fn restore_next_seq(&self, at_least: u64) {
        self.next_enq_seq.fetch_max(at_least, Ordering::Relaxed);
    }

    /// Block until an item is available or the queue is closed.
    pub fn recv(&self) -> Result<QueueItem, RecvError> {
        self.receiver.recv()
    }

    /// Non-blocking receive, for a compute worker to opportunistically
    /// batch items (spec.md §6 `queue.batch_size`).
    pub fn try_recv(&self) -> Option<QueueItem> {
        self.receiver.try_recv().ok()
    }

    /// Signal every blocked `enqueue` call to return early.
    pub fn signal_shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Whether the queue has no pending items.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Number of buffers currently idle in this queue's pool, for
    /// boundary tests that need to observe a release without a leak.
    #[cfg(test)]
    pub(crate) fn pooled_free_len(&self) -> usize {
        self.pool.free_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_op() -> Op {
        Op::ThreadCreate {
            thread_key: "t1".into(),
            title: "Title".into(),
            author: "alice".into(),
        }
    }

    #[test]
    fn try_enqueue_then_recv_round_trips() {
        let config = QueueConfig::default();
        let queue = IngestQueue::new(&config);
        let seq = queue.try_enqueue(sample_op()).unwrap();
        let item = queue.recv().unwrap();
        assert_eq!(item.enq_seq, seq);
    }

    #[test]
    fn try_enqueue_rejects_when_full() {
        let mut config = QueueConfig::default();
        config.capacity = 1;
        let queue = IngestQueue::new(&config);
        queue.try_enqueue(sample_op()).unwrap();
        let result = queue.try_enqueue(sample_op());
        assert!(matches!(result, Err(ProgressError::QueueFull)));
    }

    #[test]
    fn queue_full_releases_the_pooled_buffer_instead_of_leaking_it() {
        let mut config = QueueConfig::default();
        config.capacity = 1;
        let queue = IngestQueue::new(&config);
        let message_op = || Op::message_create("t1", "alice", b"hello".to_vec());

        queue.try_enqueue(message_op()).unwrap();
        assert_eq!(queue.pooled_free_len(), 0, "the accepted item's buffer is still in flight");

        let result = queue.try_enqueue(message_op());
        assert!(matches!(result, Err(ProgressError::QueueFull)));
        assert_eq!(queue.pooled_free_len(), 1, "the rejected item's buffer must be released, not leaked");
    }

    #[test]
    fn enq_seq_is_monotonic() {
        let config = QueueConfig::default();
        let queue = IngestQueue::new(&config);
        let a = queue.try_enqueue(sample_op()).unwrap();
        let b = queue.try_enqueue(sample_op()).unwrap();
        assert!(b > a);
    }

    #[test]
    fn shutdown_signal_unblocks_pending_enqueue() {
        let mut config = QueueConfig::default();
        config.capacity = 1;
        let queue = IngestQueue::new(&config);
        queue.try_enqueue(sample_op()).unwrap();

        let queue2 = queue.clone();
        let handle = std::thread::spawn(move || queue2.enqueue(sample_op()));

        std::thread::sleep(std::time::Duration::from_millis(20));
        queue.signal_shutdown();
        let result = handle.join().unwrap();
        assert!(result.is_err());
    }
}

//! Pooled byte buffers for ingest payloads (spec.md §4.4, §5).
//!
//! `TryEnqueue` copies an op's payload into a buffer drawn from here
//! before the item is visible to a compute worker. Ownership is
//! single-owner and moves with the [`crate::queue::QueueItem`]; whichever
//! stage finishes with the bytes calls [`PooledBuffer::done`] exactly
//! once to return it. A buffer whose capacity exceeds the pool's
//! configured ceiling is dropped instead of recycled, so one oversized
//! payload can't pin a large allocation in the free list forever.

use parking_lot::Mutex;
use std::sync::Arc;

/// A free list of reusable byte buffers, bounded by `max_pooled_bytes`.
pub struct BufferPool {
    max_pooled_bytes: usize,
    free: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    /// A pool that never recycles buffers larger than `max_pooled_bytes`.
    pub fn new(max_pooled_bytes: usize) -> Arc<Self> {
        Arc::new(BufferPool { max_pooled_bytes, free: Mutex::new(Vec::new()) })
    }

    /// Take a buffer with at least `min_capacity` bytes of room, reusing
    /// one from the free list when one is big enough.
    pub fn acquire(self: &Arc<Self>, min_capacity: usize) -> PooledBuffer {
        let mut free = self.free.lock();
        let buf = match free.iter().position(|b| b.capacity() >= min_capacity) {
            Some(idx) => {
                let mut buf = free.swap_remove(idx);
                buf.clear();
                buf
            }
            None => Vec::with_capacity(min_capacity),
        };
        drop(free);
        PooledBuffer { pool: Some(self.clone()), buf: Some(buf), released: false }
    }

    fn release(&self, buf: Vec<u8>) {
        if buf.capacity() <= self.max_pooled_bytes {
            self.free.lock().push(buf);
        }
        // else: dropped for GC, per queue.max_pooled_buffer_bytes policy.
    }

    /// Number of buffers currently sitting in the free list.
    #[cfg(test)]
    pub(crate) fn free_len(&self) -> usize {
        self.free.lock().len()
    }
}

/// A single-owner byte buffer borrowed from a [`BufferPool`].
///
/// Must have [`PooledBuffer::done`] called exactly once. If it's dropped
/// without that call, the buffer is still returned to the pool (or
/// dropped, if oversize) but a warning is logged, since that indicates a
/// consumer fell off the happy path somewhere upstream.
pub struct PooledBuffer {
    pool: Option<Arc<BufferPool>>,
    buf: Option<Vec<u8>>,
    released: bool,
}

impl PooledBuffer {
    /// The buffer's current contents.
    pub fn bytes(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }

    /// Mutable access for filling the buffer before handing it off.
    pub fn bytes_mut(&mut self) -> &mut Vec<u8> {
        self.buf.as_mut().expect("pooled buffer already released")
    }

    /// Release ownership back to the pool. Must be called exactly once.
    pub fn done(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let (Some(pool), Some(buf)) = (self.pool.take(), self.buf.take()) {
            pool.release(buf);
        }
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer").field("len", &self.bytes().len()).finish()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!("pooled buffer dropped without calling done()");
            self.release_inner();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_done_returns_buffer_to_pool() {
        let pool = BufferPool::new(1024);
        let mut buf = pool.acquire(16);
        buf.bytes_mut().extend_from_slice(b"hello");
        buf.done();
        assert_eq!(pool.free_len(), 1);
    }

    #[test]
    fn reacquire_reuses_a_released_buffer() {
        let pool = BufferPool::new(1024);
        let buf = pool.acquire(16);
        buf.done();
        assert_eq!(pool.free_len(), 1);

        let _buf2 = pool.acquire(8);
        assert_eq!(pool.free_len(), 0);
    }

    #[test]
    fn oversize_buffer_is_dropped_not_pooled() {
        let pool = BufferPool::new(4);
        let buf = pool.acquire(64);
        buf.done();
        assert_eq!(pool.free_len(), 0);
    }

    #[test]
    fn drop_without_done_still_releases() {
        let pool = BufferPool::new(1024);
        {
            let _buf = pool.acquire(16);
        }
        assert_eq!(pool.free_len(), 1);
    }

    #[test]
    fn done_does_not_double_push_onto_the_free_list() {
        // `done(self)` both runs the method body and, via ownership, the
        // buffer's `Drop` glue right after. The `released` guard must
        // keep that from pushing the same `Vec` twice.
        let pool = BufferPool::new(1024);
        let buf = pool.acquire(16);
        buf.done();
        assert_eq!(pool.free_len(), 1);
    }
}

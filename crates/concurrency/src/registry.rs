//! Per-thread serialization locks (spec.md §4.6).
//!
//! One lock per `thread_key`, created lazily on first use and never
//! removed — threads are cheap and long-lived, so there is no purge
//! policy to get wrong. Mirrors the teacher's `TransactionManager`
//! per-branch commit locks (`DashMap<BranchId, Mutex<()>>`), which exist
//! for the identical reason: prevent a TOCTOU race between reading the
//! current sequence/version and writing the next one.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Lazily-populated registry of per-thread apply locks.
#[derive(Default)]
pub struct ThreadLockRegistry {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ThreadLockRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        ThreadLockRegistry::default()
    }

    /// Get or create the lock for `thread_key`.
    pub fn lock_for(&self, thread_key: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.get(thread_key) {
            return lock.clone();
        }
        self.locks
            .entry(thread_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Number of distinct threads with a registered lock. Exposed for
    /// tests and diagnostics; not load-bearing for correctness.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether the registry has no registered locks.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn same_thread_key_returns_same_lock() {
        let registry = ThreadLockRegistry::new();
        let a = registry.lock_for("t1");
        let b = registry.lock_for("t1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn different_thread_keys_get_distinct_locks() {
        let registry = ThreadLockRegistry::new();
        let a = registry.lock_for("t1");
        let b = registry.lock_for("t2");
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn concurrent_access_to_same_thread_serializes() {
        let registry = Arc::new(ThreadLockRegistry::new());
        let counter = Arc::new(Mutex::new(0usize));
        let barrier = Arc::new(Barrier::new(4));
        let mut handles = Vec::new();

        for _ in 0..4 {
            let registry = registry.clone();
            let counter = counter.clone();
            let barrier = barrier.clone();
            handles.push(thread::spawn(move || {
                barrier.wait();
                let lock = registry.lock_for("shared");
                let _guard = lock.lock();
                let mut value = counter.lock();
                let seen = *value;
                *value = seen + 1;
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*counter.lock(), 4);
    }
}

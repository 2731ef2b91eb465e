//! A fixed-size named thread pool (spec.md §6 `ingest.compute_worker_count`).
//!
//! Each worker runs `body` in a loop until `shutdown` is signalled.
//! Adapted from the teacher's `BackgroundScheduler` worker-spawn loop
//! (`AtomicBool` shutdown flag, `JoinHandle` collection joined on
//! `shutdown()`), dropping the priority heap and condvar bookkeeping
//! since compute workers pull from a shared channel rather than a
//! scheduler-owned queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// A pool of named worker threads sharing one shutdown flag.
pub struct WorkerPool {
    shutdown: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` threads named `{name_prefix}-{i}`, each running
    /// `body(shutdown_flag)` until it returns.
    pub fn spawn<F>(name_prefix: &str, count: usize, body: F) -> Self
    where
        F: Fn(Arc<AtomicBool>) + Send + Sync + Clone + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(count);
        for i in 0..count {
            let shutdown = shutdown.clone();
            let body = body.clone();
            let handle = std::thread::Builder::new()
                .name(format!("{name_prefix}-{i}"))
                .spawn(move || body(shutdown))
                .expect("failed to spawn worker thread");
            workers.push(handle);
        }
        WorkerPool { shutdown, workers }
    }

    /// Signal every worker to stop and join them all.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Release);
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }

    /// Whether shutdown has been signalled, without joining.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn workers_run_until_shutdown() {
        let counter = Arc::new(AtomicU64::new(0));
        let counter_clone = counter.clone();
        let pool = WorkerPool::spawn("test-worker", 2, move |shutdown| {
            while !shutdown.load(Ordering::Acquire) {
                counter_clone.fetch_add(1, Ordering::Relaxed);
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        pool.shutdown();
        assert!(counter.load(Ordering::Relaxed) > 0);
    }
}

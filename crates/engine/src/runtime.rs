//! The embedding entry point (spec.md §2, §6): owns the storage engines,
//! the ingest queue, and every background thread in the compute/apply
//! pipeline, and is the only thing a caller constructs directly.
//!
//! `open` wires the pipeline, replays the WAL before returning so no
//! caller ever observes a partially-recovered store, and spawns a
//! dispatcher thread that routes each apply outcome back to whichever
//! `enqueue` call is waiting on it. This registry-of-waiters pattern is
//! the synchronous-request-over-an-async-pipeline shape the teacher uses
//! for `Database::open`'s single-instance-per-path bookkeeping
//! (`database/registry.rs`), adapted here to route per-request results
//! instead of deduplicating open handles.

use crate::failed_ops_sink::FailedOpsDiskSink;
use crate::metrics::{MetricsSnapshot, RuntimeMetrics};
use crate::paths::DatabasePaths;
use crossbeam_channel::{bounded, unbounded, Sender};
use dashmap::DashMap;
use progressdb_concurrency::{
    decode_computed_op, run_apply_worker, spawn_compute_workers, AppliedOutcome, AppliedResult,
    ComputedOp, FailedOp, FailedOpsLog, IngestQueue, Op, QueueItem, ThreadLockRegistry, WorkerPool,
};
use progressdb_core::config::RuntimeConfig;
use progressdb_core::error::{ProgressError, ProgressResult};
use progressdb_core::key::WAL_SYNC_MARKER_KEY;
use progressdb_core::limits::Limits;
use progressdb_durability::record::RecordKind;
use progressdb_durability::wal::Wal;
use progressdb_security::{Kms, LocalKms};
use progressdb_storage::engine::StorageEngine;
use progressdb_storage::memory::MemoryEngine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const MASTER_KEY_LEN: usize = 32;
const QUEUE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// The embedded runtime: storage, the ingest pipeline, and every thread
/// that keeps it moving.
pub struct Runtime {
    pub(crate) config: RuntimeConfig,
    pub(crate) limits: Limits,
    pub(crate) main: Arc<dyn StorageEngine>,
    pub(crate) index: Arc<dyn StorageEngine>,
    pub(crate) kms: Arc<dyn Kms>,
    queue: Arc<IngestQueue>,
    #[allow(dead_code)]
    registry: Arc<ThreadLockRegistry>,
    failed_ops: Arc<FailedOpsLog>,
    failed_ops_disk: Arc<FailedOpsDiskSink>,
    waiters: Arc<DashMap<u64, Sender<AppliedResult>>>,
    metrics: Arc<RuntimeMetrics>,
    paths: DatabasePaths,
    accepting: Arc<AtomicBool>,
    compute_pool: Option<WorkerPool>,
    apply_shutdown: Arc<AtomicBool>,
    apply_handle: Option<JoinHandle<()>>,
    dispatch_handle: Option<JoinHandle<()>>,
    reject_handle: Option<JoinHandle<()>>,
}

impl Runtime {
    /// Open (or create) a database at `dir`: ensure the directory layout,
    /// load or mint the local KMS master key, replay the WAL, and start
    /// the compute/apply pipeline. Returns only once replay has fully
    /// drained, so no `enqueue`/read call made on the returned `Runtime`
    /// can observe a partially-recovered store.
    pub fn open(dir: impl AsRef<Path>, mut config: RuntimeConfig) -> ProgressResult<Self> {
        config.data_dir = dir.as_ref().to_path_buf();
        let paths = DatabasePaths::ensure(&config.data_dir)?;
        let limits = Limits::default();

        let main: Arc<dyn StorageEngine> = Arc::new(MemoryEngine::new());
        let index: Arc<dyn StorageEngine> = Arc::new(MemoryEngine::new());

        let store_watermark = load_snapshot_onto(&main, &paths.store_snapshot())?;
        let index_watermark = load_snapshot_onto(&index, &paths.index_snapshot())?;
        let snapshot_watermark = store_watermark.min(index_watermark);

        let master_key = load_or_create_master_key(&paths.kms_master_key_file())?;
        let kms: Arc<dyn Kms> = Arc::new(LocalKms::new(&master_key));

        let queue = IngestQueue::new(&config.queue);
        let registry = Arc::new(ThreadLockRegistry::new());
        let failed_ops = Arc::new(FailedOpsLog::new(1024));
        let failed_ops_disk = Arc::new(FailedOpsDiskSink::new(paths.state_audit()));
        let waiters: Arc<DashMap<u64, Sender<AppliedResult>>> = Arc::new(DashMap::new());
        let metrics = Arc::new(RuntimeMetrics::new());
        let accepting = Arc::new(AtomicBool::new(true));

        let (apply_tx, apply_rx) = unbounded::<ComputedOp>();
        let (results_tx, results_rx) = unbounded::<AppliedResult>();
        let (rejected_tx, rejected_rx) = unbounded::<(u64, ProgressError)>();

        let compute_pool = spawn_compute_workers(
            queue.clone(),
            apply_tx.clone(),
            rejected_tx,
            limits.clone(),
            config.ingest.compute_worker_count,
        );

        let wal = Wal::open(paths.wal(), config.wal.clone())
            .map_err(|e| ProgressError::WalError(e.to_string()))?;

        let apply_shutdown = Arc::new(AtomicBool::new(false));
        let apply_handle = {
            let main = main.clone();
            let index = index.clone();
            let registry = registry.clone();
            let kms = kms.clone();
            let ingest_cfg = config.ingest.clone();
            let enc_cfg = config.encryption.clone();
            let shutdown = apply_shutdown.clone();
            let store_snapshot_path = paths.store_snapshot();
            let index_snapshot_path = paths.index_snapshot();
            std::thread::Builder::new()
                .name("progressdb-apply".into())
                .spawn(move || {
                    run_apply_worker(
                        apply_rx,
                        main,
                        index,
                        wal,
                        registry,
                        ingest_cfg,
                        enc_cfg,
                        kms,
                        results_tx,
                        shutdown,
                        store_snapshot_path,
                        index_snapshot_path,
                    )
                })
                .expect("spawning the apply worker thread")
        };

        // Replay directly into the apply stage (bypassing the queue and
        // compute, which would stamp a fresh timestamp and break
        // msg_key/version_key determinism), blocking until every replayed
        // record has been applied before any caller can enqueue. Records
        // already covered by a loaded snapshot are skipped; only the tail
        // since the last checkpoint needs to be re-applied.
        let mut max_replayed_seq = snapshot_watermark;
        let mut replay_count = 0u64;
        if config.wal.enabled {
            let recovered =
                Wal::recover(&paths.wal()).map_err(|e| ProgressError::WalError(e.to_string()))?;
            for rec in recovered {
                if rec.record.kind != RecordKind::Enqueue {
                    continue;
                }
                if rec.record.enq_seq <= snapshot_watermark {
                    continue;
                }
                let (op, computed_ts) = decode_computed_op(&rec.record.payload)
                    .map_err(|e| ProgressError::WalError(format!("corrupt wal payload: {e}")))?;
                max_replayed_seq = max_replayed_seq.max(rec.record.enq_seq);
                let item = ComputedOp { op, enq_seq: rec.record.enq_seq, computed_ts };
                if apply_tx.send(item).is_err() {
                    break;
                }
                replay_count += 1;
            }
        }
        drop(apply_tx);
        if max_replayed_seq > 0 {
            queue.restore_next_seq(max_replayed_seq + 1);
        }

        for _ in 0..replay_count {
            let Ok(result) = results_rx.recv() else { break };
            failed_ops.record(&result);
            match &result.outcome {
                Ok(_) => metrics.record_applied(),
                Err(e) => {
                    metrics.record_failed();
                    failed_ops_disk.append(result.enq_seq, e);
                }
            }
        }
        if replay_count > 0 {
            tracing::info!(replay_count, max_replayed_seq, "wal replay complete");
        }

        let dispatch_handle = {
            let waiters = waiters.clone();
            let failed_ops = failed_ops.clone();
            let failed_ops_disk = failed_ops_disk.clone();
            let metrics = metrics.clone();
            std::thread::Builder::new()
                .name("progressdb-dispatch".into())
                .spawn(move || {
                    while let Ok(result) = results_rx.recv() {
                        failed_ops.record(&result);
                        match &result.outcome {
                            Ok(_) => metrics.record_applied(),
                            Err(e) => {
                                metrics.record_failed();
                                failed_ops_disk.append(result.enq_seq, e);
                            }
                        }
                        if let Some((_, sender)) = waiters.remove(&result.enq_seq) {
                            let _ = sender.send(result);
                        }
                    }
                })
                .expect("spawning the dispatch thread")
        };

        let reject_handle = {
            let waiters = waiters.clone();
            let failed_ops = failed_ops.clone();
            let failed_ops_disk = failed_ops_disk.clone();
            let metrics = metrics.clone();
            std::thread::Builder::new()
                .name("progressdb-rejected".into())
                .spawn(move || {
                    while let Ok((enq_seq, error)) = rejected_rx.recv() {
                        failed_ops.push(enq_seq, &error);
                        failed_ops_disk.append(enq_seq, &error);
                        metrics.record_failed();
                        if let Some((_, sender)) = waiters.remove(&enq_seq) {
                            let _ = sender.send(AppliedResult { enq_seq, outcome: Err(error) });
                        }
                    }
                })
                .expect("spawning the rejected-ops thread")
        };

        Ok(Runtime {
            config,
            limits,
            main,
            index,
            kms,
            queue,
            registry,
            failed_ops,
            failed_ops_disk,
            waiters,
            metrics,
            paths,
            accepting,
            compute_pool: Some(compute_pool),
            apply_shutdown,
            apply_handle: Some(apply_handle),
            dispatch_handle: Some(dispatch_handle),
            reject_handle: Some(reject_handle),
        })
    }

    /// Enqueue `op` and block until the apply worker has committed or
    /// rejected it. The wait is implemented by registering a one-shot
    /// channel under `op`'s `enq_seq` before the item becomes visible to
    /// a compute worker, closing the race where the apply worker could
    /// otherwise finish before anyone was listening.
    pub fn enqueue(&self, op: Op) -> ProgressResult<AppliedOutcome> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(ProgressError::InternalError("runtime is shutting down".into()));
        }
        self.metrics.record_enqueued();

        let enq_seq = self.queue.next_seq();
        let (tx, rx) = bounded(1);
        self.waiters.insert(enq_seq, tx);

        let pooled_buffer = self.queue.acquire_payload_buffer(&op);
        if let Err(e) = self.queue.try_enqueue_item(QueueItem { enq_seq, op, pooled_buffer }) {
            self.waiters.remove(&enq_seq);
            if matches!(e, ProgressError::QueueFull) {
                self.metrics.record_queue_full();
            }
            return Err(e);
        }

        match rx.recv() {
            Ok(result) => result.outcome,
            Err(_) => Err(ProgressError::InternalError(
                "apply pipeline disconnected before responding".into(),
            )),
        }
    }

    /// Stop accepting new writes, drain the queue, and join every
    /// background thread in order: compute workers first (they are the
    /// only other sender on the apply channel), then the apply worker
    /// (whose exit flushes and truncates the WAL one last time), then the
    /// dispatch and rejection threads, whose channels close once the
    /// apply worker and compute pool are gone.
    pub fn shutdown(&mut self) -> ProgressResult<()> {
        self.accepting.store(false, Ordering::Release);
        self.queue.signal_shutdown();

        let crash_dir = self.paths.state_crash();
        let deadline = Instant::now() + QUEUE_DRAIN_TIMEOUT;
        while !self.queue.is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        if !self.queue.is_empty() {
            dump_crash(&crash_dir, "drain_queue", self.queue.len());
        }

        if let Some(pool) = self.compute_pool.take() {
            pool.shutdown();
        }

        self.apply_shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.apply_handle.take() {
            join_with_timeout(handle, "apply_worker", self.queue.len(), &crash_dir, JOIN_TIMEOUT);
        }
        if let Some(handle) = self.dispatch_handle.take() {
            join_with_timeout(handle, "dispatch", self.waiters.len(), &crash_dir, JOIN_TIMEOUT);
        }
        if let Some(handle) = self.reject_handle.take() {
            join_with_timeout(handle, "rejected_ops", self.waiters.len(), &crash_dir, JOIN_TIMEOUT);
        }
        Ok(())
    }

    /// Read the WAL liveness marker the apply worker stamps after every
    /// successful truncation sweep (spec.md §6, §11).
    pub fn wal_sync_marker(&self) -> Option<String> {
        self.main.get(WAL_SYNC_MARKER_KEY).and_then(|bytes| String::from_utf8(bytes).ok())
    }

    /// A snapshot of the runtime's plain-atomics counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// The most recent apply/compute failures, oldest first.
    pub fn failed_ops(&self) -> Vec<FailedOp> {
        self.failed_ops.snapshot()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if self.apply_handle.is_some() {
            let _ = self.shutdown();
        }
    }
}

/// Apply a previously-written snapshot (if one exists) onto a freshly
/// constructed engine and return the watermark it was taken at, or `0`
/// if there is no snapshot yet. Called before WAL replay so replay only
/// has to cover the tail since the last checkpoint.
fn load_snapshot_onto(engine: &Arc<dyn StorageEngine>, path: &Path) -> ProgressResult<u64> {
    match progressdb_storage::snapshot::load(path) {
        Ok(Some((watermark, batch))) => {
            engine.apply_batch(batch);
            Ok(watermark)
        }
        Ok(None) => Ok(0),
        Err(e) => Err(ProgressError::InternalError(format!("loading snapshot {}: {e}", path.display()))),
    }
}

fn load_or_create_master_key(path: &Path) -> ProgressResult<Vec<u8>> {
    if let Ok(existing) = std::fs::read(path) {
        if existing.len() == MASTER_KEY_LEN {
            return Ok(existing);
        }
    }
    let mut key = vec![0u8; MASTER_KEY_LEN];
    OsRng.fill_bytes(&mut key);
    std::fs::write(path, &key)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        std::fs::set_permissions(path, perms)?;
    }
    Ok(key)
}

#[derive(Serialize)]
struct CrashDump<'a> {
    stage: &'a str,
    pending: usize,
    at: String,
}

fn dump_crash(dir: &Path, stage: &str, pending: usize) {
    let stamp = progressdb_core::types::Timestamp::now().to_rfc3339_nanos();
    let dump = CrashDump { stage, pending, at: stamp.clone() };
    let Ok(json) = serde_json::to_vec_pretty(&dump) else { return };
    let filename = format!("shutdown_timeout_{stage}_{}.json", stamp.replace(':', "-"));
    let _ = std::fs::write(dir.join(filename), json);
}

fn join_with_timeout(handle: JoinHandle<()>, stage: &str, pending: usize, crash_dir: &Path, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    loop {
        if handle.is_finished() {
            let _ = handle.join();
            return;
        }
        if Instant::now() >= deadline {
            tracing::error!(stage, pending, "shutdown stage exceeded its timeout");
            dump_crash(crash_dir, stage, pending);
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_enqueue_and_shutdown_round_trips() {
        let dir = tempdir().unwrap();
        let mut rt = Runtime::open(dir.path(), RuntimeConfig::default()).unwrap();

        let outcome = rt.enqueue(Op::thread_create("t1", "Title", "alice")).unwrap();
        assert!(matches!(outcome, AppliedOutcome::Thread { .. }));

        let outcome = rt.enqueue(Op::message_create("t1", "alice", b"hello".to_vec())).unwrap();
        assert!(matches!(outcome, AppliedOutcome::Message { .. }));

        assert_eq!(crate::index::message_count(rt.index.as_ref(), "t1"), 1);
        rt.shutdown().unwrap();
    }

    #[test]
    fn duplicate_thread_create_conflicts() {
        let dir = tempdir().unwrap();
        let rt = Runtime::open(dir.path(), RuntimeConfig::default()).unwrap();
        rt.enqueue(Op::thread_create("t1", "Title", "alice")).unwrap();
        let result = rt.enqueue(Op::thread_create("t1", "Other", "alice"));
        assert!(matches!(result, Err(ProgressError::Conflict(_))));
    }

    #[test]
    fn message_update_by_non_author_is_rejected() {
        let dir = tempdir().unwrap();
        let rt = Runtime::open(dir.path(), RuntimeConfig::default()).unwrap();
        rt.enqueue(Op::thread_create("t1", "Title", "alice")).unwrap();
        let AppliedOutcome::Message { msg_key } =
            rt.enqueue(Op::message_create("t1", "alice", b"hi".to_vec())).unwrap()
        else {
            panic!("expected Message outcome");
        };
        let result = rt.enqueue(Op::message_update("t1", msg_key, "bob", b"edited".to_vec()));
        assert!(matches!(result, Err(ProgressError::Unauthorized(_))));
    }

    #[test]
    fn enqueue_after_shutdown_is_rejected() {
        let dir = tempdir().unwrap();
        let mut rt = Runtime::open(dir.path(), RuntimeConfig::default()).unwrap();
        rt.shutdown().unwrap();
        let result = rt.enqueue(Op::thread_create("t1", "Title", "alice"));
        assert!(result.is_err());
    }

    #[test]
    fn wal_replay_reconstructs_state_after_reopen() {
        let dir = tempdir().unwrap();
        let config = RuntimeConfig::default();
        {
            let rt = Runtime::open(dir.path(), config.clone()).unwrap();
            rt.enqueue(Op::thread_create("t1", "Title", "alice")).unwrap();
            rt.enqueue(Op::message_create("t1", "alice", b"hello".to_vec())).unwrap();
            rt.enqueue(Op::message_create("t1", "alice", b"world".to_vec())).unwrap();
        }

        let rt2 = Runtime::open(dir.path(), config).unwrap();
        assert_eq!(crate::index::message_count(rt2.index.as_ref(), "t1"), 2);
    }

    #[test]
    fn master_key_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let config = RuntimeConfig::default();
        let key_path = DatabasePaths::ensure(dir.path()).unwrap().kms_master_key_file();
        {
            let _rt = Runtime::open(dir.path(), config.clone()).unwrap();
        }
        let first = std::fs::read(&key_path).unwrap();
        {
            let _rt = Runtime::open(dir.path(), config).unwrap();
        }
        let second = std::fs::read(&key_path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn state_survives_reopen_after_a_snapshot_truncates_the_wal() {
        let dir = tempdir().unwrap();
        let mut config = RuntimeConfig::default();
        config.ingest.apply_batch_count = 1;
        config.wal.max_file_size = 64;

        {
            let rt = Runtime::open(dir.path(), config.clone()).unwrap();
            rt.enqueue(Op::thread_create("t1", "Title", "alice")).unwrap();
            for i in 0..10 {
                rt.enqueue(Op::message_create("t1", "alice", format!("msg{i}").into_bytes())).unwrap();
            }
        }

        let paths = DatabasePaths::ensure(dir.path()).unwrap();
        assert!(paths.store_snapshot().exists(), "a checkpoint should have written a store snapshot");

        let rt2 = Runtime::open(dir.path(), config).unwrap();
        assert_eq!(crate::index::message_count(rt2.index.as_ref(), "t1"), 10);
        let thread = rt2.get_thread("t1").unwrap();
        assert_eq!(thread.title, "Title");
    }
}

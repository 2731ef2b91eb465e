//! The single serialized apply worker (spec.md §4.6, §4.8).
//!
//! Unlike compute, there is exactly one apply worker: it is the only
//! writer of `seq` values and the only caller of `StorageEngine::apply_batch`
//! on the main engine, so sequencing is trivially total without a
//! distributed consensus step. It still takes the per-thread lock from
//! [`crate::registry::ThreadLockRegistry`] around each op's
//! read-modify-write, both to document the invariant and so a future
//! second apply worker (sharded by thread, say) doesn't silently break it.
//! WAL-before-storage ordering follows the teacher's
//! `TransactionManager` commit sequence (append the record, THEN apply to
//! storage — a crash between the two is safe because recovery replays the
//! WAL).

use crate::op::{ComputedOp, Op};
use crate::registry::ThreadLockRegistry;
use crossbeam_channel::{Receiver, Sender};
use progressdb_core::config::{EncryptionConfig, IngestConfig};
use progressdb_core::error::ProgressError;
use progressdb_core::key::{KeyEncoder, WAL_SYNC_MARKER_KEY};
use progressdb_core::model::{Message, Thread, Version};
use progressdb_core::types::Timestamp;
use progressdb_durability::record::WalRecord;
use progressdb_durability::truncate::truncate_before;
use progressdb_durability::wal::Wal;
use progressdb_security::{generate_dek, EnvelopeCipher, Kms};
use progressdb_storage::engine::{StorageEngine, WriteBatch};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What applying one op produced, for callers waiting on its `enq_seq`.
#[derive(Debug, Clone, PartialEq)]
pub enum AppliedOutcome {
    /// A thread-level mutation; carries the thread's meta key.
    Thread {
        /// The thread meta key.
        thread_key: String,
    },
    /// A message-level mutation; carries the message's storage key.
    Message {
        /// The message's storage key (`MessageId`).
        msg_key: String,
    },
    /// This `enq_seq` was already applied in a previous run; WAL replay
    /// re-drove it but the apply worker recognized the idempotency
    /// marker and skipped re-applying it (spec.md §4.3: replay must not
    /// double-apply a record that reached storage before a crash).
    AlreadyApplied,
}

/// The apply worker's report for one computed op.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedResult {
    /// The op's enqueue sequence.
    pub enq_seq: u64,
    /// Success or the error to surface to the waiting caller.
    pub outcome: Result<AppliedOutcome, ProgressError>,
}

/// Drive the apply worker until `shutdown` is set, reading computed ops
/// from `apply_rx` and reporting outcomes on `results_tx`. `kms` wraps
/// fresh per-thread DEKs on `ThreadCreate` and unwraps them to encrypt
/// message bodies (spec.md §4.8) when `encryption.enabled`.
#[allow(clippy::too_many_arguments)]
pub fn run_apply_worker(
    apply_rx: Receiver<ComputedOp>,
    main: Arc<dyn StorageEngine>,
    index: Arc<dyn StorageEngine>,
    mut wal: Wal,
    registry: Arc<ThreadLockRegistry>,
    config: IngestConfig,
    encryption: EncryptionConfig,
    kms: Arc<dyn Kms>,
    results_tx: Sender<AppliedResult>,
    shutdown: Arc<AtomicBool>,
    store_snapshot_path: PathBuf,
    index_snapshot_path: PathBuf,
) {
    let mut writes_since_flush = 0usize;
    let mut watermark = 0u64;

    while !shutdown.load(Ordering::Acquire) {
        let Ok(item) = apply_rx.recv_timeout(config.apply_batch_timeout) else {
            let _ = wal.flush();
            checkpoint(&wal, &main, &index, &store_snapshot_path, &index_snapshot_path, watermark);
            writes_since_flush = 0;
            continue;
        };

        let enq_seq = item.enq_seq;
        let wal_record = WalRecord::enqueue(enq_seq, encode_computed_op(&item.op, item.computed_ts));
        if wal.append(&wal_record).is_err() {
            tracing::error!(enq_seq, "wal append failed; op not applied");
            let _ = results_tx.send(AppliedResult {
                enq_seq,
                outcome: Err(ProgressError::WalError("append failed".into())),
            });
            continue;
        }

        let lock = registry.lock_for(item.op.thread_key());
        let _guard = lock.lock();
        let outcome = apply_one(&main, &index, &encryption, kms.as_ref(), item);
        if let Err(e) = &outcome.outcome {
            tracing::warn!(enq_seq, error = %e, "apply failed");
        }
        watermark = watermark.max(enq_seq);
        let _ = results_tx.send(outcome);

        writes_since_flush += 1;
        if writes_since_flush >= config.apply_batch_count {
            let _ = wal.flush();
            checkpoint(&wal, &main, &index, &store_snapshot_path, &index_snapshot_path, watermark);
            tracing::debug!(writes_since_flush, "apply batch committed, wal flushed");
            writes_since_flush = 0;
        }
    }
    let _ = wal.flush();
    checkpoint(&wal, &main, &index, &store_snapshot_path, &index_snapshot_path, watermark);
}

/// Snapshot both engines to disk at `watermark` and only then retire WAL
/// segments below the active one: mirrors the teacher's WAL-only
/// compaction, which refuses to remove a segment until a snapshot
/// watermark actually covers it (`CompactionError::NoSnapshot`). A failed
/// snapshot write leaves the WAL untouched, so a crash right after can
/// still replay from the beginning.
fn checkpoint(
    wal: &Wal,
    main: &Arc<dyn StorageEngine>,
    index: &Arc<dyn StorageEngine>,
    store_snapshot_path: &std::path::Path,
    index_snapshot_path: &std::path::Path,
    watermark: u64,
) {
    let store_snapshot = progressdb_storage::snapshot::write(main.as_ref(), store_snapshot_path, watermark);
    let index_snapshot = progressdb_storage::snapshot::write(index.as_ref(), index_snapshot_path, watermark);
    if let Err(e) = &store_snapshot {
        tracing::warn!(error = %e, "store snapshot failed; wal segments kept");
    }
    if let Err(e) = &index_snapshot {
        tracing::warn!(error = %e, "index snapshot failed; wal segments kept");
    }
    if store_snapshot.is_err() || index_snapshot.is_err() {
        return;
    }
    if truncate_before(wal.dir(), wal.current_segment_number()).is_ok() {
        write_sync_marker(main);
    }
}

/// Stamp `__progressdb_wal_sync_marker__` with the current time, read by
/// [`crate::apply`]'s caller as a liveness probe for "the WAL has been
/// truncated at least this recently" (spec.md §6, §11).
fn write_sync_marker(main: &Arc<dyn StorageEngine>) {
    let mut batch = WriteBatch::new();
    batch.put(WAL_SYNC_MARKER_KEY, Timestamp::now().to_rfc3339_nanos().into_bytes());
    main.apply_batch(batch);
}

/// Apply one op's effect immediately: this is the commit point per op
/// (each op gets its own storage transaction), while WAL fsyncs are
/// still coalesced across ops via `config.apply_batch_count`/
/// `apply_batch_timeout`. Per-op storage commits (rather than batching
/// storage writes across ops too) keep the index counters in
/// `bump_count` correct: they read-modify-write against `index`
/// directly, so two ops touching the same thread's counter within one
/// WAL-fsync window must not be allowed to race on a stale read.
fn apply_one(
    main: &Arc<dyn StorageEngine>,
    index: &Arc<dyn StorageEngine>,
    encryption: &EncryptionConfig,
    kms: &dyn Kms,
    item: ComputedOp,
) -> AppliedResult {
    let enq_seq = item.enq_seq;
    let marker = applied_marker_key(enq_seq);
    if main.contains(&marker) {
        tracing::debug!(enq_seq, "op already applied, skipping duplicate replay");
        return AppliedResult { enq_seq, outcome: Ok(AppliedOutcome::AlreadyApplied) };
    }

    let mut batch_main = WriteBatch::new();
    let mut batch_index = WriteBatch::new();
    let outcome = apply_op(main, index, &mut batch_main, &mut batch_index, encryption, kms, item.op, item.computed_ts);
    if outcome.is_ok() {
        batch_main.put(marker, vec![1]);
        main.apply_batch(batch_main);
        index.apply_batch(batch_index);
    }
    AppliedResult { enq_seq, outcome }
}

/// Key marking that `enq_seq` has already reached storage, so a WAL
/// replay that re-drives the same record after a crash is a no-op
/// rather than a duplicate message or a spurious `ThreadCreate` conflict.
fn applied_marker_key(enq_seq: u64) -> String {
    format!("applied:{enq_seq:020}")
}

fn load_thread(main: &Arc<dyn StorageEngine>, thread_key: &str) -> Option<Thread> {
    main.get(&KeyEncoder::thread_meta_key(thread_key))
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
}

fn load_message(main: &Arc<dyn StorageEngine>, msg_key: &str) -> Option<Message> {
    main.get(msg_key).and_then(|bytes| serde_json::from_slice(&bytes).ok())
}

#[allow(clippy::too_many_arguments)]
fn apply_op(
    main: &Arc<dyn StorageEngine>,
    index: &Arc<dyn StorageEngine>,
    batch_main: &mut WriteBatch,
    batch_index: &mut WriteBatch,
    encryption: &EncryptionConfig,
    kms: &dyn Kms,
    op: Op,
    now: Timestamp,
) -> Result<AppliedOutcome, ProgressError> {
    match op {
        Op::ThreadCreate { thread_key, title, author } => {
            if load_thread(main, &thread_key).is_some() {
                return Err(ProgressError::Conflict(format!("thread {thread_key} already exists")));
            }
            let mut thread = Thread::new(&thread_key, title, author, now);
            if encryption.enabled {
                let dek = generate_dek();
                thread.kms_meta = Some(kms.wrap_dek(&dek)?);
            }
            batch_main.put(KeyEncoder::thread_meta_key(&thread_key), serde_json::to_vec(&thread).unwrap());
            Ok(AppliedOutcome::Thread { thread_key })
        }
        Op::ThreadUpdate { thread_key, title, author } => {
            let mut thread = load_thread(main, &thread_key)
                .ok_or_else(|| ProgressError::NotFound(format!("thread {thread_key}")))?;
            if thread.deleted {
                return Err(ProgressError::NotFound(format!("thread {thread_key}")));
            }
            if thread.author != author {
                return Err(ProgressError::Unauthorized(format!("{author} does not own thread {thread_key}")));
            }
            thread.title = title;
            thread.updated_ts = now;
            batch_main.put(KeyEncoder::thread_meta_key(&thread_key), serde_json::to_vec(&thread).unwrap());
            Ok(AppliedOutcome::Thread { thread_key })
        }
        Op::ThreadDelete { thread_key, author } => {
            let mut thread = load_thread(main, &thread_key)
                .ok_or_else(|| ProgressError::NotFound(format!("thread {thread_key}")))?;
            if thread.author != author {
                return Err(ProgressError::Unauthorized(format!("{author} does not own thread {thread_key}")));
            }
            thread.deleted = true;
            thread.deleted_ts = Some(now);
            thread.updated_ts = now;

            let seq = thread.next_seq();
            let msg_key = KeyEncoder::msg_key(&thread_key, now, seq);
            let tombstone_body = encrypt_for_thread(&thread, encryption, kms, serde_json::Value::Null)?;
            let mut tombstone = Message::new(author, now, tombstone_body);
            tombstone.deleted = true;
            batch_main.put(msg_key.clone(), serde_json::to_vec(&tombstone).unwrap());
            write_version(batch_main, &mut thread, &msg_key, &tombstone);

            batch_main.put(KeyEncoder::thread_meta_key(&thread_key), serde_json::to_vec(&thread).unwrap());
            Ok(AppliedOutcome::Thread { thread_key })
        }
        Op::MessageCreate { thread_key, author, body, reply_to } => {
            let mut thread = load_thread(main, &thread_key)
                .ok_or_else(|| ProgressError::NotFound(format!("thread {thread_key}")))?;
            if thread.deleted {
                return Err(ProgressError::NotFound(format!("thread {thread_key}")));
            }
            let seq = thread.next_seq();
            let msg_key = KeyEncoder::msg_key(&thread_key, now, seq);
            let body = encrypt_for_thread(&thread, encryption, kms, body)?;
            let mut message = Message::new(author, now, body);
            message.reply_to = reply_to;
            batch_main.put(msg_key.clone(), serde_json::to_vec(&message).unwrap());
            write_version(batch_main, &mut thread, &msg_key, &message);
            batch_main.put(KeyEncoder::thread_meta_key(&thread_key), serde_json::to_vec(&thread).unwrap());
            bump_count(index, batch_index, &thread_key, 1);
            Ok(AppliedOutcome::Message { msg_key })
        }
        Op::MessageUpdate { thread_key, msg_key, author, body } => {
            let mut message = load_message(main, &msg_key)
                .ok_or_else(|| ProgressError::NotFound(format!("message {msg_key}")))?;
            if message.deleted {
                return Err(ProgressError::NotFound(format!("message {msg_key}")));
            }
            if message.author != author {
                return Err(ProgressError::Unauthorized(format!("{author} does not own message {msg_key}")));
            }
            let mut thread = load_thread(main, &thread_key)
                .ok_or_else(|| ProgressError::NotFound(format!("thread {thread_key}")))?;
            message.body = encrypt_for_thread(&thread, encryption, kms, body)?;
            message.updated_ts = now;
            batch_main.put(msg_key.clone(), serde_json::to_vec(&message).unwrap());
            write_version(batch_main, &mut thread, &msg_key, &message);
            batch_main.put(KeyEncoder::thread_meta_key(&thread_key), serde_json::to_vec(&thread).unwrap());
            Ok(AppliedOutcome::Message { msg_key })
        }
        Op::MessageDelete { thread_key, msg_key, author } => {
            let mut message = load_message(main, &msg_key)
                .ok_or_else(|| ProgressError::NotFound(format!("message {msg_key}")))?;
            if message.deleted {
                return Err(ProgressError::NotFound(format!("message {msg_key}")));
            }
            if message.author != author {
                return Err(ProgressError::Unauthorized(format!("{author} does not own message {msg_key}")));
            }
            let mut thread = load_thread(main, &thread_key)
                .ok_or_else(|| ProgressError::NotFound(format!("thread {thread_key}")))?;
            message.deleted = true;
            message.updated_ts = now;
            batch_main.put(msg_key.clone(), serde_json::to_vec(&message).unwrap());
            write_version(batch_main, &mut thread, &msg_key, &message);
            batch_main.put(KeyEncoder::thread_meta_key(&thread_key), serde_json::to_vec(&thread).unwrap());
            bump_count(index, batch_index, &thread_key, -1);
            Ok(AppliedOutcome::Message { msg_key })
        }
        Op::ReactionAdd { thread_key: _, msg_key, author, reaction } => {
            let mut message = load_message(main, &msg_key)
                .ok_or_else(|| ProgressError::NotFound(format!("message {msg_key}")))?;
            message.reactions.entry(reaction).or_default().insert(author);
            batch_main.put(msg_key.clone(), serde_json::to_vec(&message).unwrap());
            Ok(AppliedOutcome::Message { msg_key })
        }
        Op::ReactionDelete { thread_key: _, msg_key, author, reaction } => {
            let mut message = load_message(main, &msg_key)
                .ok_or_else(|| ProgressError::NotFound(format!("message {msg_key}")))?;
            if let Some(reactors) = message.reactions.get_mut(&reaction) {
                reactors.remove(&author);
                if reactors.is_empty() {
                    message.reactions.remove(&reaction);
                }
            }
            batch_main.put(msg_key.clone(), serde_json::to_vec(&message).unwrap());
            Ok(AppliedOutcome::Message { msg_key })
        }
    }
}

/// Snapshot `message`'s current state as a [`Version`], called after every
/// write to `msg_key` (create, update, delete, and the tombstone a
/// `ThreadDelete` writes) so `ListMessageVersions` always ends with
/// whatever `GetLatestMessage` would return, including a tombstone.
/// Borrows `thread`'s own seq counter rather than reloading it, so it
/// shares the same allocation the caller already holds in memory and
/// can't collide with the seq the caller assigned the message itself;
/// callers write `thread_meta_key` back themselves, once, after calling
/// this.
fn write_version(batch_main: &mut WriteBatch, thread: &mut Thread, msg_key: &str, message: &Message) {
    let seq = thread.next_seq();
    let version = Version {
        msg_key: msg_key.to_string(),
        ts: message.updated_ts,
        seq,
        message: message.clone(),
    };
    let version_key = KeyEncoder::version_key(msg_key, version.ts, version.seq);
    batch_main.put(version_key, serde_json::to_vec(&version).unwrap());
}

/// Encrypt `body` under `thread`'s DEK when the thread was provisioned
/// with one (spec.md §4.8); threads created while encryption was
/// disabled have no `kms_meta` and pass `body` through unchanged, so
/// toggling `EncryptionConfig::enabled` only affects new threads.
fn encrypt_for_thread(
    thread: &Thread,
    encryption: &EncryptionConfig,
    kms: &dyn Kms,
    body: serde_json::Value,
) -> Result<serde_json::Value, ProgressError> {
    match &thread.kms_meta {
        Some(meta) => {
            let dek = kms.unwrap_dek(meta)?;
            let cipher = EnvelopeCipher::from_dek(&dek);
            Ok(cipher.encrypt_body(&body, &encryption.fields))
        }
        None => Ok(body),
    }
}

/// `count:<thread_key>` — the index store's running non-deleted message
/// count for a thread (spec.md §6), read by the engine crate's read path
/// as a cheap `total` for [`progressdb_core::types::Page`] without a full
/// prefix scan.
pub fn count_key(thread_key: &str) -> String {
    format!("count:{thread_key}")
}

fn bump_count(index: &Arc<dyn StorageEngine>, batch_index: &mut WriteBatch, thread_key: &str, delta: i64) {
    let key = count_key(thread_key);
    let current = index
        .get(&key)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_le_bytes)
        .unwrap_or(0);
    let updated = (current as i64 + delta).max(0) as u64;
    batch_index.put(key, updated.to_le_bytes().to_vec());
}

/// Encode `(op, computed_ts)` as the WAL record payload, so recovery can
/// replay each op at the exact timestamp it was originally applied at
/// (needed for `msg_key`/`version_key` determinism — spec.md §4.2).
fn encode_computed_op(op: &Op, computed_ts: Timestamp) -> Vec<u8> {
    serde_json::to_vec(&(op, computed_ts)).expect("Op serializes")
}

/// Decode a WAL-record payload produced by [`encode_computed_op`].
pub fn decode_computed_op(payload: &[u8]) -> Result<(Op, Timestamp), serde_json::Error> {
    serde_json::from_slice(payload)
}

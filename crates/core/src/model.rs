//! Data model (spec.md §3): `Thread`, `Message`, `Version`, `KmsMeta`
//!
//! These are the on-disk payload shapes, serialized with `serde_json`
//! (bodies are opaque JSON to this layer; only the envelope fields below
//! are interpreted). Follows the teacher's plain-struct-plus-derive
//! convention rather than its `Versioned<T>`/`VersionedHistory<T>`
//! wrapper types, since this domain's history is modeled explicitly via
//! `Version` records rather than generically over any value type.

use crate::types::{Seq, Timestamp};
use serde::{Deserialize, Serialize};

/// Per-thread envelope encryption metadata (spec.md §5): the thread's
/// data-encryption key, wrapped by a KMS master key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KmsMeta {
    /// Identifier of the KMS master key that wrapped `wrapped_dek`.
    pub key_id: String,
    /// The thread's DEK, wrapped (encrypted) under `key_id`.
    pub wrapped_dek: Vec<u8>,
    /// AEAD algorithm identifier, e.g. `"chacha20poly1305"`.
    pub algorithm: String,
}

/// Thread metadata (spec.md §3). One record per `thread_key`, stored at
/// `KeyEncoder::thread_meta_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    /// Caller-chosen stable identifier.
    pub thread_key: String,
    /// Human-readable title.
    pub title: String,
    /// Identity that created the thread.
    pub author: String,
    /// Creation timestamp.
    pub created_ts: Timestamp,
    /// Timestamp of the most recent mutation.
    pub updated_ts: Timestamp,
    /// Soft-delete flag; a deleted thread's messages remain on disk but
    /// are excluded from listings (spec.md §4.4).
    pub deleted: bool,
    /// Timestamp the thread was soft-deleted, if any.
    pub deleted_ts: Option<Timestamp>,
    /// The highest per-thread `seq` assigned so far (spec.md §4.6).
    pub last_seq: Seq,
    /// Envelope encryption metadata, present once encryption is enabled
    /// for this thread (spec.md §5).
    pub kms_meta: Option<KmsMeta>,
}

impl Thread {
    /// Construct a new, non-deleted thread at `created_ts`.
    pub fn new(thread_key: impl Into<String>, title: impl Into<String>, author: impl Into<String>, created_ts: Timestamp) -> Self {
        Thread {
            thread_key: thread_key.into(),
            title: title.into(),
            author: author.into(),
            created_ts,
            updated_ts: created_ts,
            deleted: false,
            deleted_ts: None,
            last_seq: Seq(0),
            kms_meta: None,
        }
    }

    /// Allocate the next per-thread sequence number, recording it as
    /// `last_seq` (spec.md §4.6: assigned under the apply worker's
    /// per-thread lock).
    pub fn next_seq(&mut self) -> Seq {
        let next = Seq(self.last_seq.0 + 1);
        self.last_seq = next;
        next
    }
}

/// A message within a thread (spec.md §3). The latest state lives at
/// `KeyEncoder::msg_key`; every prior state is retained as a
/// [`Version`] at `KeyEncoder::version_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Identity that authored this message.
    pub author: String,
    /// Creation timestamp (stable across edits).
    pub created_ts: Timestamp,
    /// Timestamp of the most recent edit.
    pub updated_ts: Timestamp,
    /// Message payload; opaque JSON to this layer, optionally encrypted
    /// in transit through the envelope-encryption boundary.
    pub body: serde_json::Value,
    /// Optional parent message this one replies to.
    pub reply_to: Option<String>,
    /// Soft-delete flag (spec.md §4.4): tombstoned rather than removed.
    pub deleted: bool,
    /// Reactions keyed by emoji/tag to the set of reacting identities
    /// (spec.md §4.8: last-write-wins add/remove resolved at apply time).
    pub reactions: std::collections::BTreeMap<String, std::collections::BTreeSet<String>>,
}

impl Message {
    /// Construct a new, non-deleted message with no reactions.
    pub fn new(author: impl Into<String>, created_ts: Timestamp, body: serde_json::Value) -> Self {
        Message {
            author: author.into(),
            created_ts,
            updated_ts: created_ts,
            body,
            reply_to: None,
            deleted: false,
            reactions: std::collections::BTreeMap::new(),
        }
    }
}

/// A retained prior state of a message (spec.md §4.3: every mutation
/// appends a version before updating the live record). Identity is the
/// triple `(msg_key, ts, seq)` encoded into the storage key itself; this
/// struct carries only the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    /// The message this version belongs to.
    pub msg_key: String,
    /// The version's timestamp component (part of its key).
    pub ts: Timestamp,
    /// The version's sequence component (part of its key).
    pub seq: Seq,
    /// Full message payload at the time this version was superseded.
    pub message: Message,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_next_seq_is_monotonic() {
        let mut thread = Thread::new("t1", "Title", "alice", Timestamp::from_micros(1));
        assert_eq!(thread.next_seq(), Seq(1));
        assert_eq!(thread.next_seq(), Seq(2));
        assert_eq!(thread.last_seq, Seq(2));
    }

    #[test]
    fn message_new_has_no_reactions_and_is_not_deleted() {
        let msg = Message::new("alice", Timestamp::from_micros(5), serde_json::json!({"text": "hi"}));
        assert!(!msg.deleted);
        assert!(msg.reactions.is_empty());
        assert_eq!(msg.created_ts, msg.updated_ts);
    }

    #[test]
    fn thread_serializes_round_trip() {
        let thread = Thread::new("t1", "Title", "alice", Timestamp::from_micros(1));
        let json = serde_json::to_string(&thread).unwrap();
        let back: Thread = serde_json::from_str(&json).unwrap();
        assert_eq!(thread, back);
    }
}

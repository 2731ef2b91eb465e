//! Ingest operations: the seven mutation kinds spec.md §4.5 names.
//!
//! `Op` is what callers enqueue (validated at the API boundary, not yet
//! touched by compute). `ComputedOp` is what a compute worker produces:
//! the same mutation, with input validated and normalized, ready for the
//! apply worker to assign a `seq` and write. Splitting these two mirrors
//! the teacher's read/validate-then-apply split in
//! `TransactionManager::{begin_validation, apply_writes}`, generalized
//! from MVCC conflict checking to simple input validation since this
//! domain has no concurrent-writer conflict to detect before apply.

use progressdb_core::types::Timestamp;
use serde::{Deserialize, Serialize};

/// A caller-submitted mutation, as placed on the ingest queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    /// Create a new thread.
    ThreadCreate {
        /// Target thread key.
        thread_key: String,
        /// Thread title.
        title: String,
        /// Acting identity.
        author: String,
    },
    /// Update a thread's title.
    ThreadUpdate {
        /// Target thread key.
        thread_key: String,
        /// New title.
        title: String,
        /// Acting identity.
        author: String,
    },
    /// Soft-delete a thread.
    ThreadDelete {
        /// Target thread key.
        thread_key: String,
        /// Acting identity.
        author: String,
    },
    /// Create a new message within a thread.
    MessageCreate {
        /// Owning thread.
        thread_key: String,
        /// Acting identity.
        author: String,
        /// Message payload.
        body: serde_json::Value,
        /// Optional parent message.
        reply_to: Option<String>,
    },
    /// Edit an existing message's body.
    MessageUpdate {
        /// Owning thread.
        thread_key: String,
        /// Target message key.
        msg_key: String,
        /// Acting identity (must match the message's author; enforced by
        /// the apply worker, which is the only stage that reads current
        /// storage state).
        author: String,
        /// New body.
        body: serde_json::Value,
    },
    /// Soft-delete a message.
    MessageDelete {
        /// Owning thread.
        thread_key: String,
        /// Target message key.
        msg_key: String,
        /// Acting identity.
        author: String,
    },
    /// Add a reaction to a message.
    ReactionAdd {
        /// Owning thread.
        thread_key: String,
        /// Target message key.
        msg_key: String,
        /// Reacting identity.
        author: String,
        /// Reaction tag (e.g. an emoji shortcode).
        reaction: String,
    },
    /// Remove a reaction from a message.
    ReactionDelete {
        /// Owning thread.
        thread_key: String,
        /// Target message key.
        msg_key: String,
        /// Reacting identity.
        author: String,
        /// Reaction tag.
        reaction: String,
    },
}

/// Interpret a raw payload as a message body: valid JSON parses as-is,
/// anything else is kept as a string (lossy UTF-8) so no caller-supplied
/// byte payload is ever rejected outright by the convenience constructors.
fn body_from_bytes(bytes: Vec<u8>) -> serde_json::Value {
    serde_json::from_slice(&bytes).unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned()))
}

impl Op {
    /// Build a [`Op::ThreadCreate`].
    pub fn thread_create(thread_key: impl Into<String>, title: impl Into<String>, author: impl Into<String>) -> Self {
        Op::ThreadCreate { thread_key: thread_key.into(), title: title.into(), author: author.into() }
    }

    /// Build a [`Op::ThreadUpdate`].
    pub fn thread_update(thread_key: impl Into<String>, title: impl Into<String>, author: impl Into<String>) -> Self {
        Op::ThreadUpdate { thread_key: thread_key.into(), title: title.into(), author: author.into() }
    }

    /// Build a [`Op::ThreadDelete`].
    pub fn thread_delete(thread_key: impl Into<String>, author: impl Into<String>) -> Self {
        Op::ThreadDelete { thread_key: thread_key.into(), author: author.into() }
    }

    /// Build a [`Op::MessageCreate`] from a raw payload (spec.md §6's
    /// `payload_bytes`); see [`body_from_bytes`] for how it's interpreted.
    pub fn message_create(thread_key: impl Into<String>, author: impl Into<String>, payload: Vec<u8>) -> Self {
        Op::MessageCreate {
            thread_key: thread_key.into(),
            author: author.into(),
            body: body_from_bytes(payload),
            reply_to: None,
        }
    }

    /// Build a [`Op::MessageCreate`] that replies to an existing message.
    pub fn message_reply(thread_key: impl Into<String>, author: impl Into<String>, payload: Vec<u8>, reply_to: impl Into<String>) -> Self {
        Op::MessageCreate {
            thread_key: thread_key.into(),
            author: author.into(),
            body: body_from_bytes(payload),
            reply_to: Some(reply_to.into()),
        }
    }

    /// Build a [`Op::MessageUpdate`].
    pub fn message_update(thread_key: impl Into<String>, msg_key: impl Into<String>, author: impl Into<String>, payload: Vec<u8>) -> Self {
        Op::MessageUpdate {
            thread_key: thread_key.into(),
            msg_key: msg_key.into(),
            author: author.into(),
            body: body_from_bytes(payload),
        }
    }

    /// Build a [`Op::MessageDelete`].
    pub fn message_delete(thread_key: impl Into<String>, msg_key: impl Into<String>, author: impl Into<String>) -> Self {
        Op::MessageDelete { thread_key: thread_key.into(), msg_key: msg_key.into(), author: author.into() }
    }

    /// Build a [`Op::ReactionAdd`].
    pub fn reaction_add(thread_key: impl Into<String>, msg_key: impl Into<String>, author: impl Into<String>, reaction: impl Into<String>) -> Self {
        Op::ReactionAdd { thread_key: thread_key.into(), msg_key: msg_key.into(), author: author.into(), reaction: reaction.into() }
    }

    /// Build a [`Op::ReactionDelete`].
    pub fn reaction_delete(thread_key: impl Into<String>, msg_key: impl Into<String>, author: impl Into<String>, reaction: impl Into<String>) -> Self {
        Op::ReactionDelete { thread_key: thread_key.into(), msg_key: msg_key.into(), author: author.into(), reaction: reaction.into() }
    }

    /// The thread this op mutates; every op is scoped to exactly one
    /// thread (spec.md §4.6: sequencing is per-thread).
    pub fn thread_key(&self) -> &str {
        match self {
            Op::ThreadCreate { thread_key, .. }
            | Op::ThreadUpdate { thread_key, .. }
            | Op::ThreadDelete { thread_key, .. }
            | Op::MessageCreate { thread_key, .. }
            | Op::MessageUpdate { thread_key, .. }
            | Op::MessageDelete { thread_key, .. }
            | Op::ReactionAdd { thread_key, .. }
            | Op::ReactionDelete { thread_key, .. } => thread_key,
        }
    }

    /// A short tag for logging and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Op::ThreadCreate { .. } => "thread_create",
            Op::ThreadUpdate { .. } => "thread_update",
            Op::ThreadDelete { .. } => "thread_delete",
            Op::MessageCreate { .. } => "message_create",
            Op::MessageUpdate { .. } => "message_update",
            Op::MessageDelete { .. } => "message_delete",
            Op::ReactionAdd { .. } => "reaction_add",
            Op::ReactionDelete { .. } => "reaction_delete",
        }
    }
}

/// An [`Op`] that has passed compute-stage validation, timestamped and
/// ready for the apply worker to assign a `seq` and write.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedOp {
    /// The validated operation.
    pub op: Op,
    /// The ingest queue's global monotonic sequence for this item,
    /// carried through for WAL record identity and idempotent replay.
    pub enq_seq: u64,
    /// Wall-clock time the compute worker finished validating this op.
    pub computed_ts: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_key_extracted_for_every_variant() {
        let ops = vec![
            Op::ThreadCreate {
                thread_key: "t1".into(),
                title: "Title".into(),
                author: "alice".into(),
            },
            Op::MessageCreate {
                thread_key: "t1".into(),
                author: "alice".into(),
                body: serde_json::json!({}),
                reply_to: None,
            },
            Op::ReactionAdd {
                thread_key: "t1".into(),
                msg_key: "m1".into(),
                author: "alice".into(),
                reaction: "+1".into(),
            },
        ];
        for op in ops {
            assert_eq!(op.thread_key(), "t1");
        }
    }

    #[test]
    fn message_create_parses_json_payload() {
        let op = Op::message_create("t1", "alice", br#"{"text":"hi"}"#.to_vec());
        let Op::MessageCreate { body, .. } = op else { panic!() };
        assert_eq!(body, serde_json::json!({"text": "hi"}));
    }

    #[test]
    fn message_create_falls_back_to_string_for_non_json_payload() {
        let op = Op::message_create("t1", "alice", b"hello".to_vec());
        let Op::MessageCreate { body, .. } = op else { panic!() };
        assert_eq!(body, serde_json::Value::String("hello".into()));
    }

    #[test]
    fn kind_tags_are_distinct() {
        let kinds = [
            Op::ThreadCreate {
                thread_key: "t".into(),
                title: "x".into(),
                author: "a".into(),
            }
            .kind(),
            Op::ThreadUpdate {
                thread_key: "t".into(),
                title: "x".into(),
                author: "a".into(),
            }
            .kind(),
            Op::ThreadDelete {
                thread_key: "t".into(),
                author: "a".into(),
            }
            .kind(),
        ];
        let unique: std::collections::HashSet<_> = kinds.iter().collect();
        assert_eq!(unique.len(), kinds.len());
    }
}

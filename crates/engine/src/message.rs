//! Message write path (spec.md §4.5): `MessageCreate`/`MessageUpdate`/
//! `MessageDelete` and reaction edits, each a thin translator into an
//! [`Op`] submitted through [`Runtime::enqueue`].

use crate::runtime::Runtime;
use progressdb_concurrency::{AppliedOutcome, Op};
use progressdb_core::error::{ProgressError, ProgressResult};

impl Runtime {
    /// `MessageCreate`. Returns the new message's key.
    pub fn create_message(&self, thread_key: impl Into<String>, author: impl Into<String>, payload: Vec<u8>) -> ProgressResult<String> {
        match self.enqueue(Op::message_create(thread_key, author, payload))? {
            AppliedOutcome::Message { msg_key } => Ok(msg_key),
            other => Err(unexpected_outcome("MessageCreate", other)),
        }
    }

    /// `MessageCreate` with `reply_to` set.
    pub fn reply_to_message(
        &self,
        thread_key: impl Into<String>,
        author: impl Into<String>,
        payload: Vec<u8>,
        reply_to: impl Into<String>,
    ) -> ProgressResult<String> {
        match self.enqueue(Op::message_reply(thread_key, author, payload, reply_to))? {
            AppliedOutcome::Message { msg_key } => Ok(msg_key),
            other => Err(unexpected_outcome("MessageCreate", other)),
        }
    }

    /// `MessageUpdate`; `author` must match the message's original author.
    pub fn update_message(
        &self,
        thread_key: impl Into<String>,
        msg_key: impl Into<String>,
        author: impl Into<String>,
        payload: Vec<u8>,
    ) -> ProgressResult<String> {
        match self.enqueue(Op::message_update(thread_key, msg_key, author, payload))? {
            AppliedOutcome::Message { msg_key } => Ok(msg_key),
            other => Err(unexpected_outcome("MessageUpdate", other)),
        }
    }

    /// `MessageDelete` (soft-delete, tombstoned).
    pub fn delete_message(&self, thread_key: impl Into<String>, msg_key: impl Into<String>, author: impl Into<String>) -> ProgressResult<String> {
        match self.enqueue(Op::message_delete(thread_key, msg_key, author))? {
            AppliedOutcome::Message { msg_key } => Ok(msg_key),
            other => Err(unexpected_outcome("MessageDelete", other)),
        }
    }

    /// `ReactionAdd`.
    pub fn add_reaction(
        &self,
        thread_key: impl Into<String>,
        msg_key: impl Into<String>,
        author: impl Into<String>,
        reaction: impl Into<String>,
    ) -> ProgressResult<String> {
        match self.enqueue(Op::reaction_add(thread_key, msg_key, author, reaction))? {
            AppliedOutcome::Message { msg_key } => Ok(msg_key),
            other => Err(unexpected_outcome("ReactionAdd", other)),
        }
    }

    /// `ReactionDelete`.
    pub fn remove_reaction(
        &self,
        thread_key: impl Into<String>,
        msg_key: impl Into<String>,
        author: impl Into<String>,
        reaction: impl Into<String>,
    ) -> ProgressResult<String> {
        match self.enqueue(Op::reaction_delete(thread_key, msg_key, author, reaction))? {
            AppliedOutcome::Message { msg_key } => Ok(msg_key),
            other => Err(unexpected_outcome("ReactionDelete", other)),
        }
    }
}

fn unexpected_outcome(op: &'static str, outcome: AppliedOutcome) -> ProgressError {
    ProgressError::InternalError(format!("{op} produced an unexpected outcome: {outcome:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use progressdb_core::config::RuntimeConfig;
    use tempfile::tempdir;

    #[test]
    fn create_update_delete_round_trips() {
        let dir = tempdir().unwrap();
        let rt = Runtime::open(dir.path(), RuntimeConfig::default()).unwrap();
        rt.create_thread("t1", "Title", "alice").unwrap();
        let msg_key = rt.create_message("t1", "alice", b"hi".to_vec()).unwrap();
        rt.update_message("t1", &msg_key, "alice", b"edited".to_vec()).unwrap();
        rt.delete_message("t1", &msg_key, "alice").unwrap();

        let message = rt.get_latest_message(&msg_key).unwrap();
        assert!(message.deleted);
    }

    #[test]
    fn reactions_accumulate_and_clear() {
        let dir = tempdir().unwrap();
        let rt = Runtime::open(dir.path(), RuntimeConfig::default()).unwrap();
        rt.create_thread("t1", "Title", "alice").unwrap();
        let msg_key = rt.create_message("t1", "alice", b"hi".to_vec()).unwrap();
        rt.add_reaction("t1", &msg_key, "bob", "+1").unwrap();
        rt.remove_reaction("t1", &msg_key, "bob", "+1").unwrap();

        let message = rt.get_latest_message(&msg_key).unwrap();
        assert!(!message.reactions.contains_key("+1"));
    }

    #[test]
    fn delete_by_non_author_is_rejected() {
        let dir = tempdir().unwrap();
        let rt = Runtime::open(dir.path(), RuntimeConfig::default()).unwrap();
        rt.create_thread("t1", "Title", "alice").unwrap();
        let msg_key = rt.create_message("t1", "alice", b"hi".to_vec()).unwrap();
        let result = rt.delete_message("t1", &msg_key, "bob");
        assert!(matches!(result, Err(ProgressError::Unauthorized(_))));
    }
}

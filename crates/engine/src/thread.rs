//! Thread write path (spec.md §4.5): thin translators from a public
//! call into an [`Op`], submitted through [`Runtime::enqueue`].

use crate::runtime::Runtime;
use progressdb_concurrency::{AppliedOutcome, Op};
use progressdb_core::error::{ProgressError, ProgressResult};

impl Runtime {
    /// `ThreadCreate`. Returns the new thread's key.
    pub fn create_thread(&self, thread_key: impl Into<String>, title: impl Into<String>, author: impl Into<String>) -> ProgressResult<String> {
        match self.enqueue(Op::thread_create(thread_key, title, author))? {
            AppliedOutcome::Thread { thread_key } => Ok(thread_key),
            other => Err(unexpected_outcome("ThreadCreate", other)),
        }
    }

    /// `ThreadUpdate`; `author` must match the thread's creator.
    pub fn update_thread(&self, thread_key: impl Into<String>, title: impl Into<String>, author: impl Into<String>) -> ProgressResult<String> {
        match self.enqueue(Op::thread_update(thread_key, title, author))? {
            AppliedOutcome::Thread { thread_key } => Ok(thread_key),
            other => Err(unexpected_outcome("ThreadUpdate", other)),
        }
    }

    /// `ThreadDelete` (soft-delete); `author` must match the thread's creator.
    pub fn delete_thread(&self, thread_key: impl Into<String>, author: impl Into<String>) -> ProgressResult<String> {
        match self.enqueue(Op::thread_delete(thread_key, author))? {
            AppliedOutcome::Thread { thread_key } => Ok(thread_key),
            other => Err(unexpected_outcome("ThreadDelete", other)),
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
    fn create_then_update_then_delete() {
        let dir = tempdir().unwrap();
        let rt = Runtime::open(dir.path(), RuntimeConfig::default()).unwrap();
        rt.create_thread("t1", "Title", "alice").unwrap();
        rt.update_thread("t1", "New Title", "alice").unwrap();
        rt.delete_thread("t1", "alice").unwrap();
        let thread = rt.get_thread("t1").unwrap();
        assert!(thread.deleted);
        assert_eq!(thread.title, "New Title");
    }

    #[test]
    fn update_by_non_owner_is_rejected() {
        let dir = tempdir().unwrap();
        let rt = Runtime::open(dir.path(), RuntimeConfig::default()).unwrap();
        rt.create_thread("t1", "Title", "alice").unwrap();
        let result = rt.update_thread("t1", "New Title", "bob");
        assert!(matches!(result, Err(ProgressError::Unauthorized(_))));
    }
}

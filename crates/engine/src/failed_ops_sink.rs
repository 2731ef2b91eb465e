//! Durable failed-ops log (spec.md §4.5, §7): a daily-rotated,
//! newline-delimited JSON file under `<data_dir>/state/audit/`.
//!
//! [`progressdb_concurrency::failed_ops::FailedOpsLog`] keeps a bounded
//! in-memory ring buffer of recent failures for a cheap health check; this
//! sink is the durable counterpart spec.md names literally, written
//! alongside it so a failure survives a restart even after it ages out of
//! the ring buffer.

use progressdb_core::error::ProgressError;
use progressdb_core::types::Timestamp;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

#[derive(Serialize)]
struct FailedOpRecord<'a> {
    enq_seq: u64,
    error: String,
    at: &'a str,
}

/// Appends one JSON line per failed op to
/// `<dir>/failed_ops_<YYYY-MM-DD>.jsonl`.
pub struct FailedOpsDiskSink {
    dir: PathBuf,
}

impl FailedOpsDiskSink {
    /// `dir` should already exist (see [`crate::paths::DatabasePaths::state_audit`]).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FailedOpsDiskSink { dir: dir.into() }
    }

    /// Append one failure record. I/O errors are swallowed: a failing
    /// disk write must never take down the apply pipeline that is
    /// already reporting a failure.
    pub fn append(&self, enq_seq: u64, error: &ProgressError) {
        let stamp = Timestamp::now().to_rfc3339_nanos();
        let record = FailedOpRecord {
            enq_seq,
            error: error.to_string(),
            at: &stamp,
        };
        let Ok(line) = serde_json::to_string(&record) else {
            return;
        };
        let path = self.dir.join(format!("failed_ops_{}.jsonl", &stamp[..10]));
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_writes_one_line_per_failure() {
        let dir = tempdir().unwrap();
        let sink = FailedOpsDiskSink::new(dir.path());
        sink.append(1, &ProgressError::QueueFull);
        sink.append(2, &ProgressError::NotFound("x".into()));

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let contents = std::fs::read_to_string(entries[0].as_ref().unwrap().path()).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("\"enq_seq\":1"));
    }
}

//! Write-ahead log for the ingest queue (spec.md §4.2, §4.3)
//!
//! Records are appended to segmented files (`000001.wal`, `000002.wal`, …),
//! each CRC32-checked and prefixed with a length so a torn tail is
//! detectable and skippable at recovery time. Segment rotation, durability
//! modes, and the length-prefix-plus-trailing-checksum record layout follow
//! the teacher's `wal::{WalWriter, WalSegment, WalRecord}` (from its
//! transaction-commit WAL), generalized from committing `Writeset`s to
//! committing raw ingest-queue payloads.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod record;
pub mod segment;
pub mod testing;
pub mod truncate;
pub mod wal;

pub use record::{RecordError, WalRecord};
pub use segment::{SegmentError, WalSegment};
pub use truncate::truncate_before;
pub use wal::{RecoverError, RecoveredRecord, Wal, WalOpenError};

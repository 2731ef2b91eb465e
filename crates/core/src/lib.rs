//! Core types shared across the progressdb crates
//!
//! This crate defines the foundational types used throughout the system:
//! - `ThreadId`/`MessageId`: identifiers for threads and messages
//! - `Timestamp`: microsecond-precision timestamp used for ordering
//! - `Thread`/`Message`/`Version`/`KmsMeta`: the data model (spec.md §3)
//! - `KeyEncoder`/`ParseKey`: canonical, lexicographically sortable key
//!   encoding for the storage engine (spec.md §4.1)
//! - `Error`/`ProgressError`: the error taxonomy (spec.md §7)
//! - `RuntimeConfig`: configuration surface (spec.md §6)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod key;
pub mod limits;
pub mod model;
pub mod types;

pub use config::{EncryptionConfig, IngestConfig, QueueConfig, RuntimeConfig, WalConfig};
pub use error::{Error, ProgressError, ProgressResult, Result};
pub use key::{KeyEncoder, ParseKey, ParsedKey, WAL_SYNC_MARKER_KEY};
pub use limits::{LimitError, Limits};
pub use model::{KmsMeta, Message, Thread, Version};
pub use types::{MessageId, Page, PageRequest, Timestamp};

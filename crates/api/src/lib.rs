//! Public API surface for progressdb.
//!
//! This crate is the only thing an external transport layer (HTTP server,
//! CLI, embedding host) should depend on. It re-exports [`Runtime`] and the
//! handful of types needed to drive it — nothing from `progressdb-storage`,
//! `progressdb-durability`, `progressdb-concurrency`, or `progressdb-security`
//! crosses this boundary.
//!
//! ## Quick Start
//!
//! ```ignore
//! use progressdb_api::{Runtime, RuntimeConfig, Op};
//!
//! let rt = Runtime::open("./data", RuntimeConfig::default())?;
//! rt.enqueue(Op::message_create("thread-1", "owner-1", b"hello".to_vec()))?;
//! let page = rt.list_messages("thread-1", Default::default())?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub use progressdb_engine::{
    AppliedOutcome, DatabasePaths, FailedOp, FailedOpsDiskSink, KmsMeta, Message, MessageId,
    MetricsSnapshot, Op, Page, PageRequest, ProgressError, RuntimeConfig, RuntimeMetrics, Seq,
    Thread, Timestamp, Version,
};

pub use progressdb_engine::Runtime;

/// Result alias for every fallible operation this crate exposes.
pub type Result<T> = std::result::Result<T, ProgressError>;

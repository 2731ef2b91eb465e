//! Engine: the embedded runtime that wires storage, the ingest
//! pipeline, and the read path into one `Runtime` (spec.md §2).
//!
//! The split into `runtime`/`thread`/`message`/`read` submodules, each
//! contributing one `impl Runtime` block, follows the teacher's
//! `database/{mod,builder,config,registry,transactions}.rs` layout —
//! one cohesive struct, its methods grouped by concern across files
//! rather than one large `impl`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod failed_ops_sink;
pub mod index;
pub mod message;
pub mod metrics;
pub mod paths;
pub mod read;
pub mod runtime;
pub mod thread;

pub use failed_ops_sink::FailedOpsDiskSink;
pub use metrics::{MetricsSnapshot, RuntimeMetrics};
pub use paths::DatabasePaths;
pub use runtime::Runtime;

pub use progressdb_concurrency::{AppliedOutcome, FailedOp, Op};
pub use progressdb_core::config::RuntimeConfig;
pub use progressdb_core::error::{ProgressError, ProgressResult};
pub use progressdb_core::model::{KmsMeta, Message, Thread, Version};
pub use progressdb_core::types::{MessageId, Page, PageRequest, Seq, Timestamp};

//! Ordered key-value storage (spec.md §4.1, §6)
//!
//! Defines the [`StorageEngine`] trait every on-disk or in-memory backend
//! implements, an in-memory reference implementation ([`MemoryEngine`]),
//! the pagination windowing `ListMessages` needs ([`iter`]), and a thin
//! metrics counter ([`metrics`]). The runtime wires up two independent
//! instances of this trait — "main" and "index" — per spec.md §6.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod iter;
pub mod memory;
pub mod metrics;
pub mod snapshot;

pub use engine::{BatchOp, Entry, StorageEngine, WriteBatch};
pub use iter::{page_after, page_around_anchor, page_before, page_default, Window};
pub use memory::MemoryEngine;
pub use metrics::{StorageMetrics, StorageMetricsSnapshot};

//! # progressdb
//!
//! An append-only, versioned message store organized by threads, with an
//! envelope-encrypted write path, a segmented write-ahead log, and a bounded
//! ingest queue feeding a compute/apply pipeline.
//!
//! Every message write produces a new version; nothing is overwritten in
//! place. Messages are grouped under threads, which carry their own
//! monotonic sequence counter and owner.
//!
//! # Quick Start
//!
//! ```no_run
//! use progressdb::{Runtime, RuntimeConfig, Op};
//!
//! fn main() -> progressdb::Result<()> {
//!     let mut rt = Runtime::open("./data", RuntimeConfig::default())?;
//!
//!     rt.enqueue(Op::message_create("thread-1", "owner-1", b"hello".to_vec()))?;
//!
//!     let page = rt.list_messages("thread-1", Default::default())?;
//!     assert_eq!(page.items.len(), 1);
//!
//!     rt.shutdown()?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The [`Runtime`] struct is the entry point; [`progressdb_api`] wraps it in
//! the thin facade an external transport layer is expected to call. Internal
//! crates (storage, concurrency, durability, security) are not re-exported
//! here — only the operations facade is part of this crate's public surface.

pub use progressdb_api::*;

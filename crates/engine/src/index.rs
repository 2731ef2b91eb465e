//! Reading the index storage engine's pagination-support counters
//! (spec.md §6).
//!
//! The apply worker (`progressdb_concurrency::apply::count_key`) owns
//! writing `count:<thread_key>`; this module is the read side, used by
//! [`crate::read`] to fill [`progressdb_core::types::Page::total`] without
//! a full prefix scan. Soft-deleted messages are tracked on `Message`
//! itself (`deleted: bool`), not through a separate index key — the
//! teacher's own secondary-index primitives (`primitives::kv`) always
//! carry deletion state on the value, not as a shadow key, and this
//! follows that.

use progressdb_concurrency::count_key;
use progressdb_storage::engine::StorageEngine;

/// The current non-deleted message count for `thread_key`, or `0` if the
/// thread has never had a message applied.
pub fn message_count(index: &dyn StorageEngine, thread_key: &str) -> u64 {
    let Some(bytes) = index.get(&count_key(thread_key)) else {
        return 0;
    };
    let len = bytes.len();
    match <[u8; 8]>::try_from(bytes) {
        Ok(raw) => u64::from_le_bytes(raw),
        Err(_) => {
            tracing::error!(thread_key, len, "index counter has the wrong width, treating as zero");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progressdb_storage::engine::WriteBatch;
    use progressdb_storage::memory::MemoryEngine;

    #[test]
    fn missing_counter_reads_as_zero() {
        let index = MemoryEngine::new();
        assert_eq!(message_count(&index, "t1"), 0);
    }

    #[test]
    fn counter_reads_back_what_was_written() {
        let index = MemoryEngine::new();
        let mut batch = WriteBatch::new();
        batch.put(count_key("t1"), 3u64.to_le_bytes().to_vec());
        index.apply_batch(batch);
        assert_eq!(message_count(&index, "t1"), 3);
    }
}

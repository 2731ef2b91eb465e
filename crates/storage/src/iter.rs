//! Pagination windows over a key prefix (spec.md §4.7).
//!
//! `ListMessages` supports four cursor modes — default (newest-first
//! page), `after`-only, `before`-only, and `anchor`-centered — all of
//! which reduce to "scan a prefix from a cursor, bounded by a limit, and
//! report whether more exists on either side." This module is the one
//! place that logic lives, so the engine crate's read path stays a thin
//! caller.
//!
//! The returned page's *content* still includes soft-deleted entries —
//! the caller filters those out once it has decoded them into a typed
//! record. The `has_before`/`has_after` lookahead probes can't defer
//! that way: a probe that stops at the first raw entry, deleted or not,
//! would report `has_more = true` forever once a thread's tail is all
//! tombstones. `is_deleted` lets a caller plug in that check so the
//! probes skip past soft-deleted entries instead of stopping on them.

use crate::engine::{Entry, StorageEngine};

/// How many raw entries a boundary probe pulls per round while skipping
/// soft-deleted ones before giving up and reporting "nothing more".
const PROBE_BATCH: usize = 32;

/// The result of windowing a prefix scan.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Window {
    /// Items in ascending key order.
    pub items: Vec<Entry>,
    /// Whether at least one live (non-deleted) entry exists before the window.
    pub has_before: bool,
    /// Whether at least one live (non-deleted) entry exists after the window.
    pub has_after: bool,
}

/// Whether any entry strictly before `cursor` under `prefix` is live,
/// skipping batches of all-deleted entries until one is found or the
/// prefix is exhausted.
fn has_live_before(engine: &dyn StorageEngine, prefix: &str, cursor: &str, is_deleted: &dyn Fn(&[u8]) -> bool) -> bool {
    let mut cursor = cursor.to_string();
    loop {
        let batch = engine.scan_prefix_rev_from(prefix, Some(&cursor), PROBE_BATCH);
        if batch.is_empty() {
            return false;
        }
        if batch.iter().any(|(_, v)| !is_deleted(v)) {
            return true;
        }
        if batch.len() < PROBE_BATCH {
            return false;
        }
        cursor = batch.last().unwrap().0.clone();
    }
}

/// Whether any entry strictly after `cursor` under `prefix` is live; see
/// [`has_live_before`].
fn has_live_after(engine: &dyn StorageEngine, prefix: &str, cursor: &str, is_deleted: &dyn Fn(&[u8]) -> bool) -> bool {
    let mut cursor = cursor.to_string();
    loop {
        let batch = engine.scan_prefix_from(prefix, Some(&cursor), PROBE_BATCH);
        if batch.is_empty() {
            return false;
        }
        if batch.iter().any(|(_, v)| !is_deleted(v)) {
            return true;
        }
        if batch.len() < PROBE_BATCH {
            return false;
        }
        cursor = batch.last().unwrap().0.clone();
    }
}

/// Default page: the most recent `limit` entries under `prefix`.
pub fn page_default(engine: &dyn StorageEngine, prefix: &str, limit: usize, is_deleted: &dyn Fn(&[u8]) -> bool) -> Window {
    let mut items = engine.scan_prefix_rev_from(prefix, None, limit);
    items.reverse();
    let has_before = items
        .first()
        .map(|(k, _)| has_live_before(engine, prefix, k, is_deleted))
        .unwrap_or(false);
    Window {
        items,
        has_before,
        has_after: false,
    }
}

/// `after`-only: the `limit` entries immediately following `after`.
pub fn page_after(engine: &dyn StorageEngine, prefix: &str, after: &str, limit: usize, is_deleted: &dyn Fn(&[u8]) -> bool) -> Window {
    let items = engine.scan_prefix_from(prefix, Some(after), limit);
    let has_after = items
        .last()
        .map(|(k, _)| has_live_after(engine, prefix, k, is_deleted))
        .unwrap_or(false);
    Window {
        items,
        has_before: true,
        has_after,
    }
}

/// `before`-only: the `limit` entries immediately preceding `before`.
pub fn page_before(engine: &dyn StorageEngine, prefix: &str, before: &str, limit: usize, is_deleted: &dyn Fn(&[u8]) -> bool) -> Window {
    let mut items = engine.scan_prefix_rev_from(prefix, Some(before), limit);
    items.reverse();
    let has_before = items
        .first()
        .map(|(k, _)| has_live_before(engine, prefix, k, is_deleted))
        .unwrap_or(false);
    Window {
        items,
        has_before,
        has_after: true,
    }
}

/// `anchor`-centered: up to `half` entries on either side of `anchor`.
pub fn page_around_anchor(
    engine: &dyn StorageEngine,
    prefix: &str,
    anchor: &str,
    half: usize,
    is_deleted: &dyn Fn(&[u8]) -> bool,
) -> Window {
    let mut before = engine.scan_prefix_rev_from(prefix, Some(anchor), half);
    before.reverse();
    let anchor_entry = engine.seek_ge(anchor).filter(|(k, _)| k == anchor);
    let after = engine.scan_prefix_from(prefix, Some(anchor), half);

    let has_before = before
        .first()
        .map(|(k, _)| has_live_before(engine, prefix, k, is_deleted))
        .unwrap_or(false);
    let has_after = after
        .last()
        .map(|(k, _)| has_live_after(engine, prefix, k, is_deleted))
        .unwrap_or(false);

    let mut items = before;
    items.extend(anchor_entry);
    items.extend(after);

    Window {
        items,
        has_before,
        has_after,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::WriteBatch;
    use crate::memory::MemoryEngine;

    fn fixture() -> MemoryEngine {
        let engine = MemoryEngine::new();
        let mut batch = WriteBatch::new();
        for i in 1..=9 {
            batch.put(format!("p:{i}"), vec![i as u8]);
        }
        engine.apply_batch(batch);
        engine
    }

    fn none_deleted(_: &[u8]) -> bool {
        false
    }

    /// Entries whose single byte is odd are treated as "soft-deleted", so
    /// tests can exercise the skip-past-tombstones behavior without a
    /// real JSON message type.
    fn odd_is_deleted(bytes: &[u8]) -> bool {
        bytes.first().map(|b| b % 2 == 1).unwrap_or(false)
    }

    #[test]
    fn default_page_returns_most_recent_without_before_flag_on_full_view() {
        let engine = fixture();
        let window = page_default(&engine, "p:", 3, &none_deleted);
        assert_eq!(window.items.len(), 3);
        assert_eq!(window.items.last().unwrap().0, "p:9");
        assert!(window.has_before);
        assert!(!window.has_after);
    }

    #[test]
    fn after_only_excludes_anchor_and_reports_has_after() {
        let engine = fixture();
        let window = page_after(&engine, "p:", "p:3", 2, &none_deleted);
        assert_eq!(window.items, vec![("p:4".to_string(), vec![4]), ("p:5".to_string(), vec![5])]);
        assert!(window.has_after);
    }

    #[test]
    fn before_only_excludes_anchor_and_reports_has_before() {
        let engine = fixture();
        let window = page_before(&engine, "p:", "p:7", 2, &none_deleted);
        assert_eq!(window.items, vec![("p:5".to_string(), vec![5]), ("p:6".to_string(), vec![6])]);
        assert!(window.has_before);
    }

    #[test]
    fn anchor_centers_window_around_the_anchor_key() {
        let engine = fixture();
        let window = page_around_anchor(&engine, "p:", "p:5", 2, &none_deleted);
        let keys: Vec<_> = window.items.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec!["p:3", "p:4", "p:5", "p:6", "p:7"]);
    }

    #[test]
    fn no_more_data_reports_false_flags() {
        let engine = fixture();
        let window = page_after(&engine, "p:", "p:8", 5, &none_deleted);
        assert!(!window.has_after);
    }

    #[test]
    fn has_after_probe_skips_past_soft_deleted_tail() {
        // p:8 and p:9 are "deleted" (even byte values are live, odd are
        // deleted here since the fixture stores i as the byte value and
        // 8, 9 straddle the parity split) — rebuild explicitly so the
        // tail is unambiguous.
        let engine = MemoryEngine::new();
        let mut batch = WriteBatch::new();
        batch.put("p:1", vec![2]); // live
        batch.put("p:2", vec![2]); // live
        batch.put("p:3", vec![1]); // deleted
        batch.put("p:4", vec![1]); // deleted
        engine.apply_batch(batch);

        let window = page_after(&engine, "p:", "p:2", 1, &odd_is_deleted);
        assert!(!window.has_after, "only deleted entries remain after the window");
    }

    #[test]
    fn has_after_probe_finds_a_live_entry_beyond_a_deleted_run() {
        let engine = MemoryEngine::new();
        let mut batch = WriteBatch::new();
        batch.put("p:1", vec![2]); // live
        batch.put("p:2", vec![1]); // deleted
        batch.put("p:3", vec![1]); // deleted
        batch.put("p:4", vec![2]); // live
        engine.apply_batch(batch);

        let window = page_after(&engine, "p:", "p:1", 0, &odd_is_deleted);
        assert!(window.has_after, "a live entry exists past the deleted run");
    }

    #[test]
    fn has_before_probe_skips_past_soft_deleted_head() {
        let engine = MemoryEngine::new();
        let mut batch = WriteBatch::new();
        batch.put("p:1", vec![1]); // deleted
        batch.put("p:2", vec![1]); // deleted
        batch.put("p:3", vec![2]); // live
        batch.put("p:4", vec![2]); // live
        engine.apply_batch(batch);

        let window = page_before(&engine, "p:", "p:3", 1, &odd_is_deleted);
        assert!(!window.has_before, "only deleted entries remain before the window");
    }
}

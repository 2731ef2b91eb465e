//! Deleting fully-applied segments (spec.md §4.2: `TruncateBefore`).
//!
//! Never deletes the active (highest-numbered) segment, even if every
//! record in it has already been applied — a segment is only ever
//! retired once the WAL has rotated past it. Adapted from the teacher's
//! retention/compaction sweep (`retention::RetentionPolicy`), simplified
//! from arbitrary watermark-driven policies down to "everything before
//! `keep_from_segment` is gone".

use crate::segment::WalSegment;
use std::io;
use std::path::Path;

/// Delete every segment file in `dir` numbered strictly below
/// `keep_from_segment`. The active segment (whatever the caller is still
/// appending to) must be passed as `keep_from_segment` or higher; this
/// function never inspects which segment is "active" itself.
///
/// Returns the segment numbers actually removed.
pub fn truncate_before(dir: &Path, keep_from_segment: u64) -> io::Result<Vec<u64>> {
    let mut removed = Vec::new();
    if !dir.exists() {
        return Ok(removed);
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let number = match WalSegment::parse_segment_number(name.trim_end_matches(".gz")) {
            Some(n) => n,
            None => continue,
        };
        if number < keep_from_segment {
            std::fs::remove_file(entry.path())?;
            removed.push(number);
        }
    }
    removed.sort_unstable();
    Ok(removed)
}

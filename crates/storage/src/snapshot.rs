//! Point-in-time snapshots of a [`StorageEngine`] (spec.md §6), so an
//! in-memory engine's state survives a restart without replaying the
//! entire WAL history every time.
//!
//! Grounded in the teacher's WAL-only compaction, which only removes a
//! WAL segment once its highest transaction id is covered by a snapshot
//! watermark (`compaction::wal_only::WalOnlyCompactor`): a snapshot here
//! plays the same role — the apply worker writes one periodically, and a
//! WAL segment is only safe to retire once a snapshot covers it.

use crate::engine::{StorageEngine, WriteBatch};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    /// The highest `enq_seq` applied at the time this snapshot was taken.
    /// A WAL segment is safe to delete only once every record in it is
    /// at or below this watermark.
    watermark: u64,
    entries: Vec<(String, Vec<u8>)>,
}

/// Write every entry in `engine` to `path` as of `watermark`, via a
/// sibling tmp file plus rename so a crash mid-write never leaves a
/// partially-written file for [`load`] to trip over.
pub fn write(engine: &dyn StorageEngine, path: &Path, watermark: u64) -> io::Result<()> {
    let entries = engine.scan_prefix("");
    let bytes = bincode::serialize(&SnapshotFile { watermark, entries })
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Load a snapshot written by [`write`]: the watermark it was taken at,
/// and a batch ready to apply onto a fresh engine. `Ok(None)` means no
/// snapshot exists yet (a brand new database, or one that has never
/// reached a flush interval).
pub fn load(path: &Path) -> io::Result<Option<(u64, WriteBatch)>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    let snapshot: SnapshotFile =
        bincode::deserialize(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut batch = WriteBatch::new();
    for (key, value) in snapshot.entries {
        batch.put(key, value);
    }
    Ok(Some((snapshot.watermark, batch)))
}

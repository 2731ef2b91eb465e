//! Crash-injection helpers for durability tests.
//!
//! Simplified from the teacher's crash harness (`testing::crash_harness`,
//! which models probabilistic process-kill/abort injection across many
//! subsystems) down to the one fault this WAL's recovery path has to
//! tolerate: a torn tail, produced by truncating a segment file mid
//! record after it was written but before the process could finish the
//! write.

use crate::segment::WalSegment;
use std::io;
use std::path::Path;

/// Truncate the active segment's file to `keep_bytes`, simulating a
/// crash that landed mid-write. `keep_bytes` is typically derived from
/// the pre-crash file length minus a few bytes, to land inside the last
/// record's frame.
pub fn truncate_segment_file(dir: &Path, segment_number: u64, keep_bytes: u64) -> io::Result<()> {
    let path = WalSegment::segment_path(dir, segment_number);
    let file = std::fs::OpenOptions::new().write(true).open(&path)?;
    file.set_len(keep_bytes)?;
    Ok(())
}

/// Flip a single byte at `offset` in the active segment's file,
/// simulating bit rot or a torn write that happened to land on an
/// already-flushed page.
pub fn corrupt_byte(dir: &Path, segment_number: u64, offset: u64) -> io::Result<()> {
    let path = WalSegment::segment_path(dir, segment_number);
    let mut bytes = std::fs::read(&path)?;
    if let Some(byte) = bytes.get_mut(offset as usize) {
        *byte ^= 0xff;
    }
    std::fs::write(&path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::WalRecord;
    use crate::wal::Wal;
    use progressdb_core::config::WalConfig;
    use tempfile::tempdir;

    #[test]
    fn truncated_segment_loses_only_the_torn_record() {
        let dir = tempdir().unwrap();
        let mut config = WalConfig::default();
        config.enable_compress = false;
        {
            let mut wal = Wal::open(dir.path(), config.clone()).unwrap();
            wal.append(&WalRecord::enqueue(1, b"kept".to_vec())).unwrap();
            wal.flush().unwrap();
            wal.append(&WalRecord::enqueue(2, b"torn".to_vec())).unwrap();
        }
        let full_len = WalSegment::segment_path(dir.path(), 1)
            .metadata()
            .unwrap()
            .len();
        truncate_segment_file(dir.path(), 1, full_len - 2).unwrap();

        let recovered = Wal::recover(dir.path()).unwrap();
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].record.enq_seq, 1);
    }

    #[test]
    fn corrupted_byte_in_committed_record_halts_recovery_there() {
        let dir = tempdir().unwrap();
        let mut config = WalConfig::default();
        config.enable_compress = false;
        {
            let mut wal = Wal::open(dir.path(), config).unwrap();
            wal.append(&WalRecord::enqueue(1, b"good".to_vec())).unwrap();
            wal.append(&WalRecord::enqueue(2, b"bad-after-this".to_vec()))
                .unwrap();
            wal.flush().unwrap();
        }
        // Corrupt a byte inside the second record's payload region.
        corrupt_byte(dir.path(), 1, 30).unwrap();

        let recovered = Wal::recover(dir.path()).unwrap();
        assert!(recovered.len() <= 1);
    }
}

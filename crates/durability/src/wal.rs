//! The write-ahead log: segment lifecycle, rotation, and recovery.
//!
//! `Wal` owns the active segment and rotates to a new one once
//! `max_file_size` is exceeded, gzip-compressing the segment it just
//! closed when `enable_compress` and `compress_min_bytes` say to
//! (spec.md §4.3). Durability-mode fsync scheduling mirrors the teacher's
//! `WalWriter::maybe_sync` (writes-since-sync / bytes-since-sync / time
//! counters), generalized from the teacher's three-mode
//! `Cache`/`Standard`/`Always` split to this store's `none`/`batch`/`sync`
//! modes (`progressdb_core::config::WalMode`).

use crate::record::{RecordError, WalRecord};
use crate::segment::{SegmentError, WalSegment, SEGMENT_HEADER_SIZE};
use progressdb_core::config::{WalConfig, WalMode};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors opening a [`Wal`].
#[derive(Debug, Error)]
pub enum WalOpenError {
    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// A segment file failed to open.
    #[error(transparent)]
    Segment(#[from] SegmentError),
}

/// Errors surfaced while scanning segments at recovery time.
#[derive(Debug, Error)]
pub enum RecoverError {
    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// A segment file failed to open.
    #[error(transparent)]
    Segment(#[from] SegmentError),
}

/// A successfully decoded record plus which segment it came from, for
/// callers that need to correlate recovered records back to files
/// (truncation, diagnostics).
#[derive(Debug, Clone)]
pub struct RecoveredRecord {
    /// The segment number the record was read from.
    pub segment_number: u64,
    /// The decoded record.
    pub record: WalRecord,
}

/// The write-ahead log for the ingest queue.
///
/// When `config.enabled` is `false`, `Wal::open` still succeeds but every
/// append is a no-op: this lets callers run in `wal.enabled = false` mode
/// uniformly rather than branching at every call site.
pub struct Wal {
    dir: PathBuf,
    config: WalConfig,
    segment: Option<WalSegment>,
    current_segment_number: u64,
    bytes_since_sync: u64,
    writes_since_sync: usize,
    last_sync: Instant,
}

impl Wal {
    /// Open (or create) the WAL directory, resuming the latest segment if
    /// one exists.
    pub fn open(dir: impl Into<PathBuf>, config: WalConfig) -> Result<Self, WalOpenError> {
        let dir = dir.into();
        if !config.enabled {
            return Ok(Wal {
                dir,
                config,
                segment: None,
                current_segment_number: 0,
                bytes_since_sync: 0,
                writes_since_sync: 0,
                last_sync: Instant::now(),
            });
        }

        std::fs::create_dir_all(&dir)?;
        let existing = Self::list_segment_numbers(&dir)?;
        let (segment, number) = match existing.last() {
            Some(&number) => match WalSegment::open_append(&dir, number) {
                Ok(seg) => (seg, number),
                Err(_) => {
                    let next = number + 1;
                    (WalSegment::create(&dir, next)?, next)
                }
            },
            None => (WalSegment::create(&dir, 1)?, 1),
        };

        Ok(Wal {
            dir,
            config,
            segment: Some(segment),
            current_segment_number: number,
            bytes_since_sync: 0,
            writes_since_sync: 0,
            last_sync: Instant::now(),
        })
    }

    /// Append a record, rotating and fsyncing per the configured mode.
    pub fn append(&mut self, record: &WalRecord) -> Result<(), WalOpenError> {
        if !self.config.enabled {
            return Ok(());
        }
        let encoded = record.to_bytes();

        let segment = self.segment.as_mut().expect("segment present when enabled");
        if segment.size() + encoded.len() as u64 > self.config.effective_max_file_size() {
            self.rotate()?;
        }

        let segment = self.segment.as_mut().unwrap();
        segment.write(&encoded)?;
        self.bytes_since_sync += encoded.len() as u64;
        self.writes_since_sync += 1;

        self.maybe_sync()?;
        Ok(())
    }

    /// Force an fsync of the active segment regardless of mode.
    pub fn flush(&mut self) -> io::Result<()> {
        if let Some(segment) = self.segment.as_mut() {
            segment.sync()?;
        }
        self.reset_sync_counters();
        Ok(())
    }

    fn maybe_sync(&mut self) -> io::Result<()> {
        let should_sync = match self.config.mode {
            WalMode::None => false,
            WalMode::Sync => true,
            WalMode::Batch => {
                self.writes_since_sync >= self.config.batch_size
                    || self.last_sync.elapsed() >= self.config.batch_interval
            }
        };
        if should_sync {
            self.flush()?;
        }
        Ok(())
    }

    fn reset_sync_counters(&mut self) {
        self.bytes_since_sync = 0;
        self.writes_since_sync = 0;
        self.last_sync = Instant::now();
    }

    fn rotate(&mut self) -> Result<(), WalOpenError> {
        let finished_number = self.current_segment_number;
        if let Some(mut segment) = self.segment.take() {
            segment.finalize()?;
            segment.sync()?;
            let path = segment.path().to_path_buf();
            let size = segment.size();
            drop(segment);
            if self.config.enable_compress && size >= self.config.compress_min_bytes {
                compress_segment_in_place(&path)?;
                tracing::debug!(segment = finished_number, size, "wal segment compressed on rotation");
            }
        }
        self.current_segment_number += 1;
        self.segment = Some(WalSegment::create(&self.dir, self.current_segment_number)?);
        self.reset_sync_counters();
        tracing::info!(from = finished_number, to = self.current_segment_number, "wal rotated");
        Ok(())
    }

    /// The active segment's number.
    pub fn current_segment_number(&self) -> u64 {
        self.current_segment_number
    }

    /// The directory this WAL's segments live in, for callers that need
    /// to run [`crate::truncate::truncate_before`] alongside it.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn list_segment_numbers(dir: &Path) -> io::Result<Vec<u64>> {
        let mut numbers = Vec::new();
        if !dir.exists() {
            return Ok(numbers);
        }
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(number) = WalSegment::parse_segment_number(&name.to_string_lossy()) {
                numbers.push(number);
            }
        }
        numbers.sort_unstable();
        Ok(numbers)
    }

    /// Replay every record across every segment in order, stopping at the
    /// first torn or corrupt record (spec.md §4.2: recovery never applies
    /// a partially-written record). Equivalent to draining
    /// [`Wal::recover_stream`] into a `Vec`.
    pub fn recover(dir: &Path) -> Result<Vec<RecoveredRecord>, RecoverError> {
        Self::recover_stream(dir)?.collect()
    }

    /// Like [`Wal::recover`], but yields records lazily so a caller can
    /// start re-driving the compute/apply pipeline before the whole WAL
    /// has been read.
    pub fn recover_stream(
        dir: &Path,
    ) -> Result<impl Iterator<Item = Result<RecoveredRecord, RecoverError>>, RecoverError> {
        let numbers = Self::list_segment_numbers(dir)?;
        let dir = dir.to_path_buf();
        Ok(SegmentRecordIter::new(dir, numbers))
    }
}

impl Drop for Wal {
    /// Finalize the active segment's `file_crc32c` on the way out, so a
    /// graceful shutdown leaves every segment checksummed (spec.md §4.3
    /// `Close()`). A segment that was never finalized (process killed,
    /// not dropped cleanly) is exactly the "active, unverified" case
    /// recovery already tolerates.
    fn drop(&mut self) {
        if let Some(segment) = self.segment.as_mut() {
            if let Err(e) = segment.finalize() {
                tracing::warn!(error = %e, "failed to finalize wal segment on close");
            }
        }
    }
}

struct SegmentRecordIter {
    dir: PathBuf,
    remaining_segments: std::vec::IntoIter<u64>,
    current: Option<(u64, Vec<u8>, usize)>,
}

impl SegmentRecordIter {
    fn new(dir: PathBuf, numbers: Vec<u64>) -> Self {
        SegmentRecordIter {
            dir,
            remaining_segments: numbers.into_iter(),
            current: None,
        }
    }

    fn load_next_segment(&mut self) -> Result<bool, RecoverError> {
        loop {
            let Some(number) = self.remaining_segments.next() else {
                return Ok(false);
            };
            // The active (highest-numbered) segment is never finalized
            // mid-recovery, so its file_crc32c is still a placeholder —
            // only verify segments behind it. open_read validates the
            // header either way; we re-read the whole file (transparently
            // decompressing) to get past it uniformly.
            let is_active = self.remaining_segments.len() == 0;
            match WalSegment::open_read(&self.dir, number, !is_active) {
                Ok(_) => {}
                Err(SegmentError::FileChecksumMismatch(_)) => {
                    tracing::error!(segment = number, "wal recovery found a torn finalized segment, skipping it");
                    continue;
                }
                Err(_) => continue,
            }
            let path = WalSegment::segment_path(&self.dir, number);
            let bytes = read_possibly_compressed(&path)?;
            let body = if bytes.len() as u64 >= SEGMENT_HEADER_SIZE {
                bytes[SEGMENT_HEADER_SIZE as usize..].to_vec()
            } else {
                Vec::new()
            };
            self.current = Some((number, body, 0));
            return Ok(true);
        }
    }
}

impl Iterator for SegmentRecordIter {
    type Item = Result<RecoveredRecord, RecoverError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match &mut self.current {
                None => match self.load_next_segment() {
                    Ok(true) => continue,
                    Ok(false) => return None,
                    Err(e) => return Some(Err(e)),
                },
                Some((number, bytes, offset)) => {
                    if *offset >= bytes.len() {
                        self.current = None;
                        continue;
                    }
                    match WalRecord::from_bytes(&bytes[*offset..]) {
                        Ok((record, consumed)) => {
                            *offset += consumed;
                            return Some(Ok(RecoveredRecord {
                                segment_number: *number,
                                record,
                            }));
                        }
                        Err(RecordError::Truncated { .. }) => {
                            // Torn tail: this segment is done, and since
                            // segments are only ever appended to in order,
                            // so is recovery.
                            tracing::warn!(segment = *number, offset = *offset, "wal recovery stopped at a torn tail");
                            self.current = None;
                            return None;
                        }
                        Err(e) => {
                            // Corrupt mid-stream record: stop here too,
                            // rather than risk applying out-of-order data.
                            tracing::error!(segment = *number, offset = *offset, error = %e, "wal recovery stopped at a corrupt record");
                            self.current = None;
                            return None;
                        }
                    }
                }
            }
        }
    }
}

fn compress_segment_in_place(path: &Path) -> io::Result<()> {
    let raw = std::fs::read(path)?;
    let gz_path = path.with_extension("wal.gz");
    let file = std::fs::File::create(&gz_path)?;
    let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    use io::Write;
    encoder.write_all(&raw)?;
    encoder.finish()?;
    std::fs::remove_file(path)?;
    Ok(())
}

fn read_possibly_compressed(path: &Path) -> io::Result<Vec<u8>> {
    let gz_path = path.with_extension("wal.gz");
    if gz_path.exists() {
        let file = std::fs::File::open(&gz_path)?;
        let mut decoder = flate2::read::GzDecoder::new(file);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    } else {
        std::fs::read(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn small_config() -> WalConfig {
        let mut config = WalConfig::default();
        config.max_file_size = 1024 * 1024;
        config.batch_size = 1;
        config.batch_interval = Duration::from_millis(0);
        config
    }

    #[test]
    fn append_then_recover_round_trips() {
        let dir = tempdir().unwrap();
        {
            let mut wal = Wal::open(dir.path(), small_config()).unwrap();
            wal.append(&WalRecord::enqueue(1, b"one".to_vec())).unwrap();
            wal.append(&WalRecord::enqueue(2, b"two".to_vec())).unwrap();
            wal.flush().unwrap();
        }
        let recovered = Wal::recover(dir.path()).unwrap();
        assert_eq!(recovered.len(), 2);
        assert_eq!(recovered[0].record.enq_seq, 1);
        assert_eq!(recovered[1].record.enq_seq, 2);
    }

    #[test]
    fn disabled_wal_never_creates_files() {
        let dir = tempdir().unwrap();
        let mut config = WalConfig::default();
        config.enabled = false;
        let mut wal = Wal::open(dir.path(), config).unwrap();
        wal.append(&WalRecord::enqueue(1, b"x".to_vec())).unwrap();
        assert!(!dir.path().join("000001.wal").exists());
    }

    #[test]
    fn rotation_creates_new_segment_past_max_size() {
        let dir = tempdir().unwrap();
        let mut config = small_config();
        config.max_file_size = 64;
        config.enable_compress = false;
        let mut wal = Wal::open(dir.path(), config).unwrap();
        for i in 0..20u64 {
            wal.append(&WalRecord::enqueue(i, vec![0u8; 16])).unwrap();
        }
        assert!(wal.current_segment_number() > 1);
    }

    #[test]
    fn recovery_stops_at_torn_tail() {
        let dir = tempdir().unwrap();
        {
            let mut wal = Wal::open(dir.path(), small_config()).unwrap();
            wal.append(&WalRecord::enqueue(1, b"full".to_vec())).unwrap();
            wal.flush().unwrap();
        }
        let path = dir.path().join("000001.wal");
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 2);
        std::fs::write(&path, bytes).unwrap();

        let recovered = Wal::recover(dir.path()).unwrap();
        assert!(recovered.is_empty());
    }

    #[test]
    fn resuming_an_existing_segment_continues_numbering() {
        let dir = tempdir().unwrap();
        {
            let mut wal = Wal::open(dir.path(), small_config()).unwrap();
            wal.append(&WalRecord::enqueue(1, b"a".to_vec())).unwrap();
            wal.flush().unwrap();
        }
        let wal = Wal::open(dir.path(), small_config()).unwrap();
        assert_eq!(wal.current_segment_number(), 1);
    }
}

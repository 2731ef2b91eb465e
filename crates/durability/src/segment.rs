//! WAL segment files: `000001.wal`, `000002.wal`, …
//!
//! Each segment starts with a 9-byte header (`"WALF"` magic, a format
//! version byte, and a whole-file CRC32 filled in once the segment is
//! finalized) followed by a stream of [`crate::record::WalRecord`]
//! frames. Naming and the open-for-append/create/rotate lifecycle follow
//! the teacher's `WalSegment` (`wal-NNNNNN.seg`), renamed to the
//! `NNNNNN.wal` layout spec.md §4.2 names. The per-record checksum in
//! [`crate::record::WalRecord`] catches a single torn record; the
//! file-level checksum here catches a torn tail that happens to land on
//! a record boundary (e.g. a whole missing record) once a segment has
//! been finalized and is no longer being appended to.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Segment file magic bytes.
pub const SEGMENT_MAGIC: &[u8; 4] = b"WALF";
/// Current on-disk segment format version.
pub const SEGMENT_FORMAT_VERSION: u8 = 1;
/// Offset of the `file_crc32c` field within the header.
const CRC_OFFSET: u64 = 5;
/// Size of the fixed segment header: magic(4) + version(1) + crc32(4).
pub const SEGMENT_HEADER_SIZE: u64 = 9;
/// Placeholder value written at `create()` time, before the segment has
/// been finalized. A real CRC32 landing on this exact value is
/// astronomically unlikely and not worth guarding against.
const UNFINALIZED_CRC: u32 = 0;

/// Errors opening or operating on a segment file.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The file's magic bytes did not match [`SEGMENT_MAGIC`].
    #[error("bad segment magic: {0:?}")]
    BadMagic([u8; 4]),

    /// The file's format version byte is newer than this build supports.
    #[error("unsupported segment format version: {0}")]
    UnsupportedVersion(u8),

    /// A finalized segment's body doesn't match its stored `file_crc32c`.
    #[error("segment {0} file checksum mismatch: a finalized segment's tail was torn or corrupted")]
    FileChecksumMismatch(u64),
}

/// An open WAL segment file, positioned for appending.
pub struct WalSegment {
    file: File,
    path: PathBuf,
    number: u64,
    size: u64,
    finalized: bool,
}

impl WalSegment {
    /// Path for segment `number` inside `dir`, e.g. `dir/000001.wal`.
    pub fn segment_path(dir: &Path, number: u64) -> PathBuf {
        dir.join(format!("{number:06}.wal"))
    }

    /// Extract the segment number from a `NNNNNN.wal` file name.
    pub fn parse_segment_number(file_name: &str) -> Option<u64> {
        let stem = file_name.strip_suffix(".wal")?;
        if stem.len() != 6 || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        stem.parse().ok()
    }

    /// Create a new, empty segment and write its header.
    pub fn create(dir: &Path, number: u64) -> Result<Self, SegmentError> {
        std::fs::create_dir_all(dir)?;
        let path = Self::segment_path(dir, number);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .read(true)
            .open(&path)?;
        file.write_all(SEGMENT_MAGIC)?;
        file.write_all(&[SEGMENT_FORMAT_VERSION])?;
        file.write_all(&UNFINALIZED_CRC.to_le_bytes())?;
        file.flush()?;
        Ok(WalSegment {
            file,
            path,
            number,
            size: SEGMENT_HEADER_SIZE,
            finalized: false,
        })
    }

    /// Open an existing segment for appending, validating its header and
    /// seeking to end-of-file.
    pub fn open_append(dir: &Path, number: u64) -> Result<Self, SegmentError> {
        let path = Self::segment_path(dir, number);
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let mut header = [0u8; SEGMENT_HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        let magic: [u8; 4] = header[0..4].try_into().unwrap();
        if &magic != SEGMENT_MAGIC {
            return Err(SegmentError::BadMagic(magic));
        }
        if header[4] > SEGMENT_FORMAT_VERSION {
            return Err(SegmentError::UnsupportedVersion(header[4]));
        }

        let size = file.seek(SeekFrom::End(0))?;
        Ok(WalSegment {
            file,
            path,
            number,
            size,
            // Reopened for more appends: whatever finalization happened
            // before is stale the moment a new record is written.
            finalized: false,
        })
    }

    /// Open an existing segment for read-only recovery scanning. When
    /// `verify_finalized` is set, a stored `file_crc32c` other than the
    /// unfinalized placeholder is checked against the segment's body and
    /// a mismatch is reported as [`SegmentError::FileChecksumMismatch`].
    pub fn open_read(dir: &Path, number: u64, verify_finalized: bool) -> Result<Self, SegmentError> {
        let path = Self::segment_path(dir, number);
        let mut file = OpenOptions::new().read(true).open(&path)?;
        let mut header = [0u8; SEGMENT_HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        let magic: [u8; 4] = header[0..4].try_into().unwrap();
        if &magic != SEGMENT_MAGIC {
            return Err(SegmentError::BadMagic(magic));
        }
        let stored_crc = u32::from_le_bytes(header[5..9].try_into().unwrap());
        let size = file.metadata()?.len();

        if verify_finalized && stored_crc != UNFINALIZED_CRC {
            let mut body = Vec::with_capacity((size - SEGMENT_HEADER_SIZE) as usize);
            file.read_to_end(&mut body)?;
            file.seek(SeekFrom::Start(SEGMENT_HEADER_SIZE))?;
            if crc32fast::hash(&body) != stored_crc {
                return Err(SegmentError::FileChecksumMismatch(number));
            }
        }

        Ok(WalSegment {
            file,
            path,
            number,
            size,
            finalized: stored_crc != UNFINALIZED_CRC,
        })
    }

    /// Append raw bytes (an already-framed record) to the segment.
    pub fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)?;
        self.size += bytes.len() as u64;
        self.finalized = false;
        Ok(())
    }

    /// fsync the segment file.
    pub fn sync(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }

    /// Compute a CRC32 over the segment's body and back-patch it into the
    /// header's `file_crc32c` slot, fsync-ing the result. Called once a
    /// segment is done being appended to (rotation, graceful close) so
    /// recovery can detect a torn tail on a segment that otherwise looks
    /// complete record-by-record.
    pub fn finalize(&mut self) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(SEGMENT_HEADER_SIZE))?;
        let mut body = Vec::with_capacity((self.size - SEGMENT_HEADER_SIZE) as usize);
        self.file.read_to_end(&mut body)?;
        let crc = crc32fast::hash(&body);

        self.file.seek(SeekFrom::Start(CRC_OFFSET))?;
        self.file.write_all(&crc.to_le_bytes())?;
        self.file.sync_data()?;
        self.file.seek(SeekFrom::End(0))?;
        self.finalized = true;
        Ok(())
    }

    /// Whether this segment's `file_crc32c` reflects its current body.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Read the remainder of the file from the current position onward.
    pub fn read_tail(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Seek to just past the header, for a full rescan.
    pub fn seek_to_body(&mut self) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(SEGMENT_HEADER_SIZE))?;
        Ok(())
    }

    /// Current file size in bytes, including the header.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// This segment's number.
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Filesystem path of this segment.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Truncate the file at `position`, discarding a torn tail found
    /// during recovery.
    pub fn truncate(&mut self, position: u64) -> io::Result<()> {
        self.file.set_len(position)?;
        self.size = position;
        self.file.seek(SeekFrom::Start(position))?;
        self.finalized = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_then_open_append_round_trips_header() {
        let dir = tempdir().unwrap();
        {
            let mut seg = WalSegment::create(dir.path(), 1).unwrap();
            seg.write(b"hello").unwrap();
            seg.sync().unwrap();
        }
        let seg = WalSegment::open_append(dir.path(), 1).unwrap();
        assert_eq!(seg.size(), SEGMENT_HEADER_SIZE + 5);
    }

    #[test]
    fn segment_path_naming() {
        let dir = Path::new("/data/wal");
        assert_eq!(
            WalSegment::segment_path(dir, 1),
            PathBuf::from("/data/wal/000001.wal")
        );
        assert_eq!(
            WalSegment::segment_path(dir, 42),
            PathBuf::from("/data/wal/000042.wal")
        );
    }

    #[test]
    fn parse_segment_number_round_trips() {
        assert_eq!(WalSegment::parse_segment_number("000007.wal"), Some(7));
        assert_eq!(WalSegment::parse_segment_number("not-a-segment"), None);
        assert_eq!(WalSegment::parse_segment_number("0007.wal"), None);
    }

    #[test]
    fn open_append_rejects_bad_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("000001.wal");
        std::fs::write(&path, b"NOPE!xxxx").unwrap();
        assert!(matches!(
            WalSegment::open_append(dir.path(), 1),
            Err(SegmentError::BadMagic(_))
        ));
    }

    #[test]
    fn truncate_discards_tail() {
        let dir = tempdir().unwrap();
        let mut seg = WalSegment::create(dir.path(), 1).unwrap();
        seg.write(b"0123456789").unwrap();
        seg.truncate(SEGMENT_HEADER_SIZE + 5).unwrap();
        assert_eq!(seg.size(), SEGMENT_HEADER_SIZE + 5);
    }

    #[test]
    fn finalize_writes_a_checksum_that_open_read_verifies() {
        let dir = tempdir().unwrap();
        {
            let mut seg = WalSegment::create(dir.path(), 1).unwrap();
            seg.write(b"hello world").unwrap();
            seg.finalize().unwrap();
        }
        let seg = WalSegment::open_read(dir.path(), 1, true).unwrap();
        assert!(seg.is_finalized());
    }

    #[test]
    fn unfinalized_segment_skips_checksum_verification() {
        let dir = tempdir().unwrap();
        {
            let mut seg = WalSegment::create(dir.path(), 1).unwrap();
            seg.write(b"hello world").unwrap();
            seg.sync().unwrap();
        }
        let seg = WalSegment::open_read(dir.path(), 1, true).unwrap();
        assert!(!seg.is_finalized());
    }

    #[test]
    fn corrupted_finalized_segment_fails_checksum_verification() {
        let dir = tempdir().unwrap();
        {
            let mut seg = WalSegment::create(dir.path(), 1).unwrap();
            seg.write(b"hello world").unwrap();
            seg.finalize().unwrap();
        }
        let path = WalSegment::segment_path(dir.path(), 1);
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            WalSegment::open_read(dir.path(), 1, true),
            Err(SegmentError::FileChecksumMismatch(1))
        ));
    }
}

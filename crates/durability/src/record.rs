//! WAL record framing: length prefix, payload, trailing CRC32.
//!
//! Layout: `len:u32 LE | kind:u8 | enq_seq:u64 LE | payload[len-9] | crc32:u32 LE`.
//! `len` covers everything between it and the checksum. This mirrors the
//! teacher's `WalRecord::to_bytes`/`from_bytes` (length-prefixed record with
//! a trailing `crc32fast` checksum over the payload), generalized from a
//! committed `Writeset` to an opaque ingest-queue payload plus the
//! `enq_seq` identity the queue assigns.

use thiserror::Error;

/// A single WAL record: one enqueued item, or a liveness marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    /// The queue's global monotonic sequence for this record.
    pub enq_seq: u64,
    /// What kind of record this is.
    pub kind: RecordKind,
    /// Opaque payload bytes (the serialized ingest item, or empty for a
    /// sync marker).
    pub payload: Vec<u8>,
}

/// Tag distinguishing an enqueued item from the WAL sync marker
/// (spec.md §6: `__progressdb_wal_sync_marker__`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// A queued ingest item.
    Enqueue = 0,
    /// A liveness probe with no payload.
    SyncMarker = 1,
}

impl RecordKind {
    fn from_tag(tag: u8) -> Result<Self, RecordError> {
        match tag {
            0 => Ok(RecordKind::Enqueue),
            1 => Ok(RecordKind::SyncMarker),
            other => Err(RecordError::UnknownKind(other)),
        }
    }
}

/// Errors decoding a [`WalRecord`] from bytes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    /// Fewer bytes were available than the length prefix promised; the
    /// record is a torn write at the tail of the segment.
    #[error("truncated record: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes the length prefix promised.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },

    /// The record's stored CRC32 did not match the computed one.
    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// Checksum read from the record.
        stored: u32,
        /// Checksum computed over the payload.
        computed: u32,
    },

    /// The length prefix was too small to contain a kind tag + enq_seq +
    /// checksum.
    #[error("record too short: {0} bytes")]
    TooShort(usize),

    /// An unrecognized record-kind tag.
    #[error("unknown record kind tag: {0}")]
    UnknownKind(u8),
}

const FIXED_OVERHEAD: usize = 1 /* kind */ + 8 /* enq_seq */ + 4 /* crc32 */;

impl WalRecord {
    /// Construct an `Enqueue` record.
    pub fn enqueue(enq_seq: u64, payload: Vec<u8>) -> Self {
        WalRecord {
            enq_seq,
            kind: RecordKind::Enqueue,
            payload,
        }
    }

    /// Construct the sync-marker record (spec.md §6).
    pub fn sync_marker(enq_seq: u64) -> Self {
        WalRecord {
            enq_seq,
            kind: RecordKind::SyncMarker,
            payload: Vec::new(),
        }
    }

    /// Encode as `len | kind | enq_seq | payload | crc32`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(FIXED_OVERHEAD + self.payload.len());
        body.push(self.kind as u8);
        body.extend_from_slice(&self.enq_seq.to_le_bytes());
        body.extend_from_slice(&self.payload);

        let crc = crc32fast::hash(&body);

        let len = (body.len() + 4) as u32;
        let mut out = Vec::with_capacity(4 + body.len() + 4);
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&body);
        out.extend_from_slice(&crc.to_le_bytes());
        out
    }

    /// Decode one record from the front of `bytes`, returning the record
    /// and the number of bytes consumed. Returns `Truncated` rather than
    /// panicking when `bytes` holds less than the length prefix promises,
    /// so a reader can stop cleanly at a torn tail.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), RecordError> {
        if bytes.len() < 4 {
            return Err(RecordError::Truncated {
                needed: 4,
                available: bytes.len(),
            });
        }
        let len = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
        if bytes.len() < 4 + len {
            return Err(RecordError::Truncated {
                needed: 4 + len,
                available: bytes.len(),
            });
        }
        if len < FIXED_OVERHEAD {
            return Err(RecordError::TooShort(len));
        }

        let frame = &bytes[4..4 + len];
        let (body, crc_bytes) = frame.split_at(len - 4);
        let stored_crc = u32::from_le_bytes(crc_bytes.try_into().unwrap());
        let computed_crc = crc32fast::hash(body);
        if stored_crc != computed_crc {
            return Err(RecordError::ChecksumMismatch {
                stored: stored_crc,
                computed: computed_crc,
            });
        }

        let kind = RecordKind::from_tag(body[0])?;
        let enq_seq = u64::from_le_bytes(body[1..9].try_into().unwrap());
        let payload = body[9..].to_vec();

        Ok((
            WalRecord {
                enq_seq,
                kind,
                payload,
            },
            4 + len,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_record_round_trips() {
        let record = WalRecord::enqueue(7, b"hello".to_vec());
        let bytes = record.to_bytes();
        let (decoded, consumed) = WalRecord::from_bytes(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, record);
    }

    #[test]
    fn sync_marker_round_trips() {
        let record = WalRecord::sync_marker(1);
        let bytes = record.to_bytes();
        let (decoded, _) = WalRecord::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.kind, RecordKind::SyncMarker);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn truncated_tail_is_detected() {
        let record = WalRecord::enqueue(1, b"payload".to_vec());
        let bytes = record.to_bytes();
        let torn = &bytes[..bytes.len() - 2];
        assert!(matches!(
            WalRecord::from_bytes(torn),
            Err(RecordError::Truncated { .. })
        ));
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let record = WalRecord::enqueue(1, b"payload".to_vec());
        let mut bytes = record.to_bytes();
        let last = bytes.len() - 5;
        bytes[last] ^= 0xff;
        assert!(matches!(
            WalRecord::from_bytes(&bytes),
            Err(RecordError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn two_records_concatenate_and_parse_sequentially() {
        let r1 = WalRecord::enqueue(1, b"a".to_vec());
        let r2 = WalRecord::enqueue(2, b"bb".to_vec());
        let mut bytes = r1.to_bytes();
        bytes.extend_from_slice(&r2.to_bytes());

        let (decoded1, consumed1) = WalRecord::from_bytes(&bytes).unwrap();
        let (decoded2, _) = WalRecord::from_bytes(&bytes[consumed1..]).unwrap();
        assert_eq!(decoded1, r1);
        assert_eq!(decoded2, r2);
    }
}

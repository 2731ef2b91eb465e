//! Canonical key encoding and parsing (spec.md §4.1)
//!
//! Keys are ASCII, colon-delimited, and lexicographically sortable by
//! construction: zero-padded timestamp and sequence fields guarantee that
//! byte order equals chronological order. Validation style (reserved
//! prefixes, length ceilings, doctested examples) follows the teacher's
//! `key::validate_key`, generalized from a single flat validator into a
//! composite-key formatter/parser for threads, messages, and versions.

use crate::limits::Limits;
use crate::types::{Seq, Timestamp};
use thiserror::Error;

/// The reserved liveness-probe key spec.md §6 names literally.
pub const WAL_SYNC_MARKER_KEY: &str = "__progressdb_wal_sync_marker__";

/// Errors raised while formatting or parsing a key.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// `thread_key` is empty.
    #[error("thread key is empty")]
    EmptyThreadKey,

    /// `thread_key` contains a character outside `[A-Za-z0-9._-]`.
    #[error("thread key contains an invalid character: {0:?}")]
    InvalidCharacter(char),

    /// `thread_key` exceeds the configured length ceiling.
    #[error("thread key too long: {actual} bytes exceeds maximum {max}")]
    TooLong {
        /// Actual length in bytes.
        actual: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// The key did not match any recognized layout.
    #[error("unrecognized key format: {0:?}")]
    Unrecognized(String),
}

impl KeyError {
    /// Reason code for surfacing to an external HTTP layer.
    pub fn reason_code(&self) -> &'static str {
        match self {
            KeyError::EmptyThreadKey => "thread_key_empty",
            KeyError::InvalidCharacter(_) => "thread_key_invalid_character",
            KeyError::TooLong { .. } => "thread_key_too_long",
            KeyError::Unrecognized(_) => "invalid_key",
        }
    }
}

/// Validate a `thread_key` per spec.md §3: non-empty, `[A-Za-z0-9._-]`,
/// at most `limits.max_thread_key_bytes` bytes.
///
/// ```
/// use progressdb_core::key::validate_thread_key;
/// use progressdb_core::Limits;
///
/// let limits = Limits::default();
/// assert!(validate_thread_key("alice-thread.1", &limits).is_ok());
/// assert!(validate_thread_key("", &limits).is_err());
/// assert!(validate_thread_key("has space", &limits).is_err());
/// ```
pub fn validate_thread_key(thread_key: &str, limits: &Limits) -> Result<(), KeyError> {
    if thread_key.is_empty() {
        return Err(KeyError::EmptyThreadKey);
    }
    if thread_key.len() > limits.max_thread_key_bytes {
        return Err(KeyError::TooLong {
            actual: thread_key.len(),
            max: limits.max_thread_key_bytes,
        });
    }
    for c in thread_key.chars() {
        if !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-') {
            return Err(KeyError::InvalidCharacter(c));
        }
    }
    Ok(())
}

/// The result of `ParseKey` (spec.md §4.1): a tagged variant over every
/// key layout this store produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedKey {
    /// `t:<thread_key>` — thread metadata.
    Thread {
        /// The thread key.
        thread_key: String,
    },
    /// `t:<thread_key>:m:<ts20>:<seq9>` — a message within a thread.
    Message {
        /// The owning thread.
        thread_key: String,
        /// Creation timestamp.
        ts: Timestamp,
        /// Per-thread sequence.
        seq: Seq,
    },
    /// `version:msg:<msg_key>:<ts20>-<seq6>` — a message version.
    Version {
        /// The message this version belongs to.
        msg_key: String,
        /// Version timestamp.
        ts: Timestamp,
        /// Version sequence (legacy 6-digit width).
        seq: Seq,
    },
    /// Any other recognized-but-opaque admin/index key.
    Index {
        /// The raw key string.
        raw: String,
    },
}

/// Canonical key formatter/parser (spec.md §4.1).
pub struct KeyEncoder;

impl KeyEncoder {
    /// `MsgKey(thread, ts, seq) -> "t:<thread>:m:<ts20>:<seq9>"`
    pub fn msg_key(thread_key: &str, ts: Timestamp, seq: Seq) -> String {
        format!("t:{}:m:{}:{}", thread_key, ts.key_digits(), seq.key_digits9())
    }

    /// `VersionKey(msg_key, ts, seq) -> "version:msg:<msg_key>:<ts20>-<seq6>"`
    pub fn version_key(msg_key: &str, ts: Timestamp, seq: Seq) -> String {
        format!(
            "version:msg:{}:{}-{}",
            msg_key,
            ts.key_digits(),
            seq.key_digits6()
        )
    }

    /// `ThreadMetaKey(thread) -> "t:<thread>"` (the new, compact layout
    /// this implementation commits to writing; see spec.md §9 Open
    /// Questions — legacy `thread:<id>:meta` keys are recognized by
    /// `parse` but never produced).
    pub fn thread_meta_key(thread_key: &str) -> String {
        format!("t:{}", thread_key)
    }

    /// `MsgPrefix(thread) -> "t:<thread>:m:"` — prefix for scanning every
    /// message belonging to a thread in insertion order.
    pub fn msg_prefix(thread_key: &str) -> String {
        format!("t:{}:m:", thread_key)
    }

    /// `backup:migrate:<original_key>` — see spec.md §11 supplemental
    /// features. No migration tool ships here; this exists so a future
    /// one doesn't have to re-derive the format.
    pub fn backup_key(kind: BackupKind, original_key: &str) -> String {
        match kind {
            BackupKind::Migrate => format!("backup:migrate:{}", original_key),
            BackupKind::Encrypt => format!("backup:encrypt:{}", original_key),
        }
    }

    /// Parse any key this store produces or recognizes back into a
    /// [`ParsedKey`]. Round-trips with `msg_key`/`version_key`/
    /// `thread_meta_key` by construction (spec.md §8 round-trip laws).
    pub fn parse(key: &str) -> Result<ParsedKey, KeyError> {
        if let Some(rest) = key.strip_prefix("version:msg:") {
            return Self::parse_version(rest, key);
        }
        if let Some(rest) = key.strip_prefix("t:") {
            return Self::parse_thread_scoped(rest, key);
        }
        if let Some(rest) = key.strip_prefix("thread:") {
            // Legacy scheme: thread:<id>:meta or thread:<id>:msg:<ts>-<seq>
            return Self::parse_legacy(rest, key);
        }
        Ok(ParsedKey::Index {
            raw: key.to_string(),
        })
    }

    fn parse_thread_scoped(rest: &str, original: &str) -> Result<ParsedKey, KeyError> {
        match rest.split_once(":m:") {
            Some((thread_key, tail)) => {
                let (ts_str, seq_str) = tail
                    .split_once(':')
                    .ok_or_else(|| KeyError::Unrecognized(original.to_string()))?;
                let ts = Timestamp::parse_key_digits(ts_str)
                    .ok_or_else(|| KeyError::Unrecognized(original.to_string()))?;
                let seq = Seq::parse_key_digits(seq_str, 9)
                    .ok_or_else(|| KeyError::Unrecognized(original.to_string()))?;
                Ok(ParsedKey::Message {
                    thread_key: thread_key.to_string(),
                    ts,
                    seq,
                })
            }
            None => Ok(ParsedKey::Thread {
                thread_key: rest.to_string(),
            }),
        }
    }

    fn parse_version(rest: &str, original: &str) -> Result<ParsedKey, KeyError> {
        let (msg_key, tail) = rest
            .rsplit_once(':')
            .ok_or_else(|| KeyError::Unrecognized(original.to_string()))?;
        let (ts_str, seq_str) = tail
            .split_once('-')
            .ok_or_else(|| KeyError::Unrecognized(original.to_string()))?;
        let ts = Timestamp::parse_key_digits(ts_str)
            .ok_or_else(|| KeyError::Unrecognized(original.to_string()))?;
        let seq = Seq::parse_key_digits(seq_str, 6)
            .ok_or_else(|| KeyError::Unrecognized(original.to_string()))?;
        Ok(ParsedKey::Version {
            msg_key: msg_key.to_string(),
            ts,
            seq,
        })
    }

    fn parse_legacy(rest: &str, original: &str) -> Result<ParsedKey, KeyError> {
        if let Some(thread_key) = rest.strip_suffix(":meta") {
            return Ok(ParsedKey::Thread {
                thread_key: thread_key.to_string(),
            });
        }
        Err(KeyError::Unrecognized(original.to_string()))
    }
}

/// `ParseKey` as a free function, matching spec.md §4.1's naming.
pub fn parse_key(key: &str) -> Result<ParsedKey, KeyError> {
    KeyEncoder::parse(key)
}

/// Alias kept for callers that prefer the spec's exact name.
pub type ParseKey = ParsedKey;

/// Which backup-on-rewrite key family to format (spec.md §6, §11).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupKind {
    /// A key rewritten by a scheme migration.
    Migrate,
    /// A key rewritten by an encryption rotation.
    Encrypt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msg_key_round_trips() {
        let ts = Timestamp::from_micros(1_700_000_000_000_000);
        let seq = Seq(42);
        let key = KeyEncoder::msg_key("alice-thread", ts, seq);
        assert_eq!(key, "t:alice-thread:m:00000001700000000000000:000000042");
        match KeyEncoder::parse(&key).unwrap() {
            ParsedKey::Message {
                thread_key,
                ts: parsed_ts,
                seq: parsed_seq,
            } => {
                assert_eq!(thread_key, "alice-thread");
                assert_eq!(parsed_ts, ts);
                assert_eq!(parsed_seq, seq);
            }
            other => panic!("expected Message, got {other:?}"),
        }
    }

    #[test]
    fn version_key_round_trips() {
        let ts = Timestamp::from_micros(123);
        let seq = Seq(7);
        let msg_key = "t:alice-thread:m:00000000000000000123:000000007";
        let key = KeyEncoder::version_key(msg_key, ts, seq);
        match KeyEncoder::parse(&key).unwrap() {
            ParsedKey::Version {
                msg_key: parsed_msg,
                ts: parsed_ts,
                seq: parsed_seq,
            } => {
                assert_eq!(parsed_msg, msg_key);
                assert_eq!(parsed_ts, ts);
                assert_eq!(parsed_seq, seq);
            }
            other => panic!("expected Version, got {other:?}"),
        }
    }

    #[test]
    fn thread_meta_key_round_trips() {
        let key = KeyEncoder::thread_meta_key("alice-thread");
        assert_eq!(key, "t:alice-thread");
        match KeyEncoder::parse(&key).unwrap() {
            ParsedKey::Thread { thread_key } => assert_eq!(thread_key, "alice-thread"),
            other => panic!("expected Thread, got {other:?}"),
        }
    }

    #[test]
    fn legacy_thread_meta_key_recognized() {
        match KeyEncoder::parse("thread:alice-thread:meta").unwrap() {
            ParsedKey::Thread { thread_key } => assert_eq!(thread_key, "alice-thread"),
            other => panic!("expected Thread, got {other:?}"),
        }
    }

    #[test]
    fn msg_prefix_matches_all_messages_in_thread() {
        let prefix = KeyEncoder::msg_prefix("alice-thread");
        let key = KeyEncoder::msg_key("alice-thread", Timestamp::from_micros(5), Seq(1));
        assert!(key.starts_with(&prefix));
        let other_thread_key = KeyEncoder::msg_key("bob-thread", Timestamp::from_micros(5), Seq(1));
        assert!(!other_thread_key.starts_with(&prefix));
    }

    #[test]
    fn message_keys_sort_by_thread_then_ts_then_seq() {
        let k1 = KeyEncoder::msg_key("t", Timestamp::from_micros(1), Seq(1));
        let k2 = KeyEncoder::msg_key("t", Timestamp::from_micros(1), Seq(2));
        let k3 = KeyEncoder::msg_key("t", Timestamp::from_micros(2), Seq(1));
        assert!(k1 < k2);
        assert!(k2 < k3);
    }

    #[test]
    fn backup_key_formats() {
        assert_eq!(
            KeyEncoder::backup_key(BackupKind::Migrate, "t:x"),
            "backup:migrate:t:x"
        );
        assert_eq!(
            KeyEncoder::backup_key(BackupKind::Encrypt, "t:x"),
            "backup:encrypt:t:x"
        );
    }

    #[test]
    fn validate_thread_key_rejects_empty_and_bad_chars() {
        let limits = Limits::default();
        assert_eq!(
            validate_thread_key("", &limits),
            Err(KeyError::EmptyThreadKey)
        );
        assert!(validate_thread_key("has space", &limits).is_err());
        assert!(validate_thread_key("valid-thread.1_2", &limits).is_ok());
    }

    #[test]
    fn validate_thread_key_enforces_length() {
        let limits = Limits::with_small_limits();
        let key = "x".repeat(limits.max_thread_key_bytes + 1);
        assert!(matches!(
            validate_thread_key(&key, &limits),
            Err(KeyError::TooLong { .. })
        ));
    }

    #[test]
    fn parse_unrecognized_falls_back_to_index() {
        match KeyEncoder::parse("rel:u:alice:t:thread1").unwrap() {
            ParsedKey::Index { raw } => assert_eq!(raw, "rel:u:alice:t:thread1"),
            other => panic!("expected Index, got {other:?}"),
        }
    }

    #[test]
    fn wal_sync_marker_key_is_literal() {
        assert_eq!(WAL_SYNC_MARKER_KEY, "__progressdb_wal_sync_marker__");
    }
}

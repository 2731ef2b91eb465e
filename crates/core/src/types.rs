//! Shared small types: timestamps, identifiers, pagination
//!
//! `Timestamp` follows the teacher's microsecond-precision newtype pattern
//! (`contract::timestamp::Timestamp` — explicit constructors, no raw
//! arithmetic on the wrapped integer).

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Microsecond-precision timestamp, the canonical time representation
/// on disk. The 20-digit zero-padded decimal form used inside keys
/// (spec.md §4.1) is produced by [`Timestamp::key_digits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Unix epoch.
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Current time. Returns epoch if the system clock precedes Unix epoch.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_micros() as u64)
    }

    /// Construct from raw microseconds since epoch.
    #[inline]
    pub const fn from_micros(micros: u64) -> Self {
        Timestamp(micros)
    }

    /// Microseconds since epoch.
    #[inline]
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// The fixed-width 20-digit decimal form used inside `MsgKey`/
    /// `VersionKey` (spec.md §4.1: `ts20`). Zero-padded so lexicographic
    /// order equals numeric order.
    pub fn key_digits(&self) -> String {
        format!("{:020}", self.0)
    }

    /// Parse a `key_digits` string back into a `Timestamp`.
    pub fn parse_key_digits(s: &str) -> Option<Self> {
        if s.len() != 20 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        s.parse::<u64>().ok().map(Timestamp)
    }

    /// RFC3339 nanosecond-precision string, used for the WAL sync marker
    /// value (spec.md §6).
    pub fn to_rfc3339_nanos(&self) -> String {
        let dt = chrono::DateTime::<chrono::Utc>::from(
            UNIX_EPOCH + Duration::from_micros(self.0),
        );
        dt.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::EPOCH
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-thread monotonic sequence assigned at apply time (spec.md §4.6).
/// The zero-padded 9-digit form (`seq9`) is used inside `MsgKey`; the
/// 6-digit form (`seq6`) is used inside the legacy `VersionKey` layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Seq(pub u64);

impl Seq {
    /// Zero-padded 9-digit form used in `MsgKey`.
    pub fn key_digits9(&self) -> String {
        format!("{:09}", self.0)
    }

    /// Zero-padded 6-digit form used in the version-key layout.
    pub fn key_digits6(&self) -> String {
        format!("{:06}", self.0)
    }

    /// Parse a zero-padded decimal sequence of the given width.
    pub fn parse_key_digits(s: &str, width: usize) -> Option<Self> {
        if s.len() != width || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        s.parse::<u64>().ok().map(Seq)
    }
}

/// Opaque, process-wide unique message identifier (`msg_key` in spec.md
/// §3). Generated at `MessageCreate` time from the thread key plus the
/// assigning `(ts, seq)`, so it doubles as the lookup handle for
/// `GetLatestMessage`/`ListMessageVersions`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Wrap a raw string as a `MessageId` without validation; validation
    /// happens at the key-encoder boundary.
    pub fn new(raw: impl Into<String>) -> Self {
        MessageId(raw.into())
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inputs to `ListMessages` (spec.md §4.7 Pagination contract).
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    /// Maximum number of messages to return; `None` defers to
    /// `Limits::max_page_limit`.
    pub limit: Option<usize>,
    /// Scan backward from this key, exclusive.
    pub before: Option<String>,
    /// Scan forward from this key, exclusive.
    pub after: Option<String>,
    /// Return a window centered on this key.
    pub anchor: Option<String>,
}

/// Output of `ListMessages`: the page plus the pagination envelope
/// spec.md §4.7 requires (`has_before`, `has_after`, anchors, counters).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items in ascending key order.
    pub items: Vec<T>,
    /// Whether at least one non-deleted item exists before the window.
    pub has_before: bool,
    /// Whether at least one non-deleted item exists after the window.
    pub has_after: bool,
    /// First key in the returned window, if any.
    pub before_anchor: Option<String>,
    /// Last key in the returned window, if any.
    pub after_anchor: Option<String>,
    /// Number of items in this page.
    pub count: usize,
    /// Total non-deleted message count for the thread, from the index
    /// counters (spec.md §6 index SE table).
    pub total: u64,
}

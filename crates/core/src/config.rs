//! Configuration surface (spec.md §6)
//!
//! One sub-config struct per subsystem, each `Default` per the spec's
//! table, composed into `RuntimeConfig`. Follows the teacher's
//! config-by-struct-with-serde-defaults convention rather than a flat
//! key-value map, so misconfiguration is caught at deserialization time.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded ingest queue configuration (spec.md §6 `queue.*`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of pending items (default 64Ki).
    pub capacity: usize,
    /// Number of items drained per compute-worker batch.
    pub batch_size: usize,
    /// Ceiling on the pooled byte-buffer arena, in bytes.
    pub max_pooled_buffer_bytes: usize,
    /// How often the WAL truncation sweep runs.
    pub truncate_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            capacity: 64 * 1024,
            batch_size: 64,
            max_pooled_buffer_bytes: 16 * 1024 * 1024,
            truncate_interval: Duration::from_secs(30),
        }
    }
}

/// WAL durability mode (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalMode {
    /// No WAL: writes are visible once applied in memory, unrecoverable
    /// across a crash.
    None,
    /// Fsync on a batch boundary (time or count), not per-record.
    Batch,
    /// Fsync every record before acknowledging it.
    Sync,
}

impl Default for WalMode {
    fn default() -> Self {
        WalMode::Batch
    }
}

/// Write-ahead log configuration (spec.md §6 `wal.*`, §4.2/§4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalConfig {
    /// Whether the WAL is enabled at all.
    pub enabled: bool,
    /// Fsync discipline.
    pub mode: WalMode,
    /// Segment rollover threshold; enforced to be at least 1MiB.
    pub max_file_size: u64,
    /// Records per fsync batch in `Batch` mode.
    pub batch_size: usize,
    /// Maximum time a batch waits before forcing an fsync.
    pub batch_interval: Duration,
    /// Whether rotated segments are gzip-compressed (spec.md §4.3).
    pub enable_compress: bool,
    /// Minimum segment size, in bytes, before compression is applied.
    pub compress_min_bytes: u64,
}

impl Default for WalConfig {
    fn default() -> Self {
        WalConfig {
            enabled: true,
            mode: WalMode::default(),
            max_file_size: 64 * 1024 * 1024,
            batch_size: 256,
            batch_interval: Duration::from_millis(5),
            enable_compress: true,
            compress_min_bytes: 1024 * 1024,
        }
    }
}

impl WalConfig {
    /// Floor `max_file_size` at 1MiB (spec.md §6 constraint), used by
    /// config validation at `Runtime::open` time.
    pub fn effective_max_file_size(&self) -> u64 {
        self.max_file_size.max(1024 * 1024)
    }
}

/// Compute/apply pipeline configuration (spec.md §6 `ingest.*`, §4.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Number of stateless compute workers.
    pub compute_worker_count: usize,
    /// Maximum number of computed ops the apply worker batches per
    /// storage transaction.
    pub apply_batch_count: usize,
    /// Maximum time the apply worker waits to fill a batch before
    /// flushing a partial one.
    pub apply_batch_timeout: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            compute_worker_count: 4,
            apply_batch_count: 128,
            apply_batch_timeout: Duration::from_millis(10),
        }
    }
}

/// Envelope encryption configuration (spec.md §6 `encryption.*`, §5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Whether envelope encryption is active for new threads.
    pub enabled: bool,
    /// Dot-path fields within a message body to encrypt individually;
    /// empty means the whole body is encrypted as one unit.
    pub fields: Vec<String>,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        EncryptionConfig {
            enabled: false,
            fields: Vec::new(),
        }
    }
}

/// Top-level configuration passed to `Runtime::open` (spec.md §6).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Filesystem directory the runtime owns.
    pub data_dir: std::path::PathBuf,
    /// Ingest queue configuration.
    pub queue: QueueConfig,
    /// Write-ahead log configuration.
    pub wal: WalConfig,
    /// Compute/apply pipeline configuration.
    pub ingest: IngestConfig,
    /// Envelope encryption configuration.
    pub encryption: EncryptionConfig,
}

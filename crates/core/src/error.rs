//! Error taxonomy for progressdb
//!
//! Two levels mirror the split the teacher's core crate draws between a
//! low-level `Error` (used by storage/durability, carrying `#[from]`
//! conversions for I/O and serialization failures) and a richer
//! `ProgressError` exposed at the engine/API boundary with the
//! classification methods callers actually branch on.

use thiserror::Error;

/// Low-level error used by storage and durability code.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// JSON (de)serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Requested key does not exist.
    #[error("key not found")]
    NotFound,

    /// On-disk data failed an integrity check (bad magic, CRC mismatch past
    /// a recoverable tail, malformed record).
    #[error("corruption: {0}")]
    Corruption(String),

    /// Operation attempted on a closed handle.
    #[error("handle is closed")]
    Closed,
}

/// Result alias for the low-level `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Taxonomy from spec.md §7, exposed at the engine/API boundary.
///
/// Variant names ARE the taxonomy; this enum is the thing user-facing
/// handlers map to status codes (`NotFound` → 404, `Unauthorized` → 403,
/// `QueueFull` → 429, …) even though that mapping lives outside this crate.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProgressError {
    /// Malformed or missing required input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Acting identity does not own the resource it tried to mutate.
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// Requested thread, message, or version does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Conflicting concurrent mutation (e.g. reaction race resolved
    /// last-write-wins but surfaced for observability).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Ingest queue rejected the item because it is at capacity.
    #[error("queue full")]
    QueueFull,

    /// Write-ahead log failure.
    #[error("wal error: {0}")]
    WalError(String),

    /// Storage engine failure.
    #[error("storage error: {0}")]
    StorageError(String),

    /// Envelope encryption or decryption failure.
    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// The KMS collaborator is unreachable or refused the request.
    #[error("kms unavailable: {0}")]
    KmsUnavailable(String),

    /// Anything else; should be rare and always logged.
    #[error("internal error: {0}")]
    InternalError(String),
}

impl ProgressError {
    /// True for errors a caller may reasonably retry unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProgressError::QueueFull
                | ProgressError::WalError(_)
                | ProgressError::StorageError(_)
                | ProgressError::KmsUnavailable(_)
        )
    }

    /// True for conditions that should page an operator rather than be
    /// silently retried (mid-file WAL corruption, persistent apply
    /// failure past backoff).
    pub fn is_serious(&self) -> bool {
        matches!(
            self,
            ProgressError::WalError(_) | ProgressError::InternalError(_)
        )
    }

    /// True when the error means "the thing you asked for isn't there".
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProgressError::NotFound(_))
    }

    /// True for input/ownership rejections that are the caller's fault.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            ProgressError::InvalidInput(_) | ProgressError::Unauthorized(_)
        )
    }
}

impl From<Error> for ProgressError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound => ProgressError::NotFound("key not found".to_string()),
            Error::Corruption(msg) => ProgressError::StorageError(format!("corruption: {msg}")),
            Error::Closed => ProgressError::InternalError("handle is closed".to_string()),
            other => ProgressError::StorageError(other.to_string()),
        }
    }
}

impl From<std::io::Error> for ProgressError {
    fn from(err: std::io::Error) -> Self {
        ProgressError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for ProgressError {
    fn from(err: serde_json::Error) -> Self {
        ProgressError::InvalidInput(err.to_string())
    }
}

/// Result alias for the public `ProgressError`.
pub type ProgressResult<T> = std::result::Result<T, ProgressError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_methods() {
        assert!(ProgressError::QueueFull.is_retryable());
        assert!(!ProgressError::QueueFull.is_serious());
        assert!(ProgressError::NotFound("x".into()).is_not_found());
        assert!(ProgressError::Unauthorized("x".into()).is_validation_error());
        assert!(ProgressError::WalError("x".into()).is_serious());
    }

    #[test]
    fn from_low_level_error() {
        let e: ProgressError = Error::NotFound.into();
        assert!(e.is_not_found());
    }
}

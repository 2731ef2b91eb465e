//! Size limits enforced on thread/message input
//!
//! Mirrors the teacher's `Limits` (size ceilings enforced by the engine)
//! generalized from generic value limits to the specific shapes this store
//! accepts: thread keys, message bodies, and page sizes.

use thiserror::Error;

/// Size and count ceilings enforced at compute time (spec.md §3, §4.5).
#[derive(Debug, Clone)]
pub struct Limits {
    /// Maximum `thread_key` length in bytes (spec.md §3: ≤256 chars).
    pub max_thread_key_bytes: usize,
    /// Maximum encoded message body size in bytes, pre-encryption.
    pub max_body_bytes: usize,
    /// Maximum `limit` a caller may request from `ListMessages`.
    pub max_page_limit: usize,
    /// Maximum number of field paths in an encryption field policy.
    pub max_encrypted_fields: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_thread_key_bytes: 256,
            max_body_bytes: 1024 * 1024,
            max_page_limit: 500,
            max_encrypted_fields: 64,
        }
    }
}

impl Limits {
    /// Small ceilings for tests that want to exercise limit violations
    /// without constructing megabyte-sized fixtures.
    pub fn with_small_limits() -> Self {
        Limits {
            max_thread_key_bytes: 32,
            max_body_bytes: 256,
            max_page_limit: 20,
            max_encrypted_fields: 4,
        }
    }

    /// Validate a `thread_key` length against `max_thread_key_bytes`.
    pub fn validate_thread_key_length(&self, thread_key: &str) -> Result<(), LimitError> {
        let len = thread_key.len();
        if len > self.max_thread_key_bytes {
            return Err(LimitError::ThreadKeyTooLong {
                actual: len,
                max: self.max_thread_key_bytes,
            });
        }
        Ok(())
    }

    /// Validate a message body length against `max_body_bytes`.
    pub fn validate_body_length(&self, body: &[u8]) -> Result<(), LimitError> {
        let len = body.len();
        if len > self.max_body_bytes {
            return Err(LimitError::BodyTooLarge {
                actual: len,
                max: self.max_body_bytes,
            });
        }
        Ok(())
    }

    /// Clamp a caller-requested page limit to `max_page_limit`, treating 0
    /// (or absent) as the maximum.
    pub fn clamp_page_limit(&self, requested: Option<usize>) -> usize {
        match requested {
            None | Some(0) => self.max_page_limit,
            Some(n) => n.min(self.max_page_limit),
        }
    }
}

/// Limit validation errors.
#[derive(Debug, Error)]
pub enum LimitError {
    /// `thread_key` exceeds `max_thread_key_bytes`.
    #[error("thread key too long: {actual} bytes exceeds maximum {max}")]
    ThreadKeyTooLong {
        /// Actual length in bytes.
        actual: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// Message body exceeds `max_body_bytes`.
    #[error("message body too large: {actual} bytes exceeds maximum {max}")]
    BodyTooLarge {
        /// Actual length in bytes.
        actual: usize,
        /// Maximum allowed length.
        max: usize,
    },
}

impl LimitError {
    /// Reason code suitable for surfacing to an external HTTP layer.
    pub fn reason_code(&self) -> &'static str {
        match self {
            LimitError::ThreadKeyTooLong { .. } => "thread_key_too_long",
            LimitError::BodyTooLarge { .. } => "body_too_large",
        }
    }
}

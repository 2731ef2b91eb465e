//! Envelope encryption for per-thread message bodies (spec.md §5): a
//! [`Kms`] wraps/unwraps each thread's data-encryption key, and
//! [`EnvelopeCipher`] uses the unwrapped key to encrypt/decrypt message
//! bodies, whole or field-by-field.
//!
//! The teacher's own `security` crate carries access-mode/open-options
//! types and no cryptography; this crate is enriched entirely from the
//! pack's `ZeroFS` encryption module (XChaCha20Poly1305, HKDF-SHA256,
//! `[nonce][ciphertext]` wire format) per spec.md §5.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod envelope;
pub mod kms;

pub use envelope::EnvelopeCipher;
pub use kms::{generate_dek, Kms, LocalKms};

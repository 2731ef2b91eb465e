//! Key-management abstraction for per-thread envelope encryption (spec.md
//! §5): wrap and unwrap a thread's data-encryption key (DEK) under a
//! master key the KMS never releases.
//!
//! Shaped after `EncryptionManager` in the reference encryption module
//! this crate is enriched from (HKDF-SHA256 key derivation from a master
//! key, XChaCha20Poly1305 AEAD, `[nonce][ciphertext]` wire format) —
//! generalized from "encrypt every value under one derived key" to
//! "wrap one short DEK per thread under a KMS master key", since the
//! teacher's own `security` crate carries no cryptography at all.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use progressdb_core::error::ProgressError;
use progressdb_core::model::KmsMeta;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;

const NONCE_SIZE: usize = 24;
const DEK_SIZE: usize = 32;
const LOCAL_KMS_KEY_ID: &str = "local-v1";
const ALGORITHM: &str = "xchacha20poly1305";

/// Wraps and unwraps per-thread DEKs under a master key this trait's
/// implementor controls. A real deployment would back this with a cloud
/// KMS; [`LocalKms`] is the in-process reference implementation.
pub trait Kms: Send + Sync {
    /// Wrap `dek` for storage alongside the thread's metadata.
    fn wrap_dek(&self, dek: &[u8; DEK_SIZE]) -> Result<KmsMeta, ProgressError>;

    /// Unwrap a previously-wrapped DEK.
    fn unwrap_dek(&self, meta: &KmsMeta) -> Result<[u8; DEK_SIZE], ProgressError>;
}

/// Generate a fresh random 256-bit DEK for a newly-encrypted thread.
pub fn generate_dek() -> [u8; DEK_SIZE] {
    let mut dek = [0u8; DEK_SIZE];
    OsRng.fill_bytes(&mut dek);
    dek
}

/// An in-process KMS backed by a single master key held in memory.
///
/// Not a substitute for a real KMS in production (the master key lives
/// in the same process as the data it protects), but it implements the
/// same wrap/unwrap contract, so swapping in a cloud KMS later is a
/// matter of a new [`Kms`] impl, not a schema change.
pub struct LocalKms {
    wrapping_key: XChaCha20Poly1305,
}

impl LocalKms {
    /// Derive the wrapping cipher from `master_key` via HKDF-SHA256.
    pub fn new(master_key: &[u8]) -> Self {
        let hk = Hkdf::<Sha256>::new(None, master_key);
        let mut wrapping_key_bytes = [0u8; DEK_SIZE];
        hk.expand(b"progressdb-v1-dek-wrap", &mut wrapping_key_bytes)
            .expect("32 bytes is a valid HKDF output length");
        LocalKms {
            wrapping_key: XChaCha20Poly1305::new(Key::from_slice(&wrapping_key_bytes)),
        }
    }
}

impl Kms for LocalKms {
    fn wrap_dek(&self, dek: &[u8; DEK_SIZE]) -> Result<KmsMeta, ProgressError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .wrapping_key
            .encrypt(nonce, dek.as_slice())
            .map_err(|e| ProgressError::KmsUnavailable(e.to_string()))?;

        let mut wrapped = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        wrapped.extend_from_slice(&nonce_bytes);
        wrapped.extend_from_slice(&ciphertext);

        Ok(KmsMeta {
            key_id: LOCAL_KMS_KEY_ID.to_string(),
            wrapped_dek: wrapped,
            algorithm: ALGORITHM.to_string(),
        })
    }

    fn unwrap_dek(&self, meta: &KmsMeta) -> Result<[u8; DEK_SIZE], ProgressError> {
        if meta.key_id != LOCAL_KMS_KEY_ID {
            return Err(ProgressError::KmsUnavailable(format!(
                "unknown KMS key id: {}",
                meta.key_id
            )));
        }
        if meta.wrapped_dek.len() < NONCE_SIZE {
            return Err(ProgressError::EncryptionError("wrapped DEK too short".into()));
        }
        let (nonce_bytes, ciphertext) = meta.wrapped_dek.split_at(NONCE_SIZE);
        let nonce = XNonce::from_slice(nonce_bytes);

        let plaintext = self
            .wrapping_key
            .decrypt(nonce, ciphertext)
            .map_err(|e| ProgressError::EncryptionError(e.to_string()))?;

        plaintext
            .try_into()
            .map_err(|_| ProgressError::EncryptionError("unwrapped DEK has the wrong length".into()))
    }
}

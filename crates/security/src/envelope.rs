//! Envelope encryption of message bodies under a thread's DEK (spec.md
//! §5): either the whole JSON body, or a caller-chosen set of dot-path
//! fields within it, per `EncryptionConfig::fields`.
//!
//! AEAD choice and wire format (`[24-byte nonce][ciphertext]`) follow the
//! reference encryption module this crate is enriched from; this layer
//! adds the dot-path field selection the teacher's (nonexistent) crypto
//! never needed, since spec.md §6 lets a deployment choose per-field
//! rather than whole-body encryption.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use progressdb_core::error::ProgressError;
use rand::{rngs::OsRng, RngCore};
use serde_json::Value;

const NONCE_SIZE: usize = 24;

/// Marker wrapper for an encrypted field or body: `{"__enc__": "<base64>"}`.
const ENC_MARKER: &str = "__enc__";

/// AEAD cipher keyed by a single thread's DEK.
pub struct EnvelopeCipher {
    cipher: XChaCha20Poly1305,
}

impl EnvelopeCipher {
    /// Key the cipher directly from a 256-bit DEK (already unwrapped from
    /// KMS metadata by the caller).
    pub fn from_dek(dek: &[u8; 32]) -> Self {
        EnvelopeCipher {
            cipher: XChaCha20Poly1305::new(Key::from_slice(dek)),
        }
    }

    /// Encrypt raw bytes, returning `[nonce][ciphertext]`.
    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .expect("XChaCha20Poly1305 encryption does not fail for in-memory buffers");
        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        out
    }

    /// Decrypt `[nonce][ciphertext]` back to plaintext bytes.
    pub fn decrypt_bytes(&self, data: &[u8]) -> Result<Vec<u8>, ProgressError> {
        if data.len() < NONCE_SIZE {
            return Err(ProgressError::EncryptionError("ciphertext too short".into()));
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
        let nonce = XNonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| ProgressError::EncryptionError(e.to_string()))
    }

    fn encrypt_value(&self, value: &Value) -> Value {
        let plaintext = serde_json::to_vec(value).expect("Value always serializes");
        let ciphertext = self.encrypt_bytes(&plaintext);
        serde_json::json!({ ENC_MARKER: BASE64.encode(ciphertext) })
    }

    fn decrypt_value(&self, value: &Value) -> Result<Value, ProgressError> {
        let Some(encoded) = value.get(ENC_MARKER).and_then(Value::as_str) else {
            return Err(ProgressError::EncryptionError("value is not an encrypted envelope".into()));
        };
        let ciphertext = BASE64
            .decode(encoded)
            .map_err(|e| ProgressError::EncryptionError(e.to_string()))?;
        let plaintext = self.decrypt_bytes(&ciphertext)?;
        serde_json::from_slice(&plaintext).map_err(ProgressError::from)
    }

    /// Encrypt `body`. With `fields` empty, the whole body becomes one
    /// envelope. Otherwise, only the named dot-path fields are replaced
    /// with envelopes in place; paths that don't resolve are left alone.
    pub fn encrypt_body(&self, body: &Value, fields: &[String]) -> Value {
        if fields.is_empty() {
            return self.encrypt_value(body);
        }
        let mut out = body.clone();
        for path in fields {
            if let Some(slot) = resolve_mut(&mut out, path) {
                *slot = self.encrypt_value(slot);
            }
        }
        out
    }

    /// Reverse of [`EnvelopeCipher::encrypt_body`].
    pub fn decrypt_body(&self, body: &Value, fields: &[String]) -> Result<Value, ProgressError> {
        if fields.is_empty() {
            return self.decrypt_value(body);
        }
        let mut out = body.clone();
        for path in fields {
            if let Some(slot) = resolve_mut(&mut out, path) {
                if slot.get(ENC_MARKER).is_some() {
                    *slot = self.decrypt_value(slot)?;
                }
            }
        }
        Ok(out)
    }
}

/// Walk a dot-separated path into `value`, returning a mutable reference
/// to the leaf if every intermediate segment is a JSON object.
fn resolve_mut<'a>(value: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object_mut()?.get_mut(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> EnvelopeCipher {
        EnvelopeCipher::from_dek(&[7u8; 32])
    }

    #[test]
    fn whole_body_round_trips() {
        let c = cipher();
        let body = serde_json::json!({"text": "hello", "n": 42});
        let encrypted = c.encrypt_body(&body, &[]);
        assert!(encrypted.get(ENC_MARKER).is_some());
        let decrypted = c.decrypt_body(&encrypted, &[]).unwrap();
        assert_eq!(decrypted, body);
    }

    #[test]
    fn single_field_round_trips_leaving_others_plain() {
        let c = cipher();
        let body = serde_json::json!({"text": "secret", "public": "visible"});
        let fields = vec!["text".to_string()];
        let encrypted = c.encrypt_body(&body, &fields);
        assert_eq!(encrypted["public"], serde_json::json!("visible"));
        assert!(encrypted["text"].get(ENC_MARKER).is_some());

        let decrypted = c.decrypt_body(&encrypted, &fields).unwrap();
        assert_eq!(decrypted, body);
    }

    #[test]
    fn nested_field_path_round_trips() {
        let c = cipher();
        let body = serde_json::json!({"meta": {"ssn": "123-45-6789"}, "public": 1});
        let fields = vec!["meta.ssn".to_string()];
        let encrypted = c.encrypt_body(&body, &fields);
        assert!(encrypted["meta"]["ssn"].get(ENC_MARKER).is_some());
        let decrypted = c.decrypt_body(&encrypted, &fields).unwrap();
        assert_eq!(decrypted, body);
    }

    #[test]
    fn missing_field_path_is_left_untouched() {
        let c = cipher();
        let body = serde_json::json!({"public": 1});
        let fields = vec!["absent".to_string()];
        let encrypted = c.encrypt_body(&body, &fields);
        assert_eq!(encrypted, body);
    }

    #[test]
    fn wrong_dek_fails_to_decrypt() {
        let c1 = EnvelopeCipher::from_dek(&[1u8; 32]);
        let c2 = EnvelopeCipher::from_dek(&[2u8; 32]);
        let body = serde_json::json!({"text": "hi"});
        let encrypted = c1.encrypt_body(&body, &[]);
        assert!(c2.decrypt_body(&encrypted, &[]).is_err());
    }
}

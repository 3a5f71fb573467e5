//! Authenticated encryption codec (XChaCha20-Poly1305)

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use tracing::error;

use crate::codec::{CodecError, Payload, PayloadCodec, ENCODING_ENCRYPTED};
use crate::core::config::ENCRYPTION_KEY_VAR;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 24;

/// 256-bit symmetric key
#[derive(Clone)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

impl EncryptionKey {
    /// Generate a fresh random key
    pub fn generate() -> Self {
        let key = XChaCha20Poly1305::generate_key(&mut OsRng);
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&key);
        Self(bytes)
    }

    /// Parse a base64-encoded 32-byte key
    pub fn from_base64(encoded: &str) -> Result<Self, CodecError> {
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CodecError::InvalidKey(format!("not valid base64: {}", e)))?;
        let bytes: [u8; KEY_LEN] = decoded.try_into().map_err(|bytes: Vec<u8>| {
            CodecError::InvalidKey(format!("expected {} bytes, got {}", KEY_LEN, bytes.len()))
        })?;
        Ok(Self(bytes))
    }

    /// Read the key from `PIPELINE_ENCRYPTION_KEY`
    pub fn from_env() -> Result<Self, CodecError> {
        match std::env::var(ENCRYPTION_KEY_VAR) {
            Ok(value) if !value.trim().is_empty() => Self::from_base64(&value),
            _ => Err(CodecError::MissingKey(ENCRYPTION_KEY_VAR.to_string())),
        }
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

/// Encrypts whole payloads and tags them `binary/encrypted`
///
/// The encoded data is `nonce || ciphertext`, where the ciphertext is the
/// serialized original payload, metadata included.
pub struct EncryptionCodec {
    cipher: XChaCha20Poly1305,
}

impl EncryptionCodec {
    pub fn new(key: &EncryptionKey) -> Result<Self, CodecError> {
        let cipher = XChaCha20Poly1305::new_from_slice(&key.0)
            .map_err(|e| CodecError::InvalidKey(e.to_string()))?;
        Ok(Self { cipher })
    }

    pub fn from_env() -> Result<Self, CodecError> {
        Self::new(&EncryptionKey::from_env()?)
    }

    fn encrypt(&self, payload: &Payload) -> Result<Payload, CodecError> {
        let plaintext = payload.to_bytes()?;
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|_| CodecError::Integrity("encryption failed".to_string()))?;

        let mut data = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        data.extend_from_slice(&nonce);
        data.extend_from_slice(&ciphertext);
        Ok(Payload::new(ENCODING_ENCRYPTED, data))
    }

    fn decrypt(&self, payload: &Payload) -> Result<Payload, CodecError> {
        if payload.data.len() < NONCE_LEN {
            return Err(CodecError::Integrity(format!(
                "ciphertext shorter than nonce ({} bytes)",
                payload.data.len()
            )));
        }
        let (nonce, ciphertext) = payload.data.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| {
                error!("Payload failed authentication; refusing to decode");
                CodecError::Integrity("authentication tag mismatch".to_string())
            })?;
        Payload::from_bytes(&plaintext)
    }
}

impl PayloadCodec for EncryptionCodec {
    fn encode(&self, payloads: &[Payload]) -> Result<Vec<Payload>, CodecError> {
        payloads.iter().map(|p| self.encrypt(p)).collect()
    }

    fn decode(&self, payloads: &[Payload]) -> Result<Vec<Payload>, CodecError> {
        payloads
            .iter()
            .map(|p| {
                if p.is_encrypted() {
                    self.decrypt(p)
                } else {
                    Ok(p.clone())
                }
            })
            .collect()
    }
}

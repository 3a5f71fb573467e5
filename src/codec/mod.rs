//! Payloads exchanged at the durable boundary, and the codecs applied to them
//!
//! Step inputs and outputs leave the orchestrator as [`Payload`]s: JSON bytes
//! tagged with an `encoding` marker. A [`DataConverter`] turns values into
//! payloads and, when it carries a [`PayloadCodec`], passes them through it.

pub mod encryption;

pub use encryption::{EncryptionCodec, EncryptionKey};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Metadata key carrying the payload encoding
pub const ENCODING_KEY: &str = "encoding";

/// Plain JSON payload
pub const ENCODING_JSON: &[u8] = b"json/plain";

/// Payload whose data is an encrypted, serialized inner payload
pub const ENCODING_ENCRYPTED: &[u8] = b"binary/encrypted";

/// Error types for payload conversion
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Encryption key not configured: set {0}")]
    MissingKey(String),

    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    /// Ciphertext failed authentication; never treated as plaintext
    #[error("Payload integrity check failed: {0}")]
    Integrity(String),

    #[error("Unsupported payload encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("Payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A tagged blob of bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub metadata: BTreeMap<String, Vec<u8>>,
    pub data: Vec<u8>,
}

impl Payload {
    pub fn new(encoding: &[u8], data: Vec<u8>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(ENCODING_KEY.to_string(), encoding.to_vec());
        Self { metadata, data }
    }

    pub fn encoding(&self) -> Option<&[u8]> {
        self.metadata.get(ENCODING_KEY).map(Vec::as_slice)
    }

    /// Encoding as text, for display
    pub fn encoding_name(&self) -> String {
        self.encoding()
            .map(|e| String::from_utf8_lossy(e).into_owned())
            .unwrap_or_else(|| "<none>".to_string())
    }

    pub fn is_encrypted(&self) -> bool {
        self.encoding() == Some(ENCODING_ENCRYPTED)
    }

    /// Serialize the whole payload, metadata included
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Transform applied to payloads on their way out and back in
pub trait PayloadCodec: Send + Sync {
    /// Encode payloads; inputs are left untouched
    fn encode(&self, payloads: &[Payload]) -> Result<Vec<Payload>, CodecError>;

    /// Decode payloads; payloads this codec did not produce pass through
    fn decode(&self, payloads: &[Payload]) -> Result<Vec<Payload>, CodecError>;
}

/// Converts values to payloads and back, optionally through a codec
#[derive(Clone, Default)]
pub struct DataConverter {
    codec: Option<Arc<dyn PayloadCodec>>,
}

impl std::fmt::Debug for DataConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataConverter")
            .field("encrypted", &self.is_encrypted())
            .finish()
    }
}

impl DataConverter {
    /// Converter that writes plain JSON
    pub fn plain() -> Self {
        Self { codec: None }
    }

    /// Converter that passes every payload through `codec`
    pub fn with_codec(codec: Arc<dyn PayloadCodec>) -> Self {
        Self { codec: Some(codec) }
    }

    /// Converter using an [`EncryptionCodec`] keyed from the environment
    ///
    /// Fails immediately when the key is absent or malformed.
    pub fn encrypted_from_env() -> Result<Self, CodecError> {
        let codec = EncryptionCodec::from_env()?;
        Ok(Self::with_codec(Arc::new(codec)))
    }

    pub fn is_encrypted(&self) -> bool {
        self.codec.is_some()
    }

    pub fn to_payload<T: Serialize>(&self, value: &T) -> Result<Payload, CodecError> {
        let payload = Payload::new(ENCODING_JSON, serde_json::to_vec(value)?);
        match &self.codec {
            Some(codec) => single(codec.encode(std::slice::from_ref(&payload))?),
            None => Ok(payload),
        }
    }

    pub fn from_payload<T: DeserializeOwned>(&self, payload: &Payload) -> Result<T, CodecError> {
        let decoded = match &self.codec {
            Some(codec) => single(codec.decode(std::slice::from_ref(payload))?)?,
            None => payload.clone(),
        };
        if decoded.encoding() != Some(ENCODING_JSON) {
            return Err(CodecError::UnsupportedEncoding(decoded.encoding_name()));
        }
        Ok(serde_json::from_slice(&decoded.data)?)
    }
}

fn single(mut payloads: Vec<Payload>) -> Result<Payload, CodecError> {
    match (payloads.pop(), payloads.is_empty()) {
        (Some(payload), true) => Ok(payload),
        _ => Err(CodecError::Integrity(
            "codec returned an unexpected number of payloads".to_string(),
        )),
    }
}

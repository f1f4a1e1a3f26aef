use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Failed to encode: {0}")]
    EncodeError(String),

    #[error("Failed to decode: {0}")]
    DecodeError(String),

    #[error("Invalid hex string: {0}")]
    InvalidHex(String),
}

/// Wire codec: postcard binary, hex-wrapped for transport between peers
pub struct Codec;

impl Codec {
    /// Encode a value to compact binary bytes
    pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
        postcard::to_allocvec(value).map_err(|e| CodecError::EncodeError(e.to_string()))
    }

    /// Decode a value from binary bytes
    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
        postcard::from_bytes(bytes).map_err(|e| CodecError::DecodeError(e.to_string()))
    }

    /// Encode to hex string
    pub fn encode_hex<T: Serialize>(value: &T) -> Result<String, CodecError> {
        Ok(hex::encode(Self::encode(value)?))
    }

    /// Decode from hex string
    pub fn decode_hex<T: DeserializeOwned>(hex_str: &str) -> Result<T, CodecError> {
        let bytes = hex::decode(hex_str).map_err(|e| CodecError::InvalidHex(e.to_string()))?;
        Self::decode(&bytes)
    }
}

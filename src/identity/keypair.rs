use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeypairError {
    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("Invalid key bytes: {0}")]
    InvalidBytes(String),

    #[error("Invalid key hex: {0}")]
    InvalidHex(String),
}

fn to_key_array(bytes: &[u8]) -> Result<[u8; 32], KeypairError> {
    if bytes.len() != 32 {
        return Err(KeypairError::InvalidLength {
            expected: 32,
            got: bytes.len(),
        });
    }

    bytes
        .try_into()
        .map_err(|_| KeypairError::InvalidBytes("Failed to convert to array".into()))
}

/// Ed25519 public key (32 bytes), carried hex-encoded inside transaction details
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Get the raw bytes of the public key
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Create a public key from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeypairError> {
        let bytes_array = to_key_array(bytes)?;
        let verifying_key = VerifyingKey::from_bytes(&bytes_array)
            .map_err(|e| KeypairError::InvalidBytes(e.to_string()))?;

        Ok(Self(verifying_key))
    }

    /// Lowercase hex encoding of the key bytes
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    /// Parse a hex-encoded public key
    pub fn from_hex(hex_str: &str) -> Result<Self, KeypairError> {
        let bytes = hex::decode(hex_str).map_err(|e| KeypairError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub(crate) fn inner(&self) -> &VerifyingKey {
        &self.0
    }
}

/// Wallet keypair: signs transaction details and derives the account address
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Get the public key
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key())
    }

    /// Secret key bytes, as persisted by the operator store
    pub fn to_bytes(&self) -> Vec<u8> {
        self.signing_key.to_bytes().to_vec()
    }

    /// Deserialize a keypair from secret key bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeypairError> {
        let bytes_array = to_key_array(bytes)?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&bytes_array),
        })
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

use crate::identity::{Keypair, PublicKey};
use ed25519_dalek::{Signature as DalekSignature, Signer as DalekSigner, Verifier};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SignatureError {
    #[error("Invalid signature length: expected 64, got {0}")]
    InvalidLength(usize),

    #[error("Invalid signature bytes: {0}")]
    InvalidBytes(String),

    #[error("Invalid signature hex: {0}")]
    InvalidHex(String),
}

/// Ed25519 signature (64 bytes)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    inner: DalekSignature,
    bytes: [u8; 64],
}

impl Signature {
    /// Get the raw bytes of the signature
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Create a signature from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        if bytes.len() != 64 {
            return Err(SignatureError::InvalidLength(bytes.len()));
        }

        let bytes_array: [u8; 64] = bytes
            .try_into()
            .map_err(|_| SignatureError::InvalidBytes("Failed to convert to array".into()))?;

        let inner = DalekSignature::from_bytes(&bytes_array);
        Ok(Self {
            inner,
            bytes: bytes_array,
        })
    }

    /// Hex form stored in `SignedTransaction::signature`
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Parse a hex-encoded signature
    pub fn from_hex(hex_str: &str) -> Result<Self, SignatureError> {
        let bytes =
            hex::decode(hex_str).map_err(|e| SignatureError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    fn from_inner(inner: DalekSignature) -> Self {
        let bytes = inner.to_bytes();
        Self { inner, bytes }
    }

    pub(crate) fn inner(&self) -> &DalekSignature {
        &self.inner
    }
}

/// Signing and verification operations
pub struct Signer;

impl Signer {
    /// Sign a message with a keypair
    pub fn sign(keypair: &Keypair, message: &[u8]) -> Signature {
        let sig = keypair.signing_key().sign(message);
        Signature::from_inner(sig)
    }

    /// Verify a signature against a public key and message
    pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
        public_key.inner().verify(message, signature.inner()).is_ok()
    }

    /// Verify hex-encoded key and signature, as carried by transactions.
    ///
    /// Malformed hex or key bytes count as a failed verification.
    pub fn verify_hex(public_key_hex: &str, message: &[u8], signature_hex: &str) -> bool {
        let public_key = match PublicKey::from_hex(public_key_hex) {
            Ok(pk) => pk,
            Err(e) => {
                debug!(error = %e, "Rejecting malformed public key");
                return false;
            }
        };

        let signature = match Signature::from_hex(signature_hex) {
            Ok(sig) => sig,
            Err(e) => {
                debug!(error = %e, "Rejecting malformed signature");
                return false;
            }
        };

        Self::verify(&public_key, message, &signature)
    }
}

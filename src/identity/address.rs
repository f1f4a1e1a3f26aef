use crate::identity::PublicKey;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;
use thiserror::Error;

const ADDRESS_PREFIX: &str = "0x";
const ADDRESS_BYTES: usize = 20;

#[derive(Error, Debug)]
pub enum AddressError {
    #[error("Invalid address format: {0}")]
    InvalidFormat(String),

    #[error("Invalid address hex: {0}")]
    InvalidHex(String),
}

/// Account address in the format: 0x<last 20 bytes of keccak256(public key)>
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Derive the address owned by a public key
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let digest = Keccak256::digest(public_key.as_bytes());
        let tail = &digest[digest.len() - ADDRESS_BYTES..];
        Self(format!("{}{}", ADDRESS_PREFIX, hex::encode(tail)))
    }

    /// Parse an address string
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let body = s.strip_prefix(ADDRESS_PREFIX).ok_or_else(|| {
            AddressError::InvalidFormat(format!("Expected '{}' prefix", ADDRESS_PREFIX))
        })?;

        let bytes = hex::decode(body).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        if bytes.len() != ADDRESS_BYTES {
            return Err(AddressError::InvalidFormat(format!(
                "Expected {} bytes, got {}",
                ADDRESS_BYTES,
                bytes.len()
            )));
        }

        Ok(Self(s.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

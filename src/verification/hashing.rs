use crate::chain::Header;
use sha2::{Digest, Sha256};

/// SHA-256 of a byte slice as lowercase hex
pub fn hash_bytes_256(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Digest of a header's fixed byte layout; links blocks via `previous_hash`
pub fn hash_header(header: &Header) -> String {
    hash_bytes_256(&header.to_hash_bytes())
}

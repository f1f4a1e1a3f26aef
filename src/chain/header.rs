use crate::verification;
use serde::{Deserialize, Serialize};

/// Block header: the part of a block that is linked and mined
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Protocol version, part of the proof-of-work preimage
    pub version: u32,
    /// Digest of the predecessor header, "" only for genesis
    pub previous_hash: String,
    /// Merkle root over the block's signed transactions, "" when empty
    pub transaction_merkle_root: String,
    /// Unix milliseconds
    pub timestamp: u64,
    /// Required count of leading zero hex characters
    pub difficulty: u32,
    /// Proof-of-work nonce
    pub nonce: u64,
}

impl Header {
    /// Fixed byte layout hashed into the header digest
    pub fn to_hash_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();

        bytes.extend_from_slice(&self.version.to_le_bytes());
        push_str(&mut bytes, &self.previous_hash);
        push_str(&mut bytes, &self.transaction_merkle_root);
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        bytes.extend_from_slice(&self.difficulty.to_le_bytes());
        bytes.extend_from_slice(&self.nonce.to_le_bytes());

        bytes
    }

    /// Digest of this header
    pub fn hash(&self) -> String {
        verification::hash_header(self)
    }

    /// Whether the nonce satisfies this header's own difficulty
    pub fn has_valid_proof(&self) -> bool {
        verification::valid_proof(self)
    }
}

fn push_str(bytes: &mut Vec<u8>, value: &str) {
    bytes.extend_from_slice(&(value.len() as u32).to_le_bytes());
    bytes.extend_from_slice(value.as_bytes());
}

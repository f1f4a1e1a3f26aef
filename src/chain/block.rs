use crate::chain::Header;
use crate::transaction::{Codec, CodecError};
use serde::{Deserialize, Serialize};

/// Nonce carried by every genesis header
pub const GENESIS_NONCE: u64 = 100;

/// A linked, mined unit of the chain
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain, 0 for genesis
    pub index: u64,
    pub header: Header,
    pub transaction_count: u64,
    /// Transaction hashes in merkle order; the reward is the last entry of a mined block
    pub transactions: Vec<String>,
    /// Cached digest of `header`
    pub block_hash: String,
    /// Length of the header's hashed byte layout (informational)
    pub size: u64,
}

impl Block {
    /// Assemble a block around a finished header
    pub fn new(index: u64, header: Header, transactions: Vec<String>) -> Self {
        let size = header.to_hash_bytes().len() as u64;

        Self {
            index,
            block_hash: header.hash(),
            transaction_count: transactions.len() as u64,
            header,
            transactions,
            size,
        }
    }

    /// The deterministic first block of every chain
    pub fn genesis(version: u32, difficulty: u32, timestamp: u64) -> Self {
        let header = Header {
            version,
            previous_hash: String::new(),
            transaction_merkle_root: crate::chain::merkle_root(&[]),
            timestamp,
            difficulty,
            nonce: GENESIS_NONCE,
        };

        Self::new(0, header, Vec::new())
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.header.previous_hash.is_empty()
    }

    pub fn contains_transaction(&self, transaction_hash: &str) -> bool {
        self.transactions.iter().any(|h| h == transaction_hash)
    }

    pub fn to_hex(&self) -> Result<String, CodecError> {
        Codec::encode_hex(self)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, CodecError> {
        Codec::decode_hex(hex_str)
    }
}

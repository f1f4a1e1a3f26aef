use crate::storage::StoreError;
use crate::sync::PeerError;
use crate::transaction::CodecError;
use crate::verification::{AdmissionError, ChainError, MiningError};
use thiserror::Error;

/// Why a block offered by a peer was not appended
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockRejection {
    #[error("Block {incoming} rejected: shorter chain, not added (local tip {local_last})")]
    Stale { incoming: u64, local_last: u64 },

    #[error("Block {incoming} rejected: incoming index higher than current, needs resync (local tip {local_last})")]
    OutOfOrder { incoming: u64, local_last: u64 },

    #[error("Block {index} rejected: proof of work is invalid")]
    InvalidProof { index: u64 },

    #[error("Block {index} rejected: previous hash does not match the local tip")]
    BrokenLink { index: u64 },

    #[error("Block {index} rejected: block hash does not match its header")]
    HashMismatch { index: u64 },
}

/// Errors surfaced by ledger operations
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error("No reward address: pass a miner address or configure one")]
    NoRewardAddress,

    #[error("Pooled transaction {hash} no longer valid: {source}")]
    PoolRejected {
        hash: String,
        #[source]
        source: AdmissionError,
    },

    #[error("Mining failed: {0}")]
    Mining(#[from] MiningError),

    #[error("Mining worker failed: {0}")]
    Worker(String),

    #[error("Stale template: built on block {template_parent}, tip is now block {tip}")]
    StaleTemplate { template_parent: u64, tip: u64 },

    #[error(transparent)]
    Rejected(#[from] BlockRejection),

    #[error(transparent)]
    InvalidChain(#[from] ChainError),

    #[error(transparent)]
    InvalidPeerUri(PeerError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

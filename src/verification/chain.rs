// Chain Validation - linkage and proof-of-work walk
//
// Transaction signatures and nonce ordering are only enforced at admission and
// are not re-checked here.

use crate::chain::Block;
use crate::verification::{hash_header, valid_proof};
use std::fmt;
use thiserror::Error;
use tracing::{debug, error};

/// What went wrong at the failing block
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainFault {
    /// No blocks at all
    Empty,
    /// `previous_hash` does not match the predecessor's header digest
    BrokenLink { expected: String, found: String },
    /// Header digest does not meet its own difficulty
    InvalidProof { difficulty: u32 },
    /// Block index does not equal its position
    IndexMismatch { found: u64 },
    /// Cached `block_hash` is not the digest of the block's header
    HashMismatch { expected: String, found: String },
}

impl fmt::Display for ChainFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "chain has no blocks"),
            Self::BrokenLink { expected, found } => write!(
                f,
                "previous hash {} does not match predecessor digest {}",
                found, expected
            ),
            Self::InvalidProof { difficulty } => {
                write!(f, "proof of work does not meet difficulty {}", difficulty)
            }
            Self::IndexMismatch { found } => write!(f, "block carries index {}", found),
            Self::HashMismatch { expected, found } => write!(
                f,
                "block hash {} does not match header digest {}",
                found, expected
            ),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid chain at block {index}: {fault}")]
pub struct ChainError {
    pub index: usize,
    pub fault: ChainFault,
}

fn check_block_hash(index: usize, block: &Block) -> Result<(), ChainError> {
    let expected = hash_header(&block.header);
    if block.block_hash != expected {
        error!(index, "Block hash does not match its header");
        return Err(ChainError {
            index,
            fault: ChainFault::HashMismatch {
                expected,
                found: block.block_hash.clone(),
            },
        });
    }
    Ok(())
}

/// Walk the chain from index 1 and stop at the first broken block.
/// Every block's cached hash, genesis included, must match its header.
pub fn verify_chain(chain: &[Block]) -> Result<(), ChainError> {
    if chain.is_empty() {
        return Err(ChainError {
            index: 0,
            fault: ChainFault::Empty,
        });
    }

    let genesis = &chain[0];
    if genesis.index != 0 {
        return Err(ChainError {
            index: 0,
            fault: ChainFault::IndexMismatch {
                found: genesis.index,
            },
        });
    }
    if !genesis.header.previous_hash.is_empty() {
        return Err(ChainError {
            index: 0,
            fault: ChainFault::BrokenLink {
                expected: String::new(),
                found: genesis.header.previous_hash.clone(),
            },
        });
    }
    check_block_hash(0, genesis)?;

    for (index, pair) in chain.windows(2).enumerate() {
        let index = index + 1;
        let (previous, block) = (&pair[0], &pair[1]);

        if block.index != index as u64 {
            error!(index, found = block.index, "Block index out of sequence");
            return Err(ChainError {
                index,
                fault: ChainFault::IndexMismatch { found: block.index },
            });
        }

        check_block_hash(index, block)?;

        debug!(index, "Checking previous hash against predecessor");
        let expected = hash_header(&previous.header);
        if block.header.previous_hash != expected {
            error!(index, "Previous block hash not equal to previous hash stored in block");
            return Err(ChainError {
                index,
                fault: ChainFault::BrokenLink {
                    expected,
                    found: block.header.previous_hash.clone(),
                },
            });
        }

        debug!(index, "Checking proof of work");
        if !valid_proof(&block.header) {
            error!(index, "Proof of work is invalid");
            return Err(ChainError {
                index,
                fault: ChainFault::InvalidProof {
                    difficulty: block.header.difficulty,
                },
            });
        }
    }

    debug!(length = chain.len(), "Chain is valid");
    Ok(())
}

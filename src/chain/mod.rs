// Chain module - Block model and merkle commitment

mod block;
mod header;
mod merkle;

pub use block::{Block, GENESIS_NONCE};
pub use header::Header;
pub use merkle::{merkle_root, MerkleError, MerkleProof, MerkleTree, ProofStep, Side};

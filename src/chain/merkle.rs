// Merkle Commitment - binary tree over an ordered list of signed transactions
//
// Leaves are SHA-256 of each transaction's binary encoding. Interior nodes hash
// the concatenated raw child digests. An unpaired node at the end of a level is
// carried up unchanged. The root of an empty list is the empty string.

use crate::transaction::SignedTransaction;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

type NodeHash = [u8; 32];

#[derive(Error, Debug)]
pub enum MerkleError {
    #[error("Leaf index {index} out of bounds ({leaf_count} leaves)")]
    IndexOutOfBounds { index: usize, leaf_count: usize },

    #[error("Invalid hash in proof: {0}")]
    InvalidHash(String),
}

/// Which side of the running hash the sibling sits on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

/// One level of an inclusion proof
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling_hash: String,
    pub side: Side,
}

/// Inclusion proof for a single leaf, ordered bottom-up
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_index: usize,
    pub leaf_hash: String,
    pub steps: Vec<ProofStep>,
}

impl MerkleProof {
    /// Recompute the root from the leaf and compare
    pub fn verify(&self, root: &str) -> bool {
        match self.compute_root() {
            Ok(computed) => computed == root,
            Err(_) => false,
        }
    }

    fn compute_root(&self) -> Result<String, MerkleError> {
        let mut current = decode_node(&self.leaf_hash)?;

        for step in &self.steps {
            let sibling = decode_node(&step.sibling_hash)?;
            current = match step.side {
                Side::Left => hash_pair(&sibling, &current),
                Side::Right => hash_pair(&current, &sibling),
            };
        }

        Ok(hex::encode(current))
    }
}

/// Merkle tree with every level retained for proof generation
#[derive(Clone, Debug)]
pub struct MerkleTree {
    /// levels[0] are the leaves, the last level holds the root
    levels: Vec<Vec<NodeHash>>,
}

impl MerkleTree {
    /// Build the tree over transactions in the given order
    pub fn from_transactions(transactions: &[SignedTransaction]) -> Self {
        let leaves = transactions
            .iter()
            .map(|tx| Sha256::digest(tx.to_hash_bytes()).into())
            .collect();
        Self::from_leaves(leaves)
    }

    /// Build the tree over precomputed leaf hashes
    pub fn from_leaves(leaves: Vec<NodeHash>) -> Self {
        let mut levels = vec![leaves];

        while levels.last().map_or(false, |level| level.len() > 1) {
            let current = &levels[levels.len() - 1];
            let next: Vec<NodeHash> = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_pair(left, right),
                    [single] => *single,
                    _ => unreachable!("chunks(2) yields one or two nodes"),
                })
                .collect();
            levels.push(next);
        }

        Self { levels }
    }

    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_count() == 0
    }

    /// Hex digest of a leaf
    pub fn leaf_hash(&self, index: usize) -> Option<String> {
        self.levels[0].get(index).map(hex::encode)
    }

    /// Hex root, or "" for an empty tree
    pub fn root(&self) -> String {
        match self.levels.last().and_then(|level| level.first()) {
            Some(root) if !self.is_empty() => hex::encode(root),
            _ => String::new(),
        }
    }

    /// Inclusion proof for the leaf at `leaf_index`
    pub fn proof(&self, leaf_index: usize) -> Result<MerkleProof, MerkleError> {
        let leaf_count = self.leaf_count();
        if leaf_index >= leaf_count {
            return Err(MerkleError::IndexOutOfBounds {
                index: leaf_index,
                leaf_count,
            });
        }

        let mut steps = Vec::new();
        let mut index = leaf_index;

        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_index = index ^ 1;
            // A carried-up node has no sibling at this level
            if let Some(sibling) = level.get(sibling_index) {
                let side = if index % 2 == 0 { Side::Right } else { Side::Left };
                steps.push(ProofStep {
                    sibling_hash: hex::encode(sibling),
                    side,
                });
            }
            index /= 2;
        }

        Ok(MerkleProof {
            leaf_index,
            leaf_hash: hex::encode(self.levels[0][leaf_index]),
            steps,
        })
    }
}

/// Merkle root committed in a block header
pub fn merkle_root(transactions: &[SignedTransaction]) -> String {
    MerkleTree::from_transactions(transactions).root()
}

fn hash_pair(left: &NodeHash, right: &NodeHash) -> NodeHash {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

fn decode_node(hex_str: &str) -> Result<NodeHash, MerkleError> {
    let bytes = hex::decode(hex_str).map_err(|e| MerkleError::InvalidHash(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| MerkleError::InvalidHash(format!("expected 32 bytes in {}", hex_str)))
}

// Verification module - Pure checks over headers, chains and incoming transactions

mod admission;
mod chain;
mod hashing;
mod pow;

pub use admission::{admit, check_nonce, expected_nonce, AdmissionError, NonceMismatch};
pub use chain::{verify_chain, ChainError, ChainFault};
pub use hashing::{hash_bytes_256, hash_header};
pub use pow::{
    meets_difficulty, pow_digest, proof_of_work, search_nonce, valid_proof, MiningError,
    CANCEL_CHECK_INTERVAL,
};

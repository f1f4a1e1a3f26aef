// Proof-of-Work - nonce search and validation
//
// The puzzle preimage is merkle_root ∥ previous_hash ∥ nonce ∥ version, with the
// integers rendered in decimal. A header is valid when the SHA-256 hex digest of
// that preimage starts with `difficulty` '0' characters.

use crate::chain::Header;
use crate::verification::hash_bytes_256;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, info, trace};

/// How many nonces are tried between checks of the cancel flag
pub const CANCEL_CHECK_INTERVAL: u64 = 1 << 12;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MiningError {
    #[error("Mining cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },

    #[error("Nonce space exhausted without meeting difficulty {difficulty}")]
    Exhausted { difficulty: u32 },
}

/// Digest the proof-of-work predicate is evaluated on
pub fn pow_digest(header: &Header) -> String {
    let guess = format!(
        "{}{}{}{}",
        header.transaction_merkle_root, header.previous_hash, header.nonce, header.version
    );
    hash_bytes_256(guess.as_bytes())
}

/// True iff `digest` has at least `difficulty` leading '0' hex characters
pub fn meets_difficulty(digest: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    digest.len() >= difficulty && digest.bytes().take(difficulty).all(|c| c == b'0')
}

/// Check a header against its own stored difficulty
pub fn valid_proof(header: &Header) -> bool {
    meets_difficulty(&pow_digest(header), header.difficulty)
}

/// Find the first nonce, counting up from 0, that satisfies the header's difficulty.
///
/// The search stops with `MiningError::Cancelled` once `cancel` is set.
pub fn search_nonce(header: &Header, cancel: &AtomicBool) -> Result<u64, MiningError> {
    info!(
        version = header.version,
        difficulty = header.difficulty,
        "Mining block"
    );

    let mut candidate = header.clone();
    let mut nonce: u64 = 0;

    loop {
        if nonce % CANCEL_CHECK_INTERVAL == 0 {
            if cancel.load(Ordering::Relaxed) {
                debug!(attempts = nonce, "Nonce search cancelled");
                return Err(MiningError::Cancelled { attempts: nonce });
            }
            if nonce > 0 {
                trace!(attempts = nonce, "Nonce search progress");
            }
        }

        candidate.nonce = nonce;
        if valid_proof(&candidate) {
            debug!(nonce, "Found valid nonce");
            return Ok(nonce);
        }

        nonce = nonce.checked_add(1).ok_or(MiningError::Exhausted {
            difficulty: header.difficulty,
        })?;
    }
}

/// Run the search and return the header with the winning nonce set
pub fn proof_of_work(mut header: Header, cancel: &AtomicBool) -> Result<Header, MiningError> {
    header.nonce = search_nonce(&header, cancel)?;
    Ok(header)
}

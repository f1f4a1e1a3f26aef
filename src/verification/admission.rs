use crate::transaction::{CommittedTransaction, SignedTransaction};
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Which side of the expected nonce a rejected transaction fell on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NonceMismatch {
    /// Nonce already used (too low)
    Replay,
    /// Nonce skips ahead (too high)
    Gap,
}

impl fmt::Display for NonceMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replay => write!(f, "replay"),
            Self::Gap => write!(f, "gap"),
        }
    }
}

/// Reasons a transaction is refused entry to the pool
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("Invalid amount: {amount} is negative")]
    NegativeAmount { amount: Decimal },

    #[error("Invalid signature: signature does not match the transaction details")]
    InvalidSignature,

    #[error("Sender: {sender} -> Transaction nonce: {nonce} -> Expected nonce: {expected} -> invalid nonce in transaction ({kind})")]
    InvalidNonce {
        sender: String,
        nonce: u64,
        expected: u64,
        kind: NonceMismatch,
    },

    #[error("Sender: {sender} -> Amount: {amount} -> Balance: {balance} -> Sender does not have enough coin for this transaction")]
    InsufficientFunds {
        sender: String,
        amount: Decimal,
        balance: Decimal,
    },
}

/// The nonce a sender must use next given its highest known nonce
pub fn expected_nonce(last_nonce: Option<u64>) -> u64 {
    last_nonce.map_or(0, |n| n.saturating_add(1))
}

/// Check the nonce alone against the sender's highest known nonce
pub fn check_nonce(
    transaction: &SignedTransaction,
    last_nonce: Option<u64>,
) -> Result<(), AdmissionError> {
    let details = transaction.details();
    let expected = expected_nonce(last_nonce);

    if details.nonce() == expected {
        return Ok(());
    }

    let kind = if details.nonce() < expected {
        NonceMismatch::Replay
    } else {
        NonceMismatch::Gap
    };

    Err(AdmissionError::InvalidNonce {
        sender: details.sender().to_string(),
        nonce: details.nonce(),
        expected,
        kind,
    })
}

/// Admit a signed transaction against the current ledger view.
///
/// Checks run in order: amount sign, signature, nonce, then funds. `balance`
/// reports what the account can spend (confirmed balance minus its own
/// pending debits) and `last_nonce` the highest nonce already confirmed or
/// pooled for a sender. Neither oracle is consulted for the recipient.
pub fn admit<B, N>(
    transaction: SignedTransaction,
    balance: B,
    last_nonce: N,
) -> Result<CommittedTransaction, AdmissionError>
where
    B: Fn(&str) -> Decimal,
    N: Fn(&str) -> Option<u64>,
{
    let details = transaction.details();

    if details.amount().is_sign_negative() && !details.amount().is_zero() {
        return Err(AdmissionError::NegativeAmount {
            amount: details.amount(),
        });
    }

    if !transaction.verify() {
        warn!(sender = details.sender(), "Rejected transaction with bad signature");
        return Err(AdmissionError::InvalidSignature);
    }

    check_nonce(&transaction, last_nonce(details.sender()))?;

    let available = balance(details.sender());
    if available < details.amount() {
        return Err(AdmissionError::InsufficientFunds {
            sender: details.sender().to_string(),
            amount: details.amount(),
            balance: available,
        });
    }

    let committed = CommittedTransaction::new(transaction);
    debug!(
        hash = committed.transaction_hash(),
        sender = committed.details().sender(),
        nonce = committed.details().nonce(),
        "Transaction admitted"
    );
    Ok(committed)
}

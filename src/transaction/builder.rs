use crate::identity::{Address, Keypair};
use crate::transaction::{timestamp_now, Details, SignedTransaction};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur when building a transaction
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Missing sender: sender keypair is required")]
    MissingSender,

    #[error("Missing recipient: recipient address is required")]
    MissingRecipient,

    #[error("Missing amount: transfer amount is required")]
    MissingAmount,

    #[error("Missing nonce: the sender's next nonce is required")]
    MissingNonce,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

/// Builder for creating signed transactions
pub struct TransactionBuilder<'a> {
    sender: Option<&'a Keypair>,
    sender_address: Option<String>,
    recipient: Option<String>,
    amount: Option<Decimal>,
    nonce: Option<u64>,
    timestamp: Option<u64>,
}

impl<'a> TransactionBuilder<'a> {
    pub fn new() -> Self {
        Self {
            sender: None,
            sender_address: None,
            recipient: None,
            amount: None,
            nonce: None,
            timestamp: None,
        }
    }

    /// Set the signing keypair (required)
    pub fn sender(mut self, keypair: &'a Keypair) -> Self {
        self.sender = Some(keypair);
        self
    }

    /// Override the sender account (defaults to the keypair's address)
    pub fn sender_address(mut self, address: impl Into<String>) -> Self {
        self.sender_address = Some(address.into());
        self
    }

    /// Set the recipient (required)
    pub fn recipient(mut self, address: impl Into<String>) -> Self {
        self.recipient = Some(address.into());
        self
    }

    /// Set the amount (required)
    pub fn amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Set the sender nonce (required)
    pub fn nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    /// Set the timestamp in unix milliseconds (defaults to now)
    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Build the details without signing them
    pub fn build_details(&self) -> Result<Details, TransactionError> {
        let keypair = self.sender.ok_or(TransactionError::MissingSender)?;
        let recipient = self
            .recipient
            .clone()
            .ok_or(TransactionError::MissingRecipient)?;
        let amount = self.amount.ok_or(TransactionError::MissingAmount)?;
        let nonce = self.nonce.ok_or(TransactionError::MissingNonce)?;

        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(TransactionError::InvalidAmount(
                "amount cannot be negative".to_string(),
            ));
        }

        let public_key = keypair.public_key();
        let sender = self
            .sender_address
            .clone()
            .unwrap_or_else(|| Address::from_public_key(&public_key).into());
        let timestamp = self.timestamp.unwrap_or_else(timestamp_now);

        Ok(Details::new(
            sender,
            recipient,
            amount,
            nonce,
            timestamp,
            public_key.to_hex(),
        ))
    }

    /// Build and sign the transaction
    pub fn build(self) -> Result<SignedTransaction, TransactionError> {
        let details = self.build_details()?;
        let keypair = self.sender.ok_or(TransactionError::MissingSender)?;
        Ok(SignedTransaction::sign(details, keypair))
    }
}

impl<'a> Default for TransactionBuilder<'a> {
    fn default() -> Self {
        Self::new()
    }
}

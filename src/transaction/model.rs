use crate::identity::{Keypair, Signer};
use crate::transaction::{Codec, CodecError};
use crate::verification::hash_bytes_256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Reserved sender of the block reward transaction
pub const COINBASE_SENDER: &str = "0";

/// Reserved signature and public key marker of the block reward transaction
pub const COINBASE_MARKER: &str = "coinbase";

/// Current wall-clock time as unix milliseconds
pub fn timestamp_now() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Unsigned transfer payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Details {
    sender: String,
    recipient: String,
    amount: Decimal,
    nonce: u64,
    timestamp: u64,
    public_key: String,
}

impl Details {
    /// Create the payload. The amount is normalized so equal values serialize identically.
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: Decimal,
        nonce: u64,
        timestamp: u64,
        public_key: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            amount: amount.normalize(),
            nonce,
            timestamp,
            public_key: public_key.into(),
        }
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Hex-encoded public key of the sender
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// The bytes covered by the signature
    pub fn to_signing_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();

        push_str(&mut bytes, &self.sender);
        push_str(&mut bytes, &self.recipient);
        push_str(&mut bytes, &self.amount.normalize().to_string());
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        push_str(&mut bytes, &self.public_key);

        bytes
    }
}

fn push_str(bytes: &mut Vec<u8>, value: &str) {
    bytes.extend_from_slice(&(value.len() as u32).to_le_bytes());
    bytes.extend_from_slice(value.as_bytes());
}

/// Details plus the sender's hex-encoded signature over `Details::to_signing_bytes`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    details: Details,
    signature: String,
}

impl SignedTransaction {
    /// Create a SignedTransaction from parts
    pub fn from_parts(details: Details, signature: impl Into<String>) -> Self {
        Self {
            details,
            signature: signature.into(),
        }
    }

    /// Sign details with the sender's keypair
    pub fn sign(details: Details, keypair: &Keypair) -> Self {
        let signature = Signer::sign(keypair, &details.to_signing_bytes());
        Self::from_parts(details, signature.to_hex())
    }

    /// Synthetic reward crediting the block producer. Not signed.
    pub fn coinbase(recipient: impl Into<String>, amount: Decimal, timestamp: u64) -> Self {
        let details = Details::new(
            COINBASE_SENDER,
            recipient,
            amount,
            0,
            timestamp,
            COINBASE_MARKER,
        );
        Self::from_parts(details, COINBASE_MARKER)
    }

    pub fn details(&self) -> &Details {
        &self.details
    }

    /// Hex-encoded signature
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn is_coinbase(&self) -> bool {
        self.details.sender == COINBASE_SENDER && self.signature == COINBASE_MARKER
    }

    /// Check the signature against the details and embedded public key
    pub fn verify(&self) -> bool {
        Signer::verify_hex(
            &self.details.public_key,
            &self.details.to_signing_bytes(),
            &self.signature,
        )
    }

    /// Fixed byte layout behind the transaction hash and its merkle leaf:
    /// the signed details followed by the signature
    pub fn to_hash_bytes(&self) -> Vec<u8> {
        let mut bytes = self.details.to_signing_bytes();
        push_str(&mut bytes, &self.signature);
        bytes
    }

    /// Digest of `to_hash_bytes`, the transaction's identity
    pub fn hash(&self) -> String {
        hash_bytes_256(&self.to_hash_bytes())
    }

    pub fn to_hex(&self) -> Result<String, CodecError> {
        Codec::encode_hex(self)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, CodecError> {
        Codec::decode_hex(hex_str)
    }
}

/// A signed transaction indexed by its hash, as held in the pool and the ledger
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommittedTransaction {
    transaction_hash: String,
    signed_transaction: SignedTransaction,
}

impl CommittedTransaction {
    /// Hash and wrap a signed transaction
    pub fn new(signed_transaction: SignedTransaction) -> Self {
        Self {
            transaction_hash: signed_transaction.hash(),
            signed_transaction,
        }
    }

    /// Rebuild from a stored hash without rehashing
    pub fn from_parts(transaction_hash: String, signed_transaction: SignedTransaction) -> Self {
        Self {
            transaction_hash,
            signed_transaction,
        }
    }

    pub fn transaction_hash(&self) -> &str {
        &self.transaction_hash
    }

    pub fn signed_transaction(&self) -> &SignedTransaction {
        &self.signed_transaction
    }

    pub fn details(&self) -> &Details {
        self.signed_transaction.details()
    }
}

impl PartialEq for CommittedTransaction {
    fn eq(&self, other: &Self) -> bool {
        self.transaction_hash == other.transaction_hash
    }
}

impl Eq for CommittedTransaction {}

impl Hash for CommittedTransaction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.transaction_hash.hash(state);
    }
}

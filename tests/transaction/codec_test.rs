// Wire Codec Tests
// Blocks and transactions travel as hex over postcard bytes

use powledger::chain::{Block, Header};
use powledger::identity::Keypair;
use powledger::transaction::{Codec, CodecError, SignedTransaction, TransactionBuilder};
use rust_decimal::Decimal;

fn sample_transaction() -> SignedTransaction {
    let keypair = Keypair::generate();
    TransactionBuilder::new()
        .sender(&keypair)
        .recipient("0xbob")
        .amount(Decimal::new(125, 2))
        .nonce(0)
        .build()
        .unwrap()
}

#[test]
fn test_transaction_hex_is_bit_exact() {
    let tx = sample_transaction();

    let hex = tx.to_hex().unwrap();
    let decoded = SignedTransaction::from_hex(&hex).unwrap();

    assert_eq!(decoded, tx);
    assert_eq!(decoded.to_hex().unwrap(), hex);
    assert_eq!(decoded.hash(), tx.hash());
    assert!(decoded.verify());
}

#[test]
fn test_block_hex_is_bit_exact() {
    let tx = sample_transaction();
    let header = Header {
        version: 1,
        previous_hash: "ab".repeat(32),
        transaction_merkle_root: "cd".repeat(32),
        timestamp: 1_700_000_000_000,
        difficulty: 2,
        nonce: 991,
    };
    let block = Block::new(3, header, vec![tx.hash()]);

    let hex = block.to_hex().unwrap();
    let decoded = Block::from_hex(&hex).unwrap();

    assert_eq!(decoded, block);
    assert_eq!(decoded.to_hex().unwrap(), hex);
}

#[test]
fn test_invalid_hex_is_structural_error() {
    let result = SignedTransaction::from_hex("not hex at all");
    assert!(matches!(result, Err(CodecError::InvalidHex(_))));
}

#[test]
fn test_truncated_bytes_fail_to_decode() {
    let bytes = Codec::encode(&sample_transaction()).unwrap();

    let result: Result<SignedTransaction, _> = Codec::decode(&bytes[..bytes.len() / 2]);
    assert!(matches!(result, Err(CodecError::DecodeError(_))));
}

#[test]
fn test_amount_survives_encoding() {
    let tx = sample_transaction();
    let decoded = SignedTransaction::from_hex(&tx.to_hex().unwrap()).unwrap();

    assert_eq!(decoded.details().amount(), Decimal::new(125, 2));
}

// Block Model Tests
// Genesis determinism and header digest properties

use powledger::chain::{Block, Header, GENESIS_NONCE};
use powledger::ledger::{Blockchain, LedgerConfig};
use powledger::verification::hash_header;

fn header() -> Header {
    Header {
        version: 1,
        previous_hash: "aa".repeat(32),
        transaction_merkle_root: "bb".repeat(32),
        timestamp: 1_700_000_000_000,
        difficulty: 3,
        nonce: 12,
    }
}

#[test]
fn test_genesis_shape() {
    let genesis = Block::genesis(1, 4, 0);

    assert_eq!(genesis.index, 0);
    assert_eq!(genesis.header.previous_hash, "");
    assert_eq!(genesis.header.transaction_merkle_root, "");
    assert_eq!(genesis.header.nonce, GENESIS_NONCE);
    assert_eq!(genesis.transaction_count, 0);
    assert!(genesis.transactions.is_empty());
    assert!(genesis.is_genesis());
    assert!(genesis.size > 0);
}

#[test]
fn test_genesis_is_deterministic() {
    let config = LedgerConfig::new()
        .with_address("0xminer")
        .with_difficulty(2)
        .with_version(1)
        .with_genesis_timestamp(1_600_000_000_000);

    let a = Blockchain::new(config.clone()).unwrap();
    let b = Blockchain::new(config).unwrap();

    assert_eq!(a.chain()[0], b.chain()[0]);
    assert_eq!(a.chain()[0].header.timestamp, 1_600_000_000_000);
}

#[test]
fn test_genesis_differs_by_inputs() {
    assert_ne!(
        Block::genesis(1, 4, 0).block_hash,
        Block::genesis(2, 4, 0).block_hash
    );
    assert_ne!(
        Block::genesis(1, 4, 0).block_hash,
        Block::genesis(1, 4, 1).block_hash
    );
}

#[test]
fn test_header_field_order_independence() {
    let a = header();
    let mut b = Header {
        nonce: 12,
        difficulty: 3,
        timestamp: 1_700_000_000_000,
        transaction_merkle_root: String::new(),
        previous_hash: "aa".repeat(32),
        version: 1,
    };
    b.transaction_merkle_root = "bb".repeat(32);

    assert_eq!(a.to_hash_bytes(), b.to_hash_bytes());
    assert_eq!(hash_header(&a), hash_header(&b));
}

#[test]
fn test_every_field_feeds_the_digest() {
    let base = hash_header(&header());

    let variants = [
        Header { version: 2, ..header() },
        Header { previous_hash: "cc".repeat(32), ..header() },
        Header { transaction_merkle_root: "dd".repeat(32), ..header() },
        Header { timestamp: 1, ..header() },
        Header { difficulty: 4, ..header() },
        Header { nonce: 13, ..header() },
    ];

    for variant in variants {
        assert_ne!(hash_header(&variant), base);
    }
}

#[test]
fn test_block_caches_header_digest() {
    let block = Block::new(5, header(), vec!["h1".into(), "h2".into()]);

    assert_eq!(block.block_hash, hash_header(&block.header));
    assert_eq!(block.block_hash, block.header.hash());
    assert_eq!(block.transaction_count, 2);
    assert!(block.contains_transaction("h2"));
    assert!(!block.contains_transaction("h3"));
}

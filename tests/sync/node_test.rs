// Node Tests
// Consensus, broadcast and mining across in-process peers

use async_trait::async_trait;
use powledger::chain::Block;
use powledger::identity::{Address, Keypair};
use powledger::ledger::{BlockRejection, Blockchain, ChainSummary, LedgerConfig, LedgerError};
use powledger::sync::{MemoryPeerClient, Node, NodeConfig, PeerClient, PeerError, SharedLedger};
use powledger::transaction::{SignedTransaction, TransactionBuilder};
use powledger::verification::MiningError;
use rust_decimal::Decimal;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::Mutex;

const NODE_A: &str = "http://node-a:5000";
const NODE_B: &str = "http://node-b:5000";
const NODE_C: &str = "http://node-c:5000";

fn address(keypair: &Keypair) -> String {
    Address::from_public_key(&keypair.public_key()).into()
}

fn shared_ledger(miner: &str) -> SharedLedger {
    let config = LedgerConfig::new().with_difficulty(1).with_address(miner);
    Arc::new(Mutex::new(Blockchain::new(config).unwrap()))
}

/// Create a node reachable at `uri` through `client`
fn node_at(client: &Arc<MemoryPeerClient>, uri: &str, miner: &str) -> Node {
    let ledger = shared_ledger(miner);
    client.connect(uri, ledger.clone());
    Node::from_shared(ledger, client.clone(), NodeConfig::new()).unwrap()
}

async fn mine(node: &Node) -> Block {
    node.mine(None, None, Arc::new(AtomicBool::new(false)))
        .await
        .unwrap()
}

async fn mine_times(node: &Node, times: usize) {
    for _ in 0..times {
        mine(node).await;
    }
}

async fn chain_of(node: &Node) -> Vec<String> {
    node.ledger().lock().await.pretty_chain()
}

fn transfer(from: &Keypair, to: &str, amount: i64, nonce: u64) -> SignedTransaction {
    TransactionBuilder::new()
        .sender(from)
        .recipient(to)
        .amount(Decimal::from(amount))
        .nonce(nonce)
        .build()
        .unwrap()
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[test]
fn test_node_config_defaults() {
    let config = NodeConfig::default();

    assert_eq!(config.peer_timeout_secs, 5);
    assert!(config.broadcast);
    assert!(config.validate().is_ok());
}

#[test]
fn test_node_rejects_zero_timeout() {
    let client = Arc::new(MemoryPeerClient::new());
    let ledger = Blockchain::new(LedgerConfig::new()).unwrap();

    let result = Node::new(ledger, client, NodeConfig::new().with_peer_timeout(0));
    assert!(matches!(result, Err(LedgerError::InvalidConfig(_))));
}

#[tokio::test]
async fn test_register_and_list_peers() {
    let client = Arc::new(MemoryPeerClient::new());
    let a = node_at(&client, NODE_A, "0xa");

    a.register_node("http://node-c:5000/?x=1").await.unwrap();
    a.register_node(NODE_B).await.unwrap();
    assert!(a.register_node("node-d:5000").await.is_err());

    assert_eq!(
        a.peers().await,
        vec![NODE_B.to_string(), NODE_C.to_string()]
    );
}

// ============================================================================
// CONSENSUS
// ============================================================================

#[tokio::test]
async fn test_resolve_adopts_longest_chain() {
    let client = Arc::new(MemoryPeerClient::new());
    let a = node_at(&client, NODE_A, "0xa");
    let b = node_at(&client, NODE_B, "0xb");
    let c = node_at(&client, NODE_C, "0xc");

    mine_times(&a, 1).await;
    mine_times(&b, 3).await;
    mine_times(&c, 2).await;

    a.register_node(NODE_B).await.unwrap();
    a.register_node(NODE_C).await.unwrap();

    assert!(a.resolve_conflicts().await.unwrap());
    assert_eq!(chain_of(&a).await, chain_of(&b).await);

    let ledger = a.ledger();
    let ledger = ledger.lock().await;
    assert!(ledger.verify().is_ok());
    assert!(ledger.missing_transactions().is_empty());
    assert_eq!(ledger.balance("0xb"), Decimal::from(30));
    assert_eq!(ledger.balance("0xa"), Decimal::ZERO);
}

#[tokio::test]
async fn test_resolve_keeps_longer_local_chain() {
    let client = Arc::new(MemoryPeerClient::new());
    let a = node_at(&client, NODE_A, "0xa");
    let b = node_at(&client, NODE_B, "0xb");

    mine_times(&a, 3).await;
    mine_times(&b, 1).await;
    a.register_node(NODE_B).await.unwrap();
    let before = chain_of(&a).await;

    assert!(!a.resolve_conflicts().await.unwrap());
    assert_eq!(chain_of(&a).await, before);
}

#[tokio::test]
async fn test_resolve_ignores_equal_length() {
    let client = Arc::new(MemoryPeerClient::new());
    let a = node_at(&client, NODE_A, "0xa");
    let b = node_at(&client, NODE_B, "0xb");

    mine_times(&a, 2).await;
    mine_times(&b, 2).await;
    a.register_node(NODE_B).await.unwrap();
    let before = chain_of(&a).await;

    assert!(!a.resolve_conflicts().await.unwrap());
    assert_eq!(chain_of(&a).await, before);
}

#[tokio::test]
async fn test_resolve_without_peers() {
    let client = Arc::new(MemoryPeerClient::new());
    let a = node_at(&client, NODE_A, "0xa");
    mine_times(&a, 1).await;

    assert!(!a.resolve_conflicts().await.unwrap());
    assert_eq!(client.call_count(), 0);
}

#[tokio::test]
async fn test_resolve_converges_cluster() {
    let client = Arc::new(MemoryPeerClient::new());
    let nodes = [
        node_at(&client, NODE_A, "0xa"),
        node_at(&client, NODE_B, "0xb"),
        node_at(&client, NODE_C, "0xc"),
    ];
    mine_times(&nodes[0], 2).await;
    mine_times(&nodes[1], 4).await;
    mine_times(&nodes[2], 1).await;

    for node in &nodes {
        for uri in [NODE_A, NODE_B, NODE_C] {
            node.register_node(uri).await.unwrap();
        }
    }
    for node in &nodes {
        node.resolve_conflicts().await.unwrap();
    }

    let expected = chain_of(&nodes[1]).await;
    for node in &nodes {
        assert_eq!(chain_of(node).await, expected);
    }
}

#[tokio::test]
async fn test_unreachable_peer_skipped() {
    let client = Arc::new(MemoryPeerClient::new());
    let a = node_at(&client, NODE_A, "0xa");
    let b = node_at(&client, NODE_B, "0xb");
    let c = node_at(&client, NODE_C, "0xc");

    mine_times(&b, 3).await;
    mine_times(&c, 2).await;
    client.set_unreachable(NODE_B, true);
    a.register_node(NODE_B).await.unwrap();
    a.register_node(NODE_C).await.unwrap();

    assert!(a.resolve_conflicts().await.unwrap());
    assert_eq!(chain_of(&a).await, chain_of(&c).await);
}

#[tokio::test]
async fn test_slow_peer_times_out() {
    let client = Arc::new(MemoryPeerClient::new().with_delay_ms(1500));
    let a_ledger = shared_ledger("0xa");
    let b_ledger = shared_ledger("0xb");
    client.connect(NODE_B, b_ledger.clone());

    let b = Node::from_shared(b_ledger, client.clone(), NodeConfig::new()).unwrap();
    mine_times(&b, 2).await;

    let a = Node::from_shared(
        a_ledger,
        client.clone(),
        NodeConfig::new().with_peer_timeout(1),
    )
    .unwrap();
    a.register_node(NODE_B).await.unwrap();
    let before = chain_of(&a).await;

    assert!(!a.resolve_conflicts().await.unwrap());
    assert_eq!(chain_of(&a).await, before);
}

/// How `TamperingClient` corrupts the blocks of its target peer
enum Tamper {
    /// Rewrite the first block's previous hash
    BreakLink,
    /// Answer each block request with the block at the same height of another peer
    ServeFrom(String),
}

/// Serves peer data faithfully except for the blocks of one target peer
struct TamperingClient {
    inner: MemoryPeerClient,
    target: String,
    tamper: Tamper,
}

#[async_trait]
impl PeerClient for TamperingClient {
    async fn fetch_chain_summary(&self, uri: &str) -> Result<ChainSummary, PeerError> {
        self.inner.fetch_chain_summary(uri).await
    }

    async fn fetch_block(&self, uri: &str, block_hash: &str) -> Result<Block, PeerError> {
        if uri != self.target {
            return self.inner.fetch_block(uri, block_hash).await;
        }

        match &self.tamper {
            Tamper::BreakLink => {
                let mut block = self.inner.fetch_block(uri, block_hash).await?;
                if block.index == 1 {
                    block.header.previous_hash = "00".repeat(32);
                }
                Ok(block)
            }
            Tamper::ServeFrom(other) => {
                let genuine = self.inner.fetch_chain_summary(uri).await?;
                let height = genuine.chain.iter().position(|h| h == block_hash);
                let decoy = self.inner.fetch_chain_summary(other).await?;
                match height.and_then(|i| decoy.chain.get(i)) {
                    Some(hash) => self.inner.fetch_block(other, hash).await,
                    None => self.inner.fetch_block(uri, block_hash).await,
                }
            }
        }
    }

    async fn fetch_transaction(
        &self,
        uri: &str,
        transaction_hash: &str,
    ) -> Result<SignedTransaction, PeerError> {
        self.inner.fetch_transaction(uri, transaction_hash).await
    }

    async fn broadcast_block(&self, uri: &str, block: &Block) -> Result<(), PeerError> {
        self.inner.broadcast_block(uri, block).await
    }

    async fn broadcast_transaction(
        &self,
        uri: &str,
        transaction: &SignedTransaction,
    ) -> Result<(), PeerError> {
        self.inner.broadcast_transaction(uri, transaction).await
    }
}

#[tokio::test]
async fn test_invalid_longer_chain_never_adopted() {
    let inner = MemoryPeerClient::new();
    let a_ledger = shared_ledger("0xa");
    let b_ledger = shared_ledger("0xb");
    let c_ledger = shared_ledger("0xc");
    inner.connect(NODE_B, b_ledger.clone());
    inner.connect(NODE_C, c_ledger.clone());

    let client = Arc::new(TamperingClient {
        inner,
        target: NODE_B.to_string(),
        tamper: Tamper::BreakLink,
    });
    let b = Node::from_shared(b_ledger, client.clone(), NodeConfig::new()).unwrap();
    let c = Node::from_shared(c_ledger, client.clone(), NodeConfig::new()).unwrap();
    let a = Node::from_shared(a_ledger, client, NodeConfig::new()).unwrap();

    mine_times(&b, 4).await;
    mine_times(&c, 2).await;
    a.register_node(NODE_B).await.unwrap();
    a.register_node(NODE_C).await.unwrap();

    assert!(a.resolve_conflicts().await.unwrap());
    assert_eq!(chain_of(&a).await, chain_of(&c).await);
}

#[tokio::test]
async fn test_blocks_must_match_advertised_hashes() {
    let inner = MemoryPeerClient::new();
    let a_ledger = shared_ledger("0xa");
    let b_ledger = shared_ledger("0xb");
    let c_ledger = shared_ledger("0xc");
    inner.connect(NODE_B, b_ledger.clone());
    inner.connect(NODE_C, c_ledger.clone());

    let client = Arc::new(TamperingClient {
        inner,
        target: NODE_B.to_string(),
        tamper: Tamper::ServeFrom(NODE_C.to_string()),
    });
    let b = Node::from_shared(b_ledger, client.clone(), NodeConfig::new()).unwrap();
    let c = Node::from_shared(c_ledger, client.clone(), NodeConfig::new()).unwrap();
    let a = Node::from_shared(a_ledger, client, NodeConfig::new()).unwrap();

    // Node C's chain is valid on its own, but it is not the chain B advertises
    mine_times(&b, 3).await;
    mine_times(&c, 3).await;
    mine_times(&a, 1).await;
    a.register_node(NODE_B).await.unwrap();
    let before = chain_of(&a).await;

    assert!(!a.resolve_conflicts().await.unwrap());
    assert_eq!(chain_of(&a).await, before);
}

// ============================================================================
// BROADCAST
// ============================================================================

/// Two connected nodes that both know `funded`'s mining reward
async fn funded_pair(client: &Arc<MemoryPeerClient>, funded: &Keypair) -> (Node, Node) {
    let a = node_at(client, NODE_A, &address(funded));
    let b = node_at(client, NODE_B, "0xb");
    mine(&a).await;

    a.register_node(NODE_B).await.unwrap();
    b.register_node(NODE_A).await.unwrap();
    assert!(b.resolve_conflicts().await.unwrap());
    (a, b)
}

#[tokio::test]
async fn test_synced_peer_knows_reward_body() {
    let client = Arc::new(MemoryPeerClient::new());
    let alice = Keypair::generate();
    let (a, b) = funded_pair(&client, &alice).await;

    assert_eq!(chain_of(&a).await, chain_of(&b).await);
    assert_eq!(
        b.ledger().lock().await.balance(&address(&alice)),
        Decimal::TEN
    );
}

#[tokio::test]
async fn test_transaction_broadcast_reaches_peer_pool() {
    let client = Arc::new(MemoryPeerClient::new());
    let alice = Keypair::generate();
    let (a, b) = funded_pair(&client, &alice).await;

    let tx = transfer(&alice, "0xcarol", 3, 0);
    let hash = tx.hash();
    assert_eq!(a.submit_transaction(tx).await.unwrap(), 2);

    let ledger = b.ledger();
    let ledger = ledger.lock().await;
    assert_eq!(ledger.open_transactions().len(), 1);
    assert_eq!(ledger.open_transactions()[0].transaction_hash(), hash);
}

#[tokio::test]
async fn test_received_transaction_not_relayed() {
    let client = Arc::new(MemoryPeerClient::new());
    let alice = Keypair::generate();
    let (a, b) = funded_pair(&client, &alice).await;
    let calls = client.call_count();

    b.receive_transaction(transfer(&alice, "0xcarol", 1, 0))
        .await
        .unwrap();

    assert_eq!(client.call_count(), calls);
    assert!(a.ledger().lock().await.open_transactions().is_empty());
}

#[tokio::test]
async fn test_block_broadcast_extends_peer_and_clears_pool() {
    let client = Arc::new(MemoryPeerClient::new());
    let alice = Keypair::generate();
    let (a, b) = funded_pair(&client, &alice).await;

    a.submit_transaction(transfer(&alice, "0xcarol", 3, 0))
        .await
        .unwrap();
    let block = mine(&a).await;

    assert_eq!(chain_of(&a).await, chain_of(&b).await);
    let ledger = b.ledger();
    let ledger = ledger.lock().await;
    assert_eq!(ledger.last_block(), &block);
    assert!(ledger.open_transactions().is_empty());
    assert_eq!(ledger.balance("0xcarol"), Decimal::from(3));
}

#[tokio::test]
async fn test_broadcast_failures_do_not_fail_mining() {
    let client = Arc::new(MemoryPeerClient::new());
    let a = node_at(&client, NODE_A, "0xa");
    let b = node_at(&client, NODE_B, "0xb");
    mine_times(&b, 2).await;

    a.register_node(NODE_B).await.unwrap();
    a.register_node(NODE_C).await.unwrap();
    client.set_unreachable(NODE_C, true);

    let block = mine(&a).await;

    assert_eq!(block.index, 1);
    assert_eq!(b.ledger().lock().await.len(), 3);
}

#[tokio::test]
async fn test_receive_block_fetches_missing_bodies() {
    let client = Arc::new(MemoryPeerClient::new());
    let a = node_at(&client, NODE_A, "0xa");
    let b = node_at(&client, NODE_B, "0xb");
    b.register_node(NODE_A).await.unwrap();

    let block = mine(&a).await;
    b.receive_block(block).await.unwrap();

    let ledger = b.ledger();
    let ledger = ledger.lock().await;
    assert!(ledger.missing_transactions().is_empty());
    assert_eq!(ledger.balance("0xa"), Decimal::TEN);
}

#[tokio::test]
async fn test_receive_block_out_of_order() {
    let client = Arc::new(MemoryPeerClient::new());
    let a = node_at(&client, NODE_A, "0xa");
    let b = node_at(&client, NODE_B, "0xb");

    mine(&a).await;
    let block = mine(&a).await;

    let err = b.receive_block(block).await.unwrap_err();
    assert!(matches!(err, BlockRejection::OutOfOrder { .. }));
}

// ============================================================================
// MINING
// ============================================================================

#[tokio::test]
async fn test_node_mining_appends_valid_blocks() {
    let client = Arc::new(MemoryPeerClient::new());
    let a = node_at(&client, NODE_A, "0xa");

    mine_times(&a, 3).await;

    let ledger = a.ledger();
    let ledger = ledger.lock().await;
    assert_eq!(ledger.len(), 4);
    assert!(ledger.verify().is_ok());
    assert_eq!(ledger.balance("0xa"), Decimal::from(30));
}

#[tokio::test]
async fn test_node_mining_cancel() {
    let client = Arc::new(MemoryPeerClient::new());
    let a = node_at(&client, NODE_A, "0xa");

    let result = a
        .mine(None, Some(64), Arc::new(AtomicBool::new(true)))
        .await;

    assert!(matches!(
        result,
        Err(LedgerError::Mining(MiningError::Cancelled { .. }))
    ));
    assert_eq!(a.ledger().lock().await.len(), 1);
}

#[tokio::test]
async fn test_node_mining_without_reward_address() {
    let client = Arc::new(MemoryPeerClient::new());
    let ledger = Blockchain::new(LedgerConfig::new().with_difficulty(1)).unwrap();
    let node = Node::new(ledger, client, NodeConfig::new()).unwrap();

    let result = node.mine(None, None, Arc::new(AtomicBool::new(false))).await;
    assert!(matches!(result, Err(LedgerError::NoRewardAddress)));

    let block = node
        .mine(Some("0xexplicit"), None, Arc::new(AtomicBool::new(false)))
        .await
        .unwrap();
    assert_eq!(block.index, 1);
}

// Peer Client - The calls a node makes to its peers
//
// Blocks and transactions cross the wire hex-encoded. The transport is left
// to implementors; `MemoryPeerClient` wires ledgers together in-process.

use crate::chain::Block;
use crate::ledger::{Blockchain, ChainSummary};
use crate::sync::PeerError;
use crate::transaction::SignedTransaction;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;

// ============================================================================
// PEER CLIENT TRAIT
// ============================================================================

/// Outbound peer calls, one per wire endpoint
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// `GET chain`
    async fn fetch_chain_summary(&self, uri: &str) -> Result<ChainSummary, PeerError>;

    /// `GET block/{hash}`
    async fn fetch_block(&self, uri: &str, block_hash: &str) -> Result<Block, PeerError>;

    /// `GET transaction/{hash}`
    async fn fetch_transaction(
        &self,
        uri: &str,
        transaction_hash: &str,
    ) -> Result<SignedTransaction, PeerError>;

    /// `POST broadcast-block`
    async fn broadcast_block(&self, uri: &str, block: &Block) -> Result<(), PeerError>;

    /// `POST broadcast-transaction`
    async fn broadcast_transaction(
        &self,
        uri: &str,
        transaction: &SignedTransaction,
    ) -> Result<(), PeerError>;
}

// ============================================================================
// IN-PROCESS PEER CLIENT
// ============================================================================

/// Peer client that dispatches straight into other ledgers in the same process.
///
/// Values still go through their hex wire form in both directions.
pub struct MemoryPeerClient {
    peers: RwLock<HashMap<String, Arc<Mutex<Blockchain>>>>,
    unreachable: RwLock<HashSet<String>>,
    delay_ms: u64,
    call_count: AtomicUsize,
}

impl MemoryPeerClient {
    pub fn new() -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            unreachable: RwLock::new(HashSet::new()),
            delay_ms: 0,
            call_count: AtomicUsize::new(0),
        }
    }

    /// Delay every call, for exercising peer timeouts
    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Route `uri` to a ledger
    pub fn connect(&self, uri: impl Into<String>, ledger: Arc<Mutex<Blockchain>>) {
        if let Ok(mut peers) = self.peers.write() {
            peers.insert(uri.into(), ledger);
        }
    }

    /// Make calls to `uri` fail as if the peer were down
    pub fn set_unreachable(&self, uri: impl Into<String>, unreachable: bool) {
        if let Ok(mut set) = self.unreachable.write() {
            let uri = uri.into();
            if unreachable {
                set.insert(uri);
            } else {
                set.remove(&uri);
            }
        }
    }

    /// Number of calls made so far
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    async fn resolve(&self, uri: &str) -> Result<Arc<Mutex<Blockchain>>, PeerError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }

        let unavailable = |reason: &str| PeerError::Unavailable {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };

        if self
            .unreachable
            .read()
            .map_err(|_| unavailable("lock poisoned"))?
            .contains(uri)
        {
            return Err(unavailable("connection refused"));
        }

        self.peers
            .read()
            .map_err(|_| unavailable("lock poisoned"))?
            .get(uri)
            .cloned()
            .ok_or_else(|| unavailable("unknown host"))
    }
}

impl Default for MemoryPeerClient {
    fn default() -> Self {
        Self::new()
    }
}

fn malformed(uri: &str, reason: impl ToString) -> PeerError {
    PeerError::Malformed {
        uri: uri.to_string(),
        reason: reason.to_string(),
    }
}

fn rejected(uri: &str, reason: impl ToString) -> PeerError {
    PeerError::Rejected {
        uri: uri.to_string(),
        reason: reason.to_string(),
    }
}

#[async_trait]
impl PeerClient for MemoryPeerClient {
    async fn fetch_chain_summary(&self, uri: &str) -> Result<ChainSummary, PeerError> {
        let ledger = self.resolve(uri).await?;
        let summary = ledger.lock().await.chain_summary();
        Ok(summary)
    }

    async fn fetch_block(&self, uri: &str, block_hash: &str) -> Result<Block, PeerError> {
        let ledger = self.resolve(uri).await?;
        let wire = {
            let ledger = ledger.lock().await;
            let block = ledger
                .block_by_hash(block_hash)
                .ok_or_else(|| PeerError::NotFound {
                    uri: uri.to_string(),
                    what: format!("block {}", block_hash),
                })?;
            block.to_hex().map_err(|e| malformed(uri, e))?
        };
        Block::from_hex(&wire).map_err(|e| malformed(uri, e))
    }

    async fn fetch_transaction(
        &self,
        uri: &str,
        transaction_hash: &str,
    ) -> Result<SignedTransaction, PeerError> {
        let ledger = self.resolve(uri).await?;
        let wire = {
            let ledger = ledger.lock().await;
            let transaction = ledger
                .transaction_by_hash(transaction_hash)
                .ok_or_else(|| PeerError::NotFound {
                    uri: uri.to_string(),
                    what: format!("transaction {}", transaction_hash),
                })?;
            transaction
                .signed_transaction()
                .to_hex()
                .map_err(|e| malformed(uri, e))?
        };
        SignedTransaction::from_hex(&wire).map_err(|e| malformed(uri, e))
    }

    async fn broadcast_block(&self, uri: &str, block: &Block) -> Result<(), PeerError> {
        let wire = block.to_hex().map_err(|e| malformed(uri, e))?;
        let ledger = self.resolve(uri).await?;

        let block = Block::from_hex(&wire).map_err(|e| malformed(uri, e))?;
        let accepted = ledger.lock().await.accept_remote_block(block);
        accepted.map_err(|e| rejected(uri, e))
    }

    async fn broadcast_transaction(
        &self,
        uri: &str,
        transaction: &SignedTransaction,
    ) -> Result<(), PeerError> {
        let wire = transaction.to_hex().map_err(|e| malformed(uri, e))?;
        let ledger = self.resolve(uri).await?;

        let transaction = SignedTransaction::from_hex(&wire).map_err(|e| malformed(uri, e))?;
        let submitted = ledger.lock().await.submit_transaction(transaction);
        submitted.map(|_| ()).map_err(|e| rejected(uri, e))
    }
}

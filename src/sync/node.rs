// Node - One ledger behind one lock, plus its peer traffic
//
// Every chain or pool mutation takes the ledger mutex. Mining holds it only to
// prepare and to commit; the nonce search runs on a blocking worker without it.
// Peer calls are bounded by `NodeConfig::peer_timeout_secs` and failures are
// logged and skipped.

use crate::chain::Block;
use crate::ledger::{BlockRejection, Blockchain, LedgerError};
use crate::sync::{PeerClient, PeerError};
use crate::transaction::SignedTransaction;
use crate::verification::{search_nonce, verify_chain};
use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// A ledger shared between tasks
pub type SharedLedger = Arc<Mutex<Blockchain>>;

/// Configuration for peer traffic
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Upper bound on any single peer call
    pub peer_timeout_secs: u64,
    /// Push new transactions and mined blocks to every peer
    pub broadcast: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            peer_timeout_secs: 5,
            broadcast: true,
        }
    }
}

impl NodeConfig {
    /// Create a new config builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-call peer timeout
    pub fn with_peer_timeout(mut self, secs: u64) -> Self {
        self.peer_timeout_secs = secs;
        self
    }

    /// Enable or disable broadcasting
    pub fn with_broadcast(mut self, broadcast: bool) -> Self {
        self.broadcast = broadcast;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.peer_timeout_secs == 0 {
            return Err(LedgerError::InvalidConfig(
                "peer_timeout_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// A ledger and the client it uses to reach its peers
pub struct Node {
    ledger: SharedLedger,
    client: Arc<dyn PeerClient>,
    config: NodeConfig,
}

impl Node {
    /// Wrap a ledger
    pub fn new(
        ledger: Blockchain,
        client: Arc<dyn PeerClient>,
        config: NodeConfig,
    ) -> Result<Self, LedgerError> {
        Self::from_shared(Arc::new(Mutex::new(ledger)), client, config)
    }

    /// Wrap a ledger that is already shared
    pub fn from_shared(
        ledger: SharedLedger,
        client: Arc<dyn PeerClient>,
        config: NodeConfig,
    ) -> Result<Self, LedgerError> {
        config.validate()?;
        Ok(Self {
            ledger,
            client,
            config,
        })
    }

    /// Handle to the underlying ledger
    pub fn ledger(&self) -> SharedLedger {
        self.ledger.clone()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.config.peer_timeout_secs)
    }

    async fn call<T, F>(&self, uri: &str, request: F) -> Result<T, PeerError>
    where
        F: Future<Output = Result<T, PeerError>>,
    {
        match tokio::time::timeout(self.peer_timeout(), request).await {
            Ok(result) => result,
            Err(_) => Err(PeerError::Timeout(uri.to_string())),
        }
    }

    async fn peer_uris(&self) -> Vec<String> {
        self.ledger.lock().await.peers().uris()
    }

    // ========================================================================
    // PEER SET
    // ========================================================================

    /// `POST nodes/register` for one URI
    pub async fn register_node(&self, address: &str) -> Result<String, LedgerError> {
        self.ledger.lock().await.register_node(address)
    }

    /// `GET nodes`
    pub async fn peers(&self) -> Vec<String> {
        self.peer_uris().await
    }

    // ========================================================================
    // TRANSACTIONS
    // ========================================================================

    /// Admit a client transaction and push it to peers
    pub async fn submit_transaction(
        &self,
        transaction: SignedTransaction,
    ) -> Result<u64, LedgerError> {
        let index = self
            .ledger
            .lock()
            .await
            .submit_transaction(transaction.clone())?;

        if self.config.broadcast {
            self.broadcast_transaction(&transaction).await;
        }
        Ok(index)
    }

    /// Admit a transaction relayed by a peer, without relaying it further
    pub async fn receive_transaction(
        &self,
        transaction: SignedTransaction,
    ) -> Result<u64, LedgerError> {
        self.ledger.lock().await.submit_transaction(transaction)
    }

    /// Best-effort, at-most-once push to every peer
    pub async fn broadcast_transaction(&self, transaction: &SignedTransaction) {
        for uri in self.peer_uris().await {
            let request = self.client.broadcast_transaction(&uri, transaction);
            match self.call(&uri, request).await {
                Ok(()) => debug!(peer = %uri, "Transaction broadcast"),
                Err(e) => warn!(peer = %uri, error = %e, "Peer skipped during transaction broadcast"),
            }
        }
    }

    // ========================================================================
    // BLOCKS
    // ========================================================================

    /// Mine the current pool.
    ///
    /// The lock is released during the nonce search. If another block lands in
    /// the meantime the result is `LedgerError::StaleTemplate` and nothing is
    /// appended. Setting `cancel` aborts the search.
    pub async fn mine(
        &self,
        reward_address: Option<&str>,
        difficulty: Option<u32>,
        cancel: Arc<AtomicBool>,
    ) -> Result<Block, LedgerError> {
        let template = self
            .ledger
            .lock()
            .await
            .prepare_block(reward_address, difficulty)?;

        let header = template.header.clone();
        let nonce = tokio::task::spawn_blocking(move || search_nonce(&header, &cancel))
            .await
            .map_err(|e| LedgerError::Worker(e.to_string()))??;

        let block = self.ledger.lock().await.commit_block(template, nonce)?;

        if self.config.broadcast {
            self.broadcast_block(&block).await;
        }
        Ok(block)
    }

    /// `POST broadcast-block`. Bodies the block references but this node never
    /// saw are then fetched from peers.
    pub async fn receive_block(&self, block: Block) -> Result<(), BlockRejection> {
        self.ledger.lock().await.accept_remote_block(block)?;
        let peers = self.peer_uris().await;
        self.fetch_missing_transactions(&peers).await;
        Ok(())
    }

    /// Best-effort, at-most-once push to every peer
    pub async fn broadcast_block(&self, block: &Block) {
        for uri in self.peer_uris().await {
            let request = self.client.broadcast_block(&uri, block);
            match self.call(&uri, request).await {
                Ok(()) => debug!(peer = %uri, index = block.index, "Block broadcast"),
                Err(e) => warn!(peer = %uri, error = %e, "Peer skipped during block broadcast"),
            }
        }
    }

    // ========================================================================
    // CONSENSUS
    // ========================================================================

    async fn fetch_chain(&self, uri: &str) -> Result<Vec<Block>, PeerError> {
        let summary = self
            .call(uri, self.client.fetch_chain_summary(uri))
            .await?;

        if summary.chain.len() as u64 != summary.length {
            return Err(PeerError::Malformed {
                uri: uri.to_string(),
                reason: format!(
                    "length {} but {} block hashes",
                    summary.length,
                    summary.chain.len()
                ),
            });
        }

        let mut blocks = Vec::with_capacity(summary.chain.len());
        for block_hash in &summary.chain {
            let block = self
                .call(uri, self.client.fetch_block(uri, block_hash))
                .await?;
            if &block.block_hash != block_hash {
                return Err(PeerError::Malformed {
                    uri: uri.to_string(),
                    reason: format!(
                        "asked for block {} but got block {}",
                        block_hash, block.block_hash
                    ),
                });
            }
            blocks.push(block);
        }
        Ok(blocks)
    }

    /// Adopt the longest valid chain among peers.
    ///
    /// Peers are visited in sorted URI order; among equally long candidates the
    /// first one that validates wins. Unreachable or invalid peers are skipped.
    /// Returns whether the local chain was replaced.
    pub async fn resolve_conflicts(&self) -> Result<bool, LedgerError> {
        let (peers, local_length) = {
            let ledger = self.ledger.lock().await;
            (ledger.peers().uris(), ledger.len() as u64)
        };

        let mut best: Option<Vec<Block>> = None;

        for uri in &peers {
            let summary = match self.call(uri, self.client.fetch_chain_summary(uri)).await {
                Ok(summary) => summary,
                Err(e) => {
                    warn!(peer = %uri, error = %e, "Peer skipped during resolution");
                    continue;
                }
            };

            let to_beat = best.as_ref().map_or(local_length, |b| b.len() as u64);
            let genesis_tie = best.is_none() && local_length == 1 && summary.length == 1;
            if summary.length <= to_beat && !genesis_tie {
                debug!(peer = %uri, length = summary.length, to_beat, "Peer chain not longer");
                continue;
            }

            let candidate = match self.fetch_chain(uri).await {
                Ok(blocks) => blocks,
                Err(e) => {
                    warn!(peer = %uri, error = %e, "Peer skipped during resolution");
                    continue;
                }
            };

            if let Err(e) = verify_chain(&candidate) {
                warn!(peer = %uri, error = %e, "Peer chain invalid");
                continue;
            }

            // A peer may have grown between the summary and the block fetch
            if (candidate.len() as u64) <= to_beat && !genesis_tie {
                continue;
            }

            debug!(peer = %uri, length = candidate.len(), "Found longer valid chain");
            best = Some(candidate);
        }

        let Some(candidate) = best else {
            info!(length = local_length, "Our chain is authoritative");
            return Ok(false);
        };

        let replaced = self.ledger.lock().await.replace_chain(candidate)?;
        if replaced {
            info!("Our chain was replaced");
            self.fetch_missing_transactions(&peers).await;
        }
        Ok(replaced)
    }

    /// Fill in transaction bodies the adopted chain references but we never saw
    async fn fetch_missing_transactions(&self, peers: &[String]) {
        let missing = self.ledger.lock().await.missing_transactions();
        if missing.is_empty() {
            return;
        }
        debug!(count = missing.len(), "Fetching missing transaction bodies");

        for hash in missing {
            for uri in peers {
                let transaction = match self
                    .call(uri, self.client.fetch_transaction(uri, &hash))
                    .await
                {
                    Ok(transaction) => transaction,
                    Err(e) => {
                        debug!(peer = %uri, hash = %hash, error = %e, "Transaction body not fetched");
                        continue;
                    }
                };

                if transaction.hash() != hash {
                    warn!(peer = %uri, hash = %hash, "Peer returned a transaction with a different hash");
                    continue;
                }

                self.ledger.lock().await.attach_transaction(transaction);
                break;
            }
        }
    }
}

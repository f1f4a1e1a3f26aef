// Blockchain - The ledger state machine
//
// Owns the chain, the open transaction pool, the index of confirmed
// transaction bodies and the peer set. Every mutation goes through `&mut self`;
// callers sharing a ledger across tasks put it behind one lock (`sync::Node`).

use crate::chain::{merkle_root, Block, Header};
use crate::ledger::{BlockRejection, LedgerConfig, LedgerError, MAX_DIFFICULTY};
use crate::storage::{BlobStore, Namespace, StoreError};
use crate::sync::PeerRegistry;
use crate::transaction::{timestamp_now, Codec, CommittedTransaction, SignedTransaction};
use crate::verification::{
    admit, check_nonce, hash_header, proof_of_work, valid_proof, verify_chain, AdmissionError,
    ChainError,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What a node reports for `GET chain`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSummary {
    pub length: u64,
    /// Block hashes in chain order
    pub chain: Vec<String>,
}

/// A block ready for the nonce search.
///
/// `transactions` is the pool snapshot followed by the reward.
#[derive(Clone, Debug)]
pub struct BlockTemplate {
    pub index: u64,
    pub header: Header,
    pub transactions: Vec<CommittedTransaction>,
}

impl BlockTemplate {
    /// The pooled transactions included, without the reward
    pub fn pooled(&self) -> &[CommittedTransaction] {
        match self.transactions.split_last() {
            Some((_, pooled)) => pooled,
            None => &[],
        }
    }

    pub fn reward(&self) -> Option<&CommittedTransaction> {
        self.transactions.last()
    }

    pub fn transaction_hashes(&self) -> Vec<String> {
        self.transactions
            .iter()
            .map(|t| t.transaction_hash().to_string())
            .collect()
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Codec::encode(value).map_err(|e| StoreError::SerializationFailed(e.to_string()))
}

/// The chain, its pool and its peers
pub struct Blockchain {
    config: LedgerConfig,
    /// Never empty: index 0 is genesis
    chain: Vec<Block>,
    /// Admitted transactions in insertion order
    open_transactions: Vec<CommittedTransaction>,
    /// Bodies of transactions referenced by `chain`
    confirmed: HashMap<String, CommittedTransaction>,
    peers: PeerRegistry,
    store: Option<Arc<dyn BlobStore>>,
}

impl Blockchain {
    /// Create an in-memory ledger holding only genesis
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerError> {
        config.validate()?;
        let genesis = Self::genesis_block(&config);

        Ok(Self {
            config,
            chain: vec![genesis],
            open_transactions: Vec::new(),
            confirmed: HashMap::new(),
            peers: PeerRegistry::new(),
            store: None,
        })
    }

    /// Open a ledger over a store, reloading blocks and the pool if present
    pub fn with_store(config: LedgerConfig, store: Arc<dyn BlobStore>) -> Result<Self, LedgerError> {
        let mut ledger = Self::new(config)?;
        ledger.load(store.as_ref())?;
        ledger.store = Some(store);

        if ledger.chain.len() == 1 {
            let genesis = ledger.chain[0].clone();
            ledger.persist("save genesis", |store| {
                store.save(Namespace::Blocks, &genesis.block_hash, &encode(&genesis)?)
            });
        }

        Ok(ledger)
    }

    fn genesis_block(config: &LedgerConfig) -> Block {
        Block::genesis(
            config.version,
            config.difficulty,
            config.genesis_timestamp.unwrap_or(0),
        )
    }

    fn load(&mut self, store: &dyn BlobStore) -> Result<(), LedgerError> {
        let mut blocks = store
            .list(Namespace::Blocks)?
            .into_iter()
            .map(|(_, bytes)| Codec::decode::<Block>(&bytes))
            .collect::<Result<Vec<_>, _>>()?;

        if !blocks.is_empty() {
            blocks.sort_by_key(|b| b.index);
            verify_chain(&blocks)?;
            self.chain = blocks;
        }

        let referenced: HashSet<String> = self
            .chain_hashes()
            .into_iter()
            .map(str::to_string)
            .collect();
        for namespace in [Namespace::Confirmed, Namespace::Mining] {
            for (hash, bytes) in store.list(namespace)? {
                if !referenced.contains(&hash) {
                    continue;
                }
                let signed: SignedTransaction = Codec::decode(&bytes)?;
                self.confirmed
                    .insert(hash.clone(), CommittedTransaction::from_parts(hash, signed));
            }
        }

        let mut open = Vec::new();
        for (hash, bytes) in store.list(Namespace::Open)? {
            if referenced.contains(&hash) {
                continue;
            }
            let signed: SignedTransaction = Codec::decode(&bytes)?;
            open.push(CommittedTransaction::from_parts(hash, signed));
        }
        // Per sender, nonce order is insertion order
        open.sort_by_key(|t| t.details().nonce());
        self.open_transactions = open;

        info!(
            blocks = self.chain.len(),
            confirmed = self.confirmed.len(),
            open = self.open_transactions.len(),
            "Ledger loaded from store"
        );
        Ok(())
    }

    /// Run a best-effort storage write; failures are logged, never returned
    fn persist<F>(&self, action: &str, write: F)
    where
        F: FnOnce(&dyn BlobStore) -> Result<(), StoreError>,
    {
        if let Some(store) = &self.store {
            if let Err(e) = write(store.as_ref()) {
                error!(action, error = %e, "Storage write failed");
            }
        }
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Always false: a ledger holds at least genesis
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn last_block(&self) -> &Block {
        // chain always holds genesis
        &self.chain[self.chain.len() - 1]
    }

    pub fn last_index(&self) -> u64 {
        self.last_block().index
    }

    pub fn open_transactions(&self) -> &[CommittedTransaction] {
        &self.open_transactions
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    /// Add a peer; returns its normalized URI
    pub fn register_node(&mut self, address: &str) -> Result<String, LedgerError> {
        let (uri, _) = self.peers.register(address).map_err(LedgerError::InvalidPeerUri)?;
        Ok(uri)
    }

    pub fn block_by_hash(&self, block_hash: &str) -> Option<&Block> {
        self.chain.iter().find(|b| b.block_hash == block_hash)
    }

    pub fn block_by_index(&self, index: u64) -> Option<&Block> {
        self.chain.get(usize::try_from(index).ok()?)
    }

    /// Look a transaction up in the pool, then among confirmed bodies
    pub fn transaction_by_hash(&self, transaction_hash: &str) -> Option<&CommittedTransaction> {
        self.open_transactions
            .iter()
            .find(|t| t.transaction_hash() == transaction_hash)
            .or_else(|| self.confirmed.get(transaction_hash))
    }

    /// Block hashes in chain order
    pub fn pretty_chain(&self) -> Vec<String> {
        self.chain.iter().map(|b| b.block_hash.clone()).collect()
    }

    pub fn chain_summary(&self) -> ChainSummary {
        ChainSummary {
            length: self.chain.len() as u64,
            chain: self.pretty_chain(),
        }
    }

    /// Walk the local chain
    pub fn verify(&self) -> Result<(), ChainError> {
        verify_chain(&self.chain)
    }

    fn chain_hashes(&self) -> HashSet<&str> {
        self.chain
            .iter()
            .flat_map(|b| b.transactions.iter().map(String::as_str))
            .collect()
    }

    /// Confirmed transaction bodies in chain order. Hashes with no known body are skipped.
    fn chain_transactions(&self) -> impl Iterator<Item = &CommittedTransaction> {
        self.chain
            .iter()
            .flat_map(|b| b.transactions.iter())
            .filter_map(|hash| self.confirmed.get(hash))
    }

    // ========================================================================
    // BALANCES AND NONCES
    // ========================================================================

    /// Confirmed received minus confirmed sent.
    ///
    /// A body whose amount would overflow the running total is skipped.
    pub fn confirmed_balance(&self, account: &str) -> Decimal {
        let mut balance = Decimal::ZERO;

        for tx in self.chain_transactions() {
            let details = tx.details();
            let mut next = balance;
            if details.recipient() == account {
                next = match next.checked_add(details.amount()) {
                    Some(next) => next,
                    None => {
                        warn!(hash = tx.transaction_hash(), account, "Credit overflows balance, skipped");
                        continue;
                    }
                };
            }
            if details.sender() == account && !tx.signed_transaction().is_coinbase() {
                next = match next.checked_sub(details.amount()) {
                    Some(next) => next,
                    None => {
                        warn!(hash = tx.transaction_hash(), account, "Debit overflows balance, skipped");
                        continue;
                    }
                };
            }
            balance = next;
        }

        balance
    }

    /// Sum of the account's own transfers still in the pool
    pub fn pending_debits(&self, account: &str) -> Decimal {
        self.open_transactions
            .iter()
            .filter(|t| t.details().sender() == account)
            .fold(Decimal::ZERO, |total, t| {
                total.checked_add(t.details().amount()).unwrap_or(Decimal::MAX)
            })
    }

    /// What the account can still spend: confirmed balance minus pending debits.
    /// Pending credits are not counted until mined. An unrepresentable result
    /// reports `Decimal::MIN` so nothing more can be spent.
    pub fn balance(&self, account: &str) -> Decimal {
        self.confirmed_balance(account)
            .checked_sub(self.pending_debits(account))
            .unwrap_or(Decimal::MIN)
    }

    /// Highest nonce the sender has used in the chain
    pub fn confirmed_nonce(&self, sender: &str) -> Option<u64> {
        self.chain_transactions()
            .filter(|t| !t.signed_transaction().is_coinbase())
            .filter(|t| t.details().sender() == sender)
            .map(|t| t.details().nonce())
            .max()
    }

    /// Highest nonce the sender has used in the chain or the pool
    pub fn last_nonce(&self, sender: &str) -> Option<u64> {
        let pooled = self
            .open_transactions
            .iter()
            .filter(|t| t.details().sender() == sender)
            .map(|t| t.details().nonce())
            .max();

        self.confirmed_nonce(sender).max(pooled)
    }

    // ========================================================================
    // TRANSACTIONS
    // ========================================================================

    /// Admit a transaction into the pool.
    ///
    /// Returns the index of the block expected to include it. On rejection the
    /// ledger is left untouched.
    pub fn submit_transaction(&mut self, transaction: SignedTransaction) -> Result<u64, LedgerError> {
        let committed = match admit(
            transaction,
            |account| self.balance(account),
            |sender| self.last_nonce(sender),
        ) {
            Ok(committed) => committed,
            Err(e) => {
                warn!(error = %e, "Transaction rejected");
                return Err(e.into());
            }
        };

        self.persist("save open transaction", |store| {
            store.save(
                Namespace::Open,
                committed.transaction_hash(),
                &encode(committed.signed_transaction())?,
            )
        });

        info!(
            hash = committed.transaction_hash(),
            sender = committed.details().sender(),
            recipient = committed.details().recipient(),
            amount = %committed.details().amount(),
            "Transaction added to pool"
        );
        self.open_transactions.push(committed);

        Ok(self.last_index() + 1)
    }

    /// Hashes referenced by the chain whose bodies this ledger does not hold
    pub fn missing_transactions(&self) -> Vec<String> {
        self.chain
            .iter()
            .flat_map(|b| b.transactions.iter())
            .filter(|hash| !self.confirmed.contains_key(hash.as_str()))
            .cloned()
            .collect()
    }

    /// Store the body of a transaction the chain references. Returns false when
    /// the chain does not reference it, it is already known, its amount is
    /// negative, or crediting it would overflow the recipient's balance.
    pub fn attach_transaction(&mut self, transaction: SignedTransaction) -> bool {
        let committed = CommittedTransaction::new(transaction);
        let hash = committed.transaction_hash().to_string();

        if self.confirmed.contains_key(&hash) || !self.chain_hashes().contains(hash.as_str()) {
            return false;
        }

        let details = committed.details();
        if details.amount().is_sign_negative() && !details.amount().is_zero() {
            warn!(hash = %hash, amount = %details.amount(), "Refusing body with negative amount");
            return false;
        }
        let debits_sender = !committed.signed_transaction().is_coinbase();
        if self
            .confirmed_balance(details.recipient())
            .checked_add(details.amount())
            .is_none()
            || (debits_sender
                && self
                    .confirmed_balance(details.sender())
                    .checked_sub(details.amount())
                    .is_none())
        {
            warn!(hash = %hash, "Refusing body that overflows a balance");
            return false;
        }

        let namespace = if committed.signed_transaction().is_coinbase() {
            Namespace::Mining
        } else {
            Namespace::Confirmed
        };
        self.persist("save fetched transaction", |store| {
            store.save(namespace, &hash, &encode(committed.signed_transaction())?)
        });

        debug!(hash = %hash, "Attached transaction body");
        self.confirmed.insert(hash, committed);
        true
    }

    // ========================================================================
    // MINING
    // ========================================================================

    /// Replay the pool in insertion order against the chain alone
    fn revalidate_pool(&self) -> Result<(), LedgerError> {
        let mut nonces: HashMap<&str, Option<u64>> = HashMap::new();
        let mut balances: HashMap<&str, Decimal> = HashMap::new();

        for tx in &self.open_transactions {
            let details = tx.details();
            let sender = details.sender();
            let rejected = |source| LedgerError::PoolRejected {
                hash: tx.transaction_hash().to_string(),
                source,
            };

            if !tx.signed_transaction().verify() {
                return Err(rejected(AdmissionError::InvalidSignature));
            }

            let last = *nonces
                .entry(sender)
                .or_insert_with(|| self.confirmed_nonce(sender));
            check_nonce(tx.signed_transaction(), last).map_err(rejected)?;
            nonces.insert(sender, Some(details.nonce()));

            let available = balances
                .entry(sender)
                .or_insert_with(|| self.confirmed_balance(sender));
            let remaining = match available.checked_sub(details.amount()) {
                Some(remaining) if *available >= details.amount() => remaining,
                _ => {
                    return Err(rejected(AdmissionError::InsufficientFunds {
                        sender: sender.to_string(),
                        amount: details.amount(),
                        balance: *available,
                    }))
                }
            };
            *available = remaining;
        }

        Ok(())
    }

    /// Snapshot the pool, validate it and assemble the header to mine.
    ///
    /// Nothing is mutated; the template is finished by `commit_block`.
    pub fn prepare_block(
        &self,
        reward_address: Option<&str>,
        difficulty: Option<u32>,
    ) -> Result<BlockTemplate, LedgerError> {
        let recipient = reward_address
            .map(str::to_string)
            .or_else(|| self.config.address.clone())
            .filter(|a| !a.trim().is_empty())
            .ok_or(LedgerError::NoRewardAddress)?;

        let difficulty = difficulty.unwrap_or(self.config.difficulty);
        if difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::InvalidConfig(format!(
                "difficulty must be <= {}",
                MAX_DIFFICULTY
            )));
        }

        if let Err(e) = self.revalidate_pool() {
            error!(error = %e, "Pool failed re-validation, not mining");
            return Err(e);
        }

        let last = self.last_block();
        // Strictly increasing timestamps keep reward hashes unique per block
        let timestamp = timestamp_now().max(last.header.timestamp.saturating_add(1));

        let reward = CommittedTransaction::new(SignedTransaction::coinbase(
            recipient,
            self.config.mining_reward,
            timestamp,
        ));

        let mut transactions = self.open_transactions.clone();
        transactions.push(reward);

        let signed: Vec<SignedTransaction> = transactions
            .iter()
            .map(|t| t.signed_transaction().clone())
            .collect();

        let header = Header {
            version: self.config.version,
            previous_hash: hash_header(&last.header),
            transaction_merkle_root: merkle_root(&signed),
            timestamp,
            difficulty,
            nonce: 0,
        };

        debug!(
            index = last.index + 1,
            transactions = transactions.len(),
            difficulty,
            "Prepared block template"
        );

        Ok(BlockTemplate {
            index: last.index + 1,
            header,
            transactions,
        })
    }

    /// Append a template finished with `nonce`.
    ///
    /// Fails with `StaleTemplate` if another block was appended since the
    /// template was prepared. Only the snapshotted transactions leave the pool.
    pub fn commit_block(&mut self, template: BlockTemplate, nonce: u64) -> Result<Block, LedgerError> {
        let tip = self.last_index();
        let mut header = template.header.clone();
        header.nonce = nonce;

        if template.index != tip + 1 || header.previous_hash != hash_header(&self.last_block().header)
        {
            warn!(template = template.index, tip, "Discarding stale block template");
            return Err(LedgerError::StaleTemplate {
                template_parent: template.index.saturating_sub(1),
                tip,
            });
        }

        if !valid_proof(&header) {
            return Err(BlockRejection::InvalidProof {
                index: template.index,
            }
            .into());
        }

        let block = Block::new(template.index, header, template.transaction_hashes());

        let included: HashSet<&str> = template
            .pooled()
            .iter()
            .map(|t| t.transaction_hash())
            .collect();
        self.open_transactions
            .retain(|t| !included.contains(t.transaction_hash()));

        self.persist("save mined block", |store| {
            store.save(Namespace::Blocks, &block.block_hash, &encode(&block)?)?;
            for tx in template.pooled() {
                let hash = tx.transaction_hash();
                if !store.move_entry(Namespace::Open, Namespace::Confirmed, hash)? {
                    store.save(Namespace::Confirmed, hash, &encode(tx.signed_transaction())?)?;
                }
            }
            if let Some(reward) = template.reward() {
                store.save(
                    Namespace::Mining,
                    reward.transaction_hash(),
                    &encode(reward.signed_transaction())?,
                )?;
            }
            Ok(())
        });

        for tx in template.transactions {
            self.confirmed.insert(tx.transaction_hash().to_string(), tx);
        }

        info!(
            index = block.index,
            hash = %block.block_hash,
            transactions = block.transaction_count,
            "Block mined"
        );
        self.chain.push(block.clone());

        Ok(block)
    }

    /// Prepare, search and commit in one call
    pub fn mine(
        &mut self,
        reward_address: Option<&str>,
        difficulty: Option<u32>,
        cancel: &AtomicBool,
    ) -> Result<Block, LedgerError> {
        let template = self.prepare_block(reward_address, difficulty)?;
        let header = proof_of_work(template.header.clone(), cancel)?;
        self.commit_block(template, header.nonce)
    }

    // ========================================================================
    // PEER BLOCKS AND CHAINS
    // ========================================================================

    /// Append a block produced elsewhere if it extends the local tip
    pub fn accept_remote_block(&mut self, block: Block) -> Result<(), BlockRejection> {
        let local_last = self.last_index();

        if block.index <= local_last {
            warn!(incoming = block.index, local_last, "Shorter chain, not added");
            return Err(BlockRejection::Stale {
                incoming: block.index,
                local_last,
            });
        }
        if block.index > local_last + 1 {
            warn!(incoming = block.index, local_last, "Incoming block needs resync");
            return Err(BlockRejection::OutOfOrder {
                incoming: block.index,
                local_last,
            });
        }
        if block.block_hash != hash_header(&block.header) {
            return Err(BlockRejection::HashMismatch { index: block.index });
        }
        if !valid_proof(&block.header) {
            return Err(BlockRejection::InvalidProof { index: block.index });
        }
        if block.header.previous_hash != hash_header(&self.last_block().header) {
            return Err(BlockRejection::BrokenLink { index: block.index });
        }

        let (included, remaining): (Vec<_>, Vec<_>) = std::mem::take(&mut self.open_transactions)
            .into_iter()
            .partition(|t| block.contains_transaction(t.transaction_hash()));
        self.open_transactions = remaining;

        self.persist("save received block", |store| {
            store.save(Namespace::Blocks, &block.block_hash, &encode(&block)?)?;
            for tx in &included {
                store.move_entry(Namespace::Open, Namespace::Confirmed, tx.transaction_hash())?;
            }
            Ok(())
        });

        info!(
            index = block.index,
            hash = %block.block_hash,
            reconciled = included.len(),
            "Accepted block from peer"
        );

        for tx in included {
            self.confirmed.insert(tx.transaction_hash().to_string(), tx);
        }
        self.chain.push(block);

        Ok(())
    }

    /// Whether a peer chain of `length` blocks should be fetched and considered.
    /// Longer wins; with only genesis on both sides the peer's chain is taken.
    pub fn should_consider(&self, length: u64) -> bool {
        let local = self.chain.len() as u64;
        length > local || (length == 1 && local == 1)
    }

    /// Swap in a peer chain if it is valid and `should_consider` its length.
    ///
    /// Returns `Ok(false)` when the candidate is not preferred. Pool entries the
    /// new chain already contains are dropped; the rest stay pooled.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> Result<bool, LedgerError> {
        if !self.should_consider(candidate.len() as u64) {
            debug!(
                candidate = candidate.len(),
                local = self.chain.len(),
                "Candidate chain not preferred"
            );
            return Ok(false);
        }

        if let Err(e) = verify_chain(&candidate) {
            warn!(error = %e, "Candidate chain failed validation");
            return Err(e.into());
        }

        let referenced: HashSet<String> = candidate
            .iter()
            .flat_map(|b| b.transactions.iter().cloned())
            .collect();

        let (included, remaining): (Vec<_>, Vec<_>) = std::mem::take(&mut self.open_transactions)
            .into_iter()
            .partition(|t| referenced.contains(t.transaction_hash()));
        self.open_transactions = remaining;

        for tx in &included {
            self.confirmed
                .insert(tx.transaction_hash().to_string(), tx.clone());
        }
        self.confirmed.retain(|hash, _| referenced.contains(hash));

        self.persist("replace stored chain", |store| {
            store.clear(Namespace::Blocks)?;
            for block in &candidate {
                store.save(Namespace::Blocks, &block.block_hash, &encode(block)?)?;
            }
            for tx in &included {
                store.move_entry(Namespace::Open, Namespace::Confirmed, tx.transaction_hash())?;
            }
            Ok(())
        });

        info!(
            old_length = self.chain.len(),
            new_length = candidate.len(),
            dropped_from_pool = included.len(),
            "Replaced chain"
        );
        self.chain = candidate;

        Ok(true)
    }
}

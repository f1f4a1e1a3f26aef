// powledger operator CLI over a sled-backed ledger

use clap::{Parser, Subcommand};
use powledger::identity::{Address, Keypair};
use powledger::ledger::{Blockchain, LedgerConfig};
use powledger::storage::SledStore;
use powledger::sync::{MemoryPeerClient, Node, NodeConfig};
use powledger::transaction::TransactionBuilder;
use powledger::verification::expected_nonce;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "powledger")]
#[command(about = "Single-node proof-of-work ledger")]
#[command(version)]
struct Cli {
    /// Directory holding the ledger database
    #[arg(long, global = true, default_value = "powledger-data")]
    data_dir: PathBuf,

    /// Leading zero hex characters required of mined blocks
    #[arg(long, global = true)]
    difficulty: Option<u32>,

    /// Reward address (defaults to the stored keypair's address)
    #[arg(long, global = true)]
    address: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate and store a signing keypair
    Keygen {
        /// Replace an existing keypair
        #[arg(long)]
        force: bool,
    },

    /// Show the stored keypair's address
    Address,

    /// Mine blocks over the current pool
    Mine {
        /// Number of blocks to mine
        #[arg(short, long, default_value = "1")]
        blocks: u32,
    },

    /// Sign and submit a transfer from the stored keypair
    Send {
        /// Recipient address
        recipient: String,

        /// Amount to transfer
        amount: Decimal,
    },

    /// Show an account's spendable balance
    Balance {
        /// Account (defaults to the stored keypair's address)
        account: Option<String>,
    },

    /// Print the chain as block hashes
    Chain,

    /// Print one block as hex
    Block { hash: String },

    /// Print one transaction as hex
    Transaction { hash: String },

    /// List open transactions
    Pool,

    /// Validate linkage and proof of work of the stored chain
    Verify,
}

fn wallet_address(keypair: &Keypair) -> String {
    Address::from_public_key(&keypair.public_key()).into()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    let store = Arc::new(SledStore::open(&cli.data_dir)?);

    if let Commands::Keygen { force } = cli.command {
        if !force && store.load_keypair()?.is_some() {
            return Err("a keypair already exists, pass --force to replace it".into());
        }
        let keypair = Keypair::generate();
        store.save_keypair(&keypair)?;
        store.flush()?;
        println!("{}", wallet_address(&keypair));
        return Ok(());
    }

    let keypair = store.load_keypair()?;

    let mut config = LedgerConfig::new();
    if let Some(difficulty) = cli.difficulty {
        config = config.with_difficulty(difficulty);
    }
    if let Some(address) = cli.address.clone().or_else(|| keypair.as_ref().map(wallet_address)) {
        config = config.with_address(address);
    }

    let ledger = Blockchain::with_store(config, store.clone())?;
    let node = Node::new(
        ledger,
        Arc::new(MemoryPeerClient::new()),
        NodeConfig::new().with_broadcast(false),
    )?;
    let shared = node.ledger();

    match cli.command {
        Commands::Keygen { .. } => {}

        Commands::Address => match &keypair {
            Some(keypair) => println!("{}", wallet_address(keypair)),
            None => return Err("no keypair stored, run `powledger keygen`".into()),
        },

        Commands::Mine { blocks } => {
            let cancel = Arc::new(AtomicBool::new(false));
            let flag = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling mining");
                    flag.store(true, Ordering::Relaxed);
                }
            });

            for _ in 0..blocks {
                let block = node.mine(None, None, cancel.clone()).await?;
                println!("{} {}", block.index, block.block_hash);
            }
        }

        Commands::Send { recipient, amount } => {
            let keypair = keypair.ok_or("no keypair stored, run `powledger keygen`")?;
            let sender = wallet_address(&keypair);
            let nonce = expected_nonce(shared.lock().await.last_nonce(&sender));

            let transaction = TransactionBuilder::new()
                .sender(&keypair)
                .recipient(recipient)
                .amount(amount)
                .nonce(nonce)
                .build()?;

            let hash = transaction.hash();
            let index = node.submit_transaction(transaction).await?;
            info!(hash = %hash, index, "Transaction submitted");
            println!("Transaction {} will be added to block {}", hash, index);
        }

        Commands::Balance { account } => {
            let account = account
                .or_else(|| keypair.as_ref().map(wallet_address))
                .ok_or("no account given and no keypair stored")?;
            println!("{}", shared.lock().await.balance(&account));
        }

        Commands::Chain => {
            let ledger = shared.lock().await;
            for (index, hash) in ledger.pretty_chain().iter().enumerate() {
                println!("{} {}", index, hash);
            }
        }

        Commands::Block { hash } => {
            let ledger = shared.lock().await;
            let block = ledger.block_by_hash(&hash).ok_or("block not found")?;
            println!("{}", block.to_hex()?);
        }

        Commands::Transaction { hash } => {
            let ledger = shared.lock().await;
            let transaction = ledger
                .transaction_by_hash(&hash)
                .ok_or("transaction not found")?;
            println!("{}", transaction.signed_transaction().to_hex()?);
        }

        Commands::Pool => {
            let ledger = shared.lock().await;
            for tx in ledger.open_transactions() {
                let details = tx.details();
                println!(
                    "{} {} -> {} {} (nonce {})",
                    tx.transaction_hash(),
                    details.sender(),
                    details.recipient(),
                    details.amount(),
                    details.nonce()
                );
            }
        }

        Commands::Verify => {
            let ledger = shared.lock().await;
            ledger.verify()?;
            println!("chain of {} blocks is valid", ledger.len());
        }
    }

    store.flush()?;
    Ok(())
}

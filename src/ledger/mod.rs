// Ledger module - THE CHAIN STATE MACHINE
// Transaction submission, mining, remote block acceptance and chain replacement

mod config;
mod error;
mod state;

pub use config::{LedgerConfig, MAX_DIFFICULTY, MINING_REWARD};
pub use error::{BlockRejection, LedgerError};
pub use state::{BlockTemplate, Blockchain, ChainSummary};

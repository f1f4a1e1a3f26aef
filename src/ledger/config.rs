use crate::ledger::LedgerError;
use rust_decimal::Decimal;

/// Coins credited to the producer of each mined block
pub const MINING_REWARD: Decimal = Decimal::TEN;

/// Hex characters in a SHA-256 digest; no difficulty above this can be met
pub const MAX_DIFFICULTY: u32 = 64;

/// Configuration for a ledger instance
#[derive(Clone, Debug)]
pub struct LedgerConfig {
    /// Reward recipient used when `mine` is called without one
    pub address: Option<String>,
    /// Leading '0' hex characters required of newly mined headers
    pub difficulty: u32,
    /// Header schema version
    pub version: u32,
    /// Amount of each block reward
    pub mining_reward: Decimal,
    /// Genesis timestamp in unix milliseconds (defaults to 0 so every node agrees on genesis)
    pub genesis_timestamp: Option<u64>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            address: None,
            difficulty: 4,
            version: 1,
            mining_reward: MINING_REWARD,
            genesis_timestamp: None,
        }
    }
}

impl LedgerConfig {
    /// Create a new config builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default reward address
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Set the mining difficulty
    pub fn with_difficulty(mut self, difficulty: u32) -> Self {
        self.difficulty = difficulty;
        self
    }

    /// Set the header version
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Set the block reward
    pub fn with_mining_reward(mut self, reward: Decimal) -> Self {
        self.mining_reward = reward;
        self
    }

    /// Pin the genesis timestamp
    pub fn with_genesis_timestamp(mut self, timestamp: u64) -> Self {
        self.genesis_timestamp = Some(timestamp);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::InvalidConfig(format!(
                "difficulty must be <= {}",
                MAX_DIFFICULTY
            )));
        }
        if self.mining_reward.is_sign_negative() && !self.mining_reward.is_zero() {
            return Err(LedgerError::InvalidConfig(
                "mining_reward must not be negative".to_string(),
            ));
        }
        if matches!(&self.address, Some(address) if address.trim().is_empty()) {
            return Err(LedgerError::InvalidConfig(
                "address must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

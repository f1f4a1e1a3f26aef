use crate::storage::StoreError;
use std::fmt;

/// Partitions of the persisted ledger layout
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Namespace {
    /// Blocks keyed by block hash
    Blocks,
    /// Admitted, not yet mined transactions
    Open,
    /// Transactions included in a block
    Confirmed,
    /// Reward transactions produced by this node
    Mining,
}

impl Namespace {
    pub const ALL: [Namespace; 4] = [
        Namespace::Blocks,
        Namespace::Open,
        Namespace::Confirmed,
        Namespace::Mining,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Blocks => "blocks",
            Namespace::Open => "open",
            Namespace::Confirmed => "confirmed",
            Namespace::Mining => "mining",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key-value blob persistence consumed by the ledger.
///
/// Keys are content hashes; values are opaque encoded bytes.
pub trait BlobStore: Send + Sync {
    /// Insert or overwrite an entry
    fn save(&self, namespace: Namespace, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Read one entry
    fn read(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// All entries in a namespace, in key order
    fn list(&self, namespace: Namespace) -> Result<Vec<(String, Vec<u8>)>, StoreError>;

    /// Delete one entry, returning whether it existed
    fn remove(&self, namespace: Namespace, key: &str) -> Result<bool, StoreError>;

    /// Move an entry between namespaces. Returns false when the source is missing.
    fn move_entry(&self, from: Namespace, to: Namespace, key: &str) -> Result<bool, StoreError> {
        match self.read(from, key)? {
            Some(value) => {
                self.save(to, key, &value)?;
                self.remove(from, key)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drop every entry in a namespace
    fn clear(&self, namespace: Namespace) -> Result<usize, StoreError> {
        let entries = self.list(namespace)?;
        for (key, _) in &entries {
            self.remove(namespace, key)?;
        }
        Ok(entries.len())
    }
}

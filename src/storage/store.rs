// SledStore - Persistent blob storage using sled
//
// Provides:
// - Namespaced ledger blobs (blocks, open, confirmed, mining)
// - The operator's signing keypair

use crate::identity::Keypair;
use crate::storage::{BlobStore, Namespace};
use sled::transaction::TransactionError;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Key prefixes for organizing data
mod keys {
    pub const IDENTITY_KEYPAIR: &[u8] = b"identity:keypair";

    pub fn namespaced(namespace: &str, key: &str) -> Vec<u8> {
        [namespace.as_bytes(), b":", key.as_bytes()].concat()
    }

    pub fn prefix(namespace: &str) -> Vec<u8> {
        [namespace.as_bytes(), b":"].concat()
    }
}

/// Errors from storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open database: {0}")]
    OpenFailed(String),

    #[error("Database operation failed: {0}")]
    DatabaseError(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("Flush failed: {0}")]
    FlushFailed(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::DatabaseError(err.to_string())
    }
}

/// Persistent blob store backed by one sled tree.
///
/// Namespaces are key prefixes (`blocks:<hash>`).
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::OpenFailed(e.to_string()))?;
        Ok(Self { db })
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.db.is_empty())
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::FlushFailed(e.to_string()))?;
        Ok(())
    }

    /// Save the operator keypair
    pub fn save_keypair(&self, keypair: &Keypair) -> Result<(), StoreError> {
        self.db.insert(keys::IDENTITY_KEYPAIR, keypair.to_bytes())?;
        Ok(())
    }

    /// Load the operator keypair
    pub fn load_keypair(&self) -> Result<Option<Keypair>, StoreError> {
        match self.db.get(keys::IDENTITY_KEYPAIR)? {
            Some(bytes) => {
                let keypair = Keypair::from_bytes(&bytes)
                    .map_err(|e| StoreError::DeserializationFailed(e.to_string()))?;
                Ok(Some(keypair))
            }
            None => Ok(None),
        }
    }
}

impl BlobStore for SledStore {
    fn save(&self, namespace: Namespace, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.db
            .insert(keys::namespaced(namespace.as_str(), key), value)?;
        Ok(())
    }

    fn read(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .db
            .get(keys::namespaced(namespace.as_str(), key))?
            .map(|v| v.to_vec()))
    }

    fn list(&self, namespace: Namespace) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let prefix = keys::prefix(namespace.as_str());
        let mut entries = Vec::new();
        for result in self.db.scan_prefix(&prefix) {
            let (key, value) = result?;
            let key = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
            entries.push((key, value.to_vec()));
        }
        Ok(entries)
    }

    fn remove(&self, namespace: Namespace, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .db
            .remove(keys::namespaced(namespace.as_str(), key))?
            .is_some())
    }

    fn move_entry(&self, from: Namespace, to: Namespace, key: &str) -> Result<bool, StoreError> {
        let from_key = keys::namespaced(from.as_str(), key);
        let to_key = keys::namespaced(to.as_str(), key);

        let moved: Result<bool, TransactionError<()>> = self.db.transaction(|tx| {
            match tx.get(from_key.as_slice())? {
                Some(value) => {
                    tx.insert(to_key.as_slice(), value)?;
                    tx.remove(from_key.as_slice())?;
                    Ok(true)
                }
                None => Ok(false),
            }
        });

        let moved = moved.map_err(|e| StoreError::DatabaseError(format!("{:?}", e)))?;
        debug!(key, %from, %to, moved, "Moved blob");
        Ok(moved)
    }
}

use crate::storage::{BlobStore, Namespace, StoreError};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Volatile blob store for tests and ephemeral nodes
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<(Namespace, String), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries across all namespaces
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StoreError {
    StoreError::DatabaseError("memory store lock poisoned".to_string())
}

impl BlobStore for MemoryStore {
    fn save(&self, namespace: Namespace, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.entries
            .write()
            .map_err(|_| poisoned())?
            .insert((namespace, key.to_string()), value.to_vec());
        Ok(())
    }

    fn read(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .entries
            .read()
            .map_err(|_| poisoned())?
            .get(&(namespace, key.to_string()))
            .cloned())
    }

    fn list(&self, namespace: Namespace) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        Ok(self
            .entries
            .read()
            .map_err(|_| poisoned())?
            .iter()
            .filter(|((ns, _), _)| *ns == namespace)
            .map(|((_, key), value)| (key.clone(), value.clone()))
            .collect())
    }

    fn remove(&self, namespace: Namespace, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .entries
            .write()
            .map_err(|_| poisoned())?
            .remove(&(namespace, key.to_string()))
            .is_some())
    }

    fn move_entry(&self, from: Namespace, to: Namespace, key: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        match entries.remove(&(from, key.to_string())) {
            Some(value) => {
                entries.insert((to, key.to_string()), value);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// Storage module - PERSISTENCE
// Namespaced blob storage for blocks and transactions, sled on disk or in memory

mod blob;
mod memory;
mod store;

pub use blob::{BlobStore, Namespace};
pub use memory::MemoryStore;
pub use store::{SledStore, StoreError};

// Sync module - HOW NODES TALK
// Handles the peer set, outbound peer calls, and the locked node wrapper

mod client;
mod node;
mod peer;

pub use client::{MemoryPeerClient, PeerClient};
pub use node::{Node, NodeConfig, SharedLedger};
pub use peer::{normalize_uri, PeerError, PeerRegistry};

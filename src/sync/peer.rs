// Peer Management - Track the node URIs this ledger talks to
//
// URIs are normalized to scheme://host[:port]/path on registration and kept in
// sorted order so every walk over the peer set is deterministic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::debug;
use url::{ParseError, Url};

/// Peer-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    #[error("Invalid peer uri: {0}: must provide scheme (http/https) in node uri")]
    MissingScheme(String),

    #[error("Invalid peer uri: {0}: missing host")]
    MissingHost(String),

    #[error("Invalid peer uri: {uri}: {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("Peer unavailable: {uri}: {reason}")]
    Unavailable { uri: String, reason: String },

    #[error("Peer {uri} has no {what}")]
    NotFound { uri: String, what: String },

    #[error("Peer {uri} rejected the message: {reason}")]
    Rejected { uri: String, reason: String },

    #[error("Peer timed out: {0}")]
    Timeout(String),

    #[error("Peer returned malformed data: {uri}: {reason}")]
    Malformed { uri: String, reason: String },
}

/// Reduce a node address to `scheme://host[:port]/path`, dropping credentials,
/// query and fragment. Only http and https nodes are accepted.
pub fn normalize_uri(address: &str) -> Result<String, PeerError> {
    let address = address.trim();
    let url = match Url::parse(address) {
        Ok(url) => url,
        Err(ParseError::RelativeUrlWithoutBase) => {
            return Err(PeerError::MissingScheme(address.to_string()))
        }
        Err(ParseError::EmptyHost) => return Err(PeerError::MissingHost(address.to_string())),
        Err(e) => {
            return Err(PeerError::InvalidUri {
                uri: address.to_string(),
                reason: e.to_string(),
            })
        }
    };

    if !matches!(url.scheme(), "http" | "https") {
        return Err(PeerError::MissingScheme(address.to_string()));
    }
    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| PeerError::MissingHost(address.to_string()))?;

    let mut uri = format!("{}://{}", url.scheme(), host);
    if let Some(port) = url.port() {
        uri.push_str(&format!(":{}", port));
    }
    if url.path() != "/" {
        uri.push_str(url.path());
    }
    Ok(uri)
}

/// Registry of known peer URIs
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PeerRegistry {
    peers: BTreeSet<String>,
}

impl PeerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Number of known peers
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Register a peer; returns the normalized URI and whether it was new
    pub fn register(&mut self, address: &str) -> Result<(String, bool), PeerError> {
        let uri = normalize_uri(address)?;
        let inserted = self.peers.insert(uri.clone());
        debug!(uri = %uri, inserted, "Registered node");
        Ok((uri, inserted))
    }

    /// Forget a peer by its normalized URI
    pub fn remove(&mut self, uri: &str) -> bool {
        self.peers.remove(uri)
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.peers.contains(uri)
    }

    /// Peers in sorted URI order
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.peers.iter()
    }

    /// Owned snapshot of all peers, sorted
    pub fn uris(&self) -> Vec<String> {
        self.peers.iter().cloned().collect()
    }
}

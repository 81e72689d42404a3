//! Discovery collaborator contract
//!
//! The core performs no discovery. Whatever enumerates paired or known
//! devices implements [`PeerDirectory`] and the consumer picks one entry.

use crate::errors::{ChatError, ChatResult};
use crate::types::PeerIdentity;

/// Source of already-paired or otherwise known peers
pub trait PeerDirectory: Send + Sync {
    fn known_peers(&self) -> Vec<PeerIdentity>;
}

/// Fixed list of peers, typically loaded from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    peers: Vec<PeerIdentity>,
}

impl StaticDirectory {
    pub fn new(peers: Vec<PeerIdentity>) -> Self {
        Self { peers }
    }
}

impl PeerDirectory for StaticDirectory {
    fn known_peers(&self) -> Vec<PeerIdentity> {
        self.peers.clone()
    }
}

/// Pick a peer by zero-based index, label or address.
pub fn select_peer(directory: &dyn PeerDirectory, selector: &str) -> ChatResult<PeerIdentity> {
    let peers = directory.known_peers();
    if peers.is_empty() {
        return Err(ChatError::NoPeersAvailable);
    }

    let selector = selector.trim();
    if let Ok(index) = selector.parse::<usize>() {
        if let Some(peer) = peers.get(index) {
            return Ok(peer.clone());
        }
    }

    peers
        .into_iter()
        .find(|peer| peer.label() == selector || peer.address().eq_ignore_ascii_case(selector))
        .ok_or_else(|| ChatError::UnknownPeer {
            selector: selector.to_string(),
        })
}

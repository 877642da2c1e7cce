use libp2p::PeerId;
use std::collections::HashMap;

/// Information about a connected peer.
pub struct PeerInfo {
    /// The libp2p peer ID.
    pub peer_id: PeerId,
    /// When this peer connected.
    pub connected_at: std::time::Instant,
    /// Agent string reported over identify.
    pub agent_version: Option<String>,
}

/// Tracks connected peers against a connection limit.
pub struct PeerManager {
    peers: HashMap<PeerId, PeerInfo>,
    max_connections: usize,
}

impl PeerManager {
    /// Create a new PeerManager with a maximum connection limit.
    pub fn new(max_connections: usize) -> Self {
        Self {
            peers: HashMap::new(),
            max_connections,
        }
    }

    /// Add a peer. Returns false if the connection limit is reached.
    /// Adding an already connected peer always succeeds.
    pub fn add_peer(&mut self, peer_id: PeerId) -> bool {
        if self.peers.contains_key(&peer_id) {
            return true;
        }
        if self.peers.len() >= self.max_connections {
            return false;
        }
        self.peers.insert(
            peer_id,
            PeerInfo {
                peer_id,
                connected_at: std::time::Instant::now(),
                agent_version: None,
            },
        );
        true
    }

    /// Remove a peer.
    pub fn remove_peer(&mut self, peer_id: &PeerId) -> Option<PeerInfo> {
        self.peers.remove(peer_id)
    }

    /// Number of currently connected peers.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Iterator over the peer IDs of all connected peers.
    pub fn connected_peers(&self) -> impl Iterator<Item = &PeerId> {
        self.peers.keys()
    }

    pub fn is_connected(&self, peer_id: &PeerId) -> bool {
        self.peers.contains_key(peer_id)
    }

    /// Set the agent string for a peer (usually from identify).
    pub fn set_agent_version(&mut self, peer_id: &PeerId, agent: String) {
        if let Some(info) = self.peers.get_mut(peer_id) {
            info.agent_version = Some(agent);
        }
    }
}

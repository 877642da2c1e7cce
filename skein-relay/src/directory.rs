use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use libp2p::{Multiaddr, PeerId};
use skein_types::constants::{DISCOVERED_ADDR_TTL, RECENTLY_CONNECTED_ADDR_TTL, TEMP_ADDR_TTL};
use tokio::time::Instant;

use crate::addr_info::{strip_p2p, PeerAddrInfo};

/// How long an address stays in the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrTtl {
    /// Never expires (bootstrap peers, explicitly seeded addresses).
    Permanent,
    /// Expires after the given duration.
    For(Duration),
}

impl AddrTtl {
    pub const PERMANENT: AddrTtl = AddrTtl::Permanent;
    pub const TEMP: AddrTtl = AddrTtl::For(TEMP_ADDR_TTL);
    pub const RECENTLY_CONNECTED: AddrTtl = AddrTtl::For(RECENTLY_CONNECTED_ADDR_TTL);
    pub const DISCOVERED: AddrTtl = AddrTtl::For(DISCOVERED_ADDR_TTL);

    fn expiry(self, now: Instant) -> Expiry {
        match self {
            AddrTtl::Permanent => Expiry::Never,
            AddrTtl::For(ttl) => Expiry::At(now + ttl),
        }
    }
}

// Variant order matters: `Never` sorts after every deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Expiry {
    At(Instant),
    Never,
}

impl Expiry {
    fn is_live(self, now: Instant) -> bool {
        match self {
            Expiry::Never => true,
            Expiry::At(deadline) => deadline > now,
        }
    }
}

/// Known dialable addresses per peer, each with its own expiry.
///
/// Shared between the swarm task, discovery and callers; all methods take `&self`.
#[derive(Debug, Default)]
pub struct PeerDirectory {
    entries: RwLock<HashMap<PeerId, BTreeMap<Multiaddr, Expiry>>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record addresses for a peer. Re-adding an address keeps the later expiry.
    pub fn add_addresses<I>(&self, peer: PeerId, addrs: I, ttl: AddrTtl)
    where
        I: IntoIterator<Item = Multiaddr>,
    {
        let expiry = ttl.expiry(Instant::now());
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let known = entries.entry(peer).or_default();
        for addr in addrs {
            let addr = strip_p2p(&addr);
            if addr.is_empty() {
                continue;
            }
            let slot = known.entry(addr).or_insert(expiry);
            if expiry > *slot {
                *slot = expiry;
            }
        }
        if known.is_empty() {
            entries.remove(&peer);
        }
    }

    /// Record every address of `info`.
    pub fn add_info(&self, info: &PeerAddrInfo, ttl: AddrTtl) {
        self.add_addresses(info.peer_id, info.addrs.iter().cloned(), ttl);
    }

    /// Live addresses for a peer. `None` if the peer has none left.
    pub fn lookup(&self, peer: &PeerId) -> Option<Vec<Multiaddr>> {
        let now = Instant::now();
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let live: Vec<Multiaddr> = entries
            .get(peer)?
            .iter()
            .filter(|(_, expiry)| expiry.is_live(now))
            .map(|(addr, _)| addr.clone())
            .collect();
        if live.is_empty() {
            None
        } else {
            Some(live)
        }
    }

    /// Live addresses for a peer as a [`PeerAddrInfo`].
    pub fn addr_info(&self, peer: &PeerId) -> Option<PeerAddrInfo> {
        self.lookup(peer)
            .map(|addrs| PeerAddrInfo::new(*peer, addrs))
    }

    /// Remove a single address for a peer.
    pub fn remove_address(&self, peer: &PeerId, addr: &Multiaddr) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(known) = entries.get_mut(peer) {
            known.remove(&strip_p2p(addr));
            if known.is_empty() {
                entries.remove(peer);
            }
        }
    }

    /// Drop expired addresses, and peers left without any. Returns the
    /// number of addresses removed.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = 0;
        entries.retain(|_, known| {
            let before = known.len();
            known.retain(|_, expiry| expiry.is_live(now));
            removed += before - known.len();
            !known.is_empty()
        });
        removed
    }

    /// Peers with at least one stored address (live or not yet pruned).
    pub fn peers(&self) -> Vec<PeerId> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

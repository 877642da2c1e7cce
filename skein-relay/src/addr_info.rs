use std::fmt;
use std::str::FromStr;

use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId};

use crate::error::AddrError;

/// A peer identity together with the transport addresses it can be dialed on.
///
/// Addresses are stored without a trailing `/p2p/<peer-id>` component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddrInfo {
    pub peer_id: PeerId,
    pub addrs: Vec<Multiaddr>,
}

impl PeerAddrInfo {
    pub fn new(peer_id: PeerId, addrs: Vec<Multiaddr>) -> Self {
        Self {
            peer_id,
            addrs: addrs.iter().map(strip_p2p).collect(),
        }
    }

    /// Split a full `/.../p2p/<peer-id>` address into identity and transport address.
    pub fn from_p2p_addr(addr: &Multiaddr) -> Result<Self, AddrError> {
        match addr.iter().last() {
            Some(Protocol::P2p(peer_id)) => Ok(Self::new(peer_id, vec![addr.clone()])),
            _ => Err(AddrError::MissingPeerId {
                addr: addr.to_string(),
            }),
        }
    }

    /// The addresses with the peer id appended, as accepted by a dialer.
    pub fn p2p_addrs(&self) -> Vec<Multiaddr> {
        self.addrs
            .iter()
            .map(|a| a.clone().with(Protocol::P2p(self.peer_id)))
            .collect()
    }
}

impl FromStr for PeerAddrInfo {
    type Err = AddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr: Multiaddr = s.trim().parse().map_err(|e| AddrError::Parse {
            addr: s.to_string(),
            reason: format!("{}", e),
        })?;
        Self::from_p2p_addr(&addr)
    }
}

impl fmt::Display for PeerAddrInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: [", self.peer_id)?;
        for (i, addr) in self.addrs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", addr)?;
        }
        write!(f, "]")
    }
}

/// Drop a trailing `/p2p/<peer-id>` component, if present.
pub(crate) fn strip_p2p(addr: &Multiaddr) -> Multiaddr {
    let mut addr = addr.clone();
    if let Some(Protocol::P2p(_)) = addr.iter().last() {
        addr.pop();
    }
    addr
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_address() {
        let peer = PeerId::random();
        let s = format!("/ip4/127.0.0.1/tcp/7004/p2p/{}", peer);
        let info: PeerAddrInfo = s.parse().unwrap();
        assert_eq!(info.peer_id, peer);
        assert_eq!(info.addrs.len(), 1);
        assert_eq!(info.addrs[0].to_string(), "/ip4/127.0.0.1/tcp/7004");
    }

    #[test]
    fn test_missing_peer_id() {
        let err = "/ip4/127.0.0.1/tcp/7004"
            .parse::<PeerAddrInfo>()
            .unwrap_err();
        assert!(matches!(err, AddrError::MissingPeerId { .. }));
    }

    #[test]
    fn test_garbage_rejected() {
        let err = "not-a-multiaddr".parse::<PeerAddrInfo>().unwrap_err();
        assert!(matches!(err, AddrError::Parse { .. }));
    }

    #[test]
    fn test_p2p_addrs_append_peer_id() {
        let peer = PeerId::random();
        let info = PeerAddrInfo::new(peer, vec!["/ip4/10.0.0.1/tcp/1".parse().unwrap()]);
        let full = info.p2p_addrs();
        assert_eq!(full[0].to_string(), format!("/ip4/10.0.0.1/tcp/1/p2p/{}", peer));
        let back = PeerAddrInfo::from_p2p_addr(&full[0]).unwrap();
        assert_eq!(back, info);
    }

    #[test]
    fn test_new_strips_suffix() {
        let peer = PeerId::random();
        let full: Multiaddr = format!("/ip4/10.0.0.1/tcp/1/p2p/{}", peer).parse().unwrap();
        let info = PeerAddrInfo::new(peer, vec![full]);
        assert_eq!(info.addrs[0].to_string(), "/ip4/10.0.0.1/tcp/1");
    }
}

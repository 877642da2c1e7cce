use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use libp2p::PeerId;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::addr_info::PeerAddrInfo;
use crate::directory::{AddrTtl, PeerDirectory};
use crate::error::DiscoveryError;

/// Something that can resolve a peer id to addresses through the DHT.
#[async_trait]
pub trait DhtClient: Send + Sync {
    async fn find_peer(&self, peer: PeerId) -> Result<PeerAddrInfo, DiscoveryError>;
}

/// Resolves peers, preferring the local directory over a DHT query.
pub struct Discovery {
    directory: Arc<PeerDirectory>,
    boot_nodes: Vec<PeerAddrInfo>,
}

impl Discovery {
    /// Create a new Discovery from a list of `/.../p2p/<id>` strings.
    /// Invalid entries are logged and skipped.
    pub fn new(directory: Arc<PeerDirectory>, boot_nodes: &[String]) -> Self {
        let boot_nodes = boot_nodes
            .iter()
            .filter_map(|s| {
                s.parse::<PeerAddrInfo>()
                    .map_err(|e| {
                        warn!("Invalid boot node '{}': {}", s, e);
                        e
                    })
                    .ok()
            })
            .collect();

        Self {
            directory,
            boot_nodes,
        }
    }

    /// The parsed bootstrap peers.
    pub fn boot_nodes(&self) -> &[PeerAddrInfo] {
        &self.boot_nodes
    }

    pub fn directory(&self) -> &Arc<PeerDirectory> {
        &self.directory
    }

    /// Resolve `peer` to dialable addresses.
    ///
    /// A directory hit returns immediately without touching the DHT. Otherwise
    /// the DHT is queried under `timeout` and `ctx`; a successful answer is
    /// written back to the directory with the discovered TTL.
    pub async fn find_peer<D>(
        &self,
        ctx: &CancellationToken,
        dht: &D,
        peer: PeerId,
        timeout: Duration,
    ) -> Result<PeerAddrInfo, DiscoveryError>
    where
        D: DhtClient + ?Sized,
    {
        if let Some(info) = self.directory.addr_info(&peer) {
            debug!(%peer, addrs = info.addrs.len(), "peer resolved from directory");
            return Ok(info);
        }

        let info = tokio::select! {
            _ = ctx.cancelled() => return Err(DiscoveryError::Cancelled),
            res = tokio::time::timeout(timeout, dht.find_peer(peer)) => match res {
                Ok(found) => found?,
                Err(_) => return Err(DiscoveryError::Timeout { peer, timeout }),
            },
        };

        if info.addrs.is_empty() {
            return Err(DiscoveryError::PeerNotFound { peer });
        }

        debug!(%peer, addrs = info.addrs.len(), "peer resolved through DHT");
        self.directory.add_info(&info, AddrTtl::DISCOVERED);
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libp2p::Multiaddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn addr(port: u16) -> Multiaddr {
        format!("/ip4/127.0.0.1/tcp/{}", port).parse().unwrap()
    }

    /// Answers every query with a fixed address and counts calls.
    struct FixedDht {
        addr: Multiaddr,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DhtClient for FixedDht {
        async fn find_peer(&self, peer: PeerId) -> Result<PeerAddrInfo, DiscoveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PeerAddrInfo::new(peer, vec![self.addr.clone()]))
        }
    }

    /// Never answers.
    struct StalledDht;

    #[async_trait]
    impl DhtClient for StalledDht {
        async fn find_peer(&self, _peer: PeerId) -> Result<PeerAddrInfo, DiscoveryError> {
            std::future::pending().await
        }
    }

    /// Answers with no addresses.
    struct EmptyDht;

    #[async_trait]
    impl DhtClient for EmptyDht {
        async fn find_peer(&self, peer: PeerId) -> Result<PeerAddrInfo, DiscoveryError> {
            Ok(PeerAddrInfo::new(peer, vec![]))
        }
    }

    fn discovery() -> Discovery {
        Discovery::new(Arc::new(PeerDirectory::new()), &[])
    }

    #[test]
    fn test_parse_boot_nodes() {
        let peer = PeerId::random();
        let nodes = vec![
            format!("/ip4/127.0.0.1/tcp/7001/p2p/{}", peer),
            "not-a-multiaddr".to_string(),
            "/ip4/127.0.0.1/tcp/7001".to_string(),
        ];
        let disc = Discovery::new(Arc::new(PeerDirectory::new()), &nodes);
        assert_eq!(disc.boot_nodes().len(), 1);
        assert_eq!(disc.boot_nodes()[0].peer_id, peer);
    }

    #[test]
    fn test_empty() {
        assert!(discovery().boot_nodes().is_empty());
    }

    #[tokio::test]
    async fn test_directory_hit_skips_dht() {
        let disc = discovery();
        let peer = PeerId::random();
        disc.directory()
            .add_addresses(peer, vec![addr(1)], AddrTtl::PERMANENT);
        let dht = FixedDht {
            addr: addr(2),
            calls: AtomicUsize::new(0),
        };
        let info = disc
            .find_peer(&CancellationToken::new(), &dht, peer, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(info.addrs, vec![addr(1)]);
        assert_eq!(dht.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dht_result_written_back() {
        let disc = discovery();
        let peer = PeerId::random();
        let dht = FixedDht {
            addr: addr(3),
            calls: AtomicUsize::new(0),
        };
        let ctx = CancellationToken::new();
        let info = disc
            .find_peer(&ctx, &dht, peer, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(info.addrs, vec![addr(3)]);
        assert_eq!(disc.directory().lookup(&peer), Some(vec![addr(3)]));

        // Second lookup is served from the directory.
        disc.find_peer(&ctx, &dht, peer, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(dht.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let disc = discovery();
        let peer = PeerId::random();
        let err = disc
            .find_peer(
                &CancellationToken::new(),
                &StalledDht,
                peer,
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DiscoveryError::Timeout {
                peer,
                timeout: Duration::from_secs(5)
            }
        );
    }

    #[tokio::test]
    async fn test_cancelled() {
        let disc = discovery();
        let ctx = CancellationToken::new();
        let trigger = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let err = disc
            .find_peer(&ctx, &StalledDht, PeerId::random(), Duration::from_secs(60))
            .await
            .unwrap_err();
        assert_eq!(err, DiscoveryError::Cancelled);
    }

    #[tokio::test]
    async fn test_empty_answer_is_not_found() {
        let disc = discovery();
        let peer = PeerId::random();
        let err = disc
            .find_peer(&CancellationToken::new(), &EmptyDht, peer, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, DiscoveryError::PeerNotFound { peer });
        assert!(disc.directory().lookup(&peer).is_none());
    }
}

//! P2P node service for the Skein network.
//!
//! Built on libp2p with request-response for direct messages, Kademlia for
//! peer discovery and identify for address exchange. A [`NodeService`] owns
//! one identity and listener, a [`PeerDirectory`] of known addresses and a
//! [`Discovery`] client that falls back to the DHT.

pub mod addr_info;
pub mod behaviour;
pub mod codec;
mod command;
pub mod config;
pub mod directory;
pub mod discovery;
mod dispatch;
pub mod error;
mod event_loop;
pub mod peer_manager;
pub mod protocol;
pub mod service;

pub use addr_info::PeerAddrInfo;
pub use config::NetworkConfig;
pub use directory::{AddrTtl, PeerDirectory};
pub use discovery::{DhtClient, Discovery};
pub use error::{
    AddrError, ConnectError, ConstructionError, DiscoveryError, SendError, StartError,
};
pub use service::{NodeService, ServiceState};

pub use libp2p::{Multiaddr, PeerId};
pub use tokio_util::sync::CancellationToken;

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use libp2p::multiaddr::Protocol;
use libp2p::Multiaddr;
use skein_types::constants::{
    DEFAULT_BOOT_NODES, DEFAULT_DISCOVERY_TIMEOUT, DEFAULT_IDLE_CONNECTION_TIMEOUT, DEFAULT_PORT,
    DEFAULT_PROTOCOL_ID, MAX_PEER_CONNECTIONS,
};

/// Configuration for a node service.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Interface to listen on.
    pub listen_host: IpAddr,
    /// TCP port to bind. `0` lets the OS choose.
    pub listen_port: u16,
    /// Skip dialing the bootstrap peers at start.
    pub no_bootstrap: bool,
    /// Bootstrap peers as `/.../p2p/<peer-id>` multiaddr strings.
    pub boot_nodes: Vec<String>,
    /// Maximum number of connected peers.
    pub max_connections: usize,
    /// Stream protocol used for direct messages.
    pub protocol_id: String,
    /// Optional keypair seed (32 bytes). If None, generates random.
    pub key_seed: Option<[u8; 32]>,
    /// Time budget for the DHT lookup `send` falls back to.
    pub discovery_timeout: Duration,
    /// How long a connection without open streams is kept.
    pub idle_connection_timeout: Duration,
}

impl NetworkConfig {
    /// The multiaddr the transport binds to.
    pub fn listen_multiaddr(&self) -> Multiaddr {
        Multiaddr::from(self.listen_host).with(Protocol::Tcp(self.listen_port))
    }

    /// Loopback config with bootstrap disabled, for local nodes.
    pub fn local(port: u16) -> Self {
        Self {
            listen_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            listen_port: port,
            no_bootstrap: true,
            ..Self::default()
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            listen_port: DEFAULT_PORT,
            no_bootstrap: false,
            boot_nodes: DEFAULT_BOOT_NODES.iter().map(|s| s.to_string()).collect(),
            max_connections: MAX_PEER_CONNECTIONS,
            protocol_id: DEFAULT_PROTOCOL_ID.to_string(),
            key_seed: None,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            idle_connection_timeout: DEFAULT_IDLE_CONNECTION_TIMEOUT,
        }
    }
}

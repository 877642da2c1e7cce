use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use skein_types::constants::{
    DEFAULT_BOOT_NODES, DEFAULT_DISCOVERY_TIMEOUT, DEFAULT_IDLE_CONNECTION_TIMEOUT, DEFAULT_PORT,
    DEFAULT_PROTOCOL_ID, MAX_PEER_CONNECTIONS,
};

use crate::error::NodeError;

/// File name written by `skein init`.
pub const CONFIG_FILE_NAME: &str = "skein.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub network: NetworkSettings,
    pub logging: LoggingConfig,
}

/// The `[network]` section of `skein.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    pub listen_host: IpAddr,
    pub listen_port: u16,
    #[serde(default)]
    pub no_bootstrap: bool,
    #[serde(default)]
    pub boot_nodes: Vec<String>,
    pub max_connections: usize,
    pub protocol_id: String,
    /// Hex-encoded 32-byte seed for a deterministic peer identity.
    #[serde(default)]
    pub key_seed: Option<String>,
    pub discovery_timeout_secs: u64,
    pub idle_connection_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: NetworkSettings {
                listen_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                listen_port: DEFAULT_PORT,
                no_bootstrap: false,
                boot_nodes: DEFAULT_BOOT_NODES.iter().map(|s| s.to_string()).collect(),
                max_connections: MAX_PEER_CONNECTIONS,
                protocol_id: DEFAULT_PROTOCOL_ID.to_string(),
                key_seed: None,
                discovery_timeout_secs: DEFAULT_DISCOVERY_TIMEOUT.as_secs(),
                idle_connection_timeout_secs: DEFAULT_IDLE_CONNECTION_TIMEOUT.as_secs(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, NodeError> {
        let contents = std::fs::read_to_string(path).map_err(|e| NodeError::ConfigError {
            reason: format!("failed to read config file '{}': {}", path, e),
        })?;
        let config: NodeConfig = toml::from_str(&contents).map_err(|e| NodeError::ConfigError {
            reason: format!("failed to parse config file '{}': {}", path, e),
        })?;
        Ok(config)
    }

    /// Initialize a default configuration file in the given directory.
    pub fn init(dir: &str) -> Result<(), NodeError> {
        let dir_path = Path::new(dir);
        if !dir_path.exists() {
            std::fs::create_dir_all(dir_path)?;
        }

        let config = NodeConfig::default();
        let toml_str = toml::to_string_pretty(&config).map_err(|e| NodeError::ConfigError {
            reason: format!("failed to serialize default config: {}", e),
        })?;

        let config_path = dir_path.join(CONFIG_FILE_NAME);
        std::fs::write(&config_path, toml_str)?;

        Ok(())
    }

    /// Build the node service config from the `[network]` section.
    pub fn network_config(&self) -> Result<skein_relay::NetworkConfig, NodeError> {
        let net = &self.network;
        let key_seed = net.key_seed.as_deref().map(parse_key_seed).transpose()?;

        Ok(skein_relay::NetworkConfig {
            listen_host: net.listen_host,
            listen_port: net.listen_port,
            no_bootstrap: net.no_bootstrap,
            boot_nodes: net.boot_nodes.clone(),
            max_connections: net.max_connections,
            protocol_id: net.protocol_id.clone(),
            key_seed,
            discovery_timeout: Duration::from_secs(net.discovery_timeout_secs),
            idle_connection_timeout: Duration::from_secs(net.idle_connection_timeout_secs),
        })
    }
}

/// Decode a hex seed (optionally `0x`-prefixed) into 32 bytes.
pub fn parse_key_seed(s: &str) -> Result<[u8; 32], NodeError> {
    let s = s.trim();
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).map_err(|e| NodeError::ConfigError {
        reason: format!("invalid key seed hex: {}", e),
    })?;
    bytes.try_into().map_err(|b: Vec<u8>| NodeError::ConfigError {
        reason: format!("key seed must be 32 bytes, got {}", b.len()),
    })
}

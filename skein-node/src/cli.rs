use std::time::Duration;

use clap::{Parser, Subcommand};
use skein_relay::NodeService;
use tokio::sync::mpsc;

use crate::config::{NodeConfig, CONFIG_FILE_NAME};
use crate::demo::{DemoOptions, DEFAULT_PORT_A, DEFAULT_PORT_B};
use crate::error::NodeError;

const INBOUND_BUFFER: usize = 256;

#[derive(Parser)]
#[command(
    name = "skein",
    about = "Skein peer-to-peer node",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a node and log every message it receives
    Run {
        /// Path to config file (defaults are used when it does not exist)
        #[arg(short, long, default_value = CONFIG_FILE_NAME)]
        config: String,
        /// Override the listen port
        #[arg(short, long)]
        port: Option<u16>,
        /// Do not dial bootstrap peers at start
        #[arg(long)]
        no_bootstrap: bool,
        /// Boot node multiaddr to connect to (can be specified multiple times)
        #[arg(long = "boot-node")]
        boot_nodes: Vec<String>,
        /// Hex-encoded 32-byte seed for a deterministic peer identity
        #[arg(long)]
        key_seed: Option<String>,
    },
    /// Start two local nodes and exchange one block request between them
    Demo {
        /// Listen port of the sending node
        #[arg(long, default_value_t = DEFAULT_PORT_A)]
        port_a: u16,
        /// Listen port of the receiving node
        #[arg(long, default_value_t = DEFAULT_PORT_B)]
        port_b: u16,
        /// Seconds to wait for peer resolution and for the message
        #[arg(long, default_value_t = 5)]
        timeout_secs: u64,
    },
    /// Initialize a new node configuration
    Init {
        /// Output directory
        #[arg(short, long, default_value = ".")]
        dir: String,
    },
}

impl Cli {
    /// Log level from the config file a `run` command points at, if any.
    pub fn configured_log_level(&self) -> Option<String> {
        match &self.command {
            Command::Run { config, .. } if std::path::Path::new(config).exists() => {
                NodeConfig::load(config).ok().map(|c| c.logging.level)
            }
            _ => None,
        }
    }
}

pub async fn run(cli: Cli) -> Result<(), NodeError> {
    match cli.command {
        Command::Run {
            config,
            port,
            no_bootstrap,
            boot_nodes,
            key_seed,
        } => {
            let mut config = if std::path::Path::new(&config).exists() {
                NodeConfig::load(&config)?
            } else {
                tracing::info!(path = %config, "config file not found, using defaults");
                NodeConfig::default()
            };

            // Apply CLI overrides.
            if let Some(port) = port {
                config.network.listen_port = port;
            }
            if no_bootstrap {
                config.network.no_bootstrap = true;
            }
            if !boot_nodes.is_empty() {
                config.network.boot_nodes.extend(boot_nodes);
            }
            if let Some(seed) = key_seed {
                config.network.key_seed = Some(seed);
            }

            run_node(config).await
        }
        Command::Demo {
            port_a,
            port_b,
            timeout_secs,
        } => {
            let opts = DemoOptions {
                port_a,
                port_b,
                timeout: Duration::from_secs(timeout_secs),
            };
            let (sent, received) = crate::demo::run_demo(&opts).await?;
            if sent != received {
                return Err(NodeError::DemoError {
                    reason: format!("received {} but sent {}", received, sent),
                });
            }
            tracing::info!(message = %received, "demo exchange complete");
            Ok(())
        }
        Command::Init { dir } => {
            NodeConfig::init(&dir)?;
            tracing::info!("Node configuration initialized in {}", dir);
            Ok(())
        }
    }
}

/// Run a node until Ctrl-C, logging inbound messages as JSON.
async fn run_node(config: NodeConfig) -> Result<(), NodeError> {
    let (tx, mut rx) = mpsc::channel(INBOUND_BUFFER);
    let node = NodeService::new(config.network_config()?, Some(tx))?;
    node.start().await.map_err(|_| NodeError::ChannelClosed {
        reason: "start signal dropped".to_string(),
    })??;

    for addr in node.full_addrs() {
        tracing::info!(%addr, "node reachable");
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                break;
            }
            message = rx.recv() => match message {
                Some(message) => match serde_json::to_string(&message) {
                    Ok(json) => tracing::info!(kind = %message.kind(), body = %json, "inbound message"),
                    Err(e) => tracing::warn!("failed to render message: {}", e),
                },
                None => break,
            },
        }
    }

    node.stop().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_demo_defaults() {
        let cli = Cli::try_parse_from(["skein", "demo"]).unwrap();
        match cli.command {
            Command::Demo {
                port_a,
                port_b,
                timeout_secs,
            } => {
                assert_eq!(port_a, 7004);
                assert_eq!(port_b, 7005);
                assert_eq!(timeout_secs, 5);
            }
            _ => panic!("expected demo command"),
        }
    }

    #[test]
    fn test_parse_run_overrides() {
        let cli = Cli::try_parse_from([
            "skein",
            "run",
            "--port",
            "9000",
            "--no-bootstrap",
            "--boot-node",
            "/ip4/127.0.0.1/tcp/7001",
            "--boot-node",
            "/ip4/127.0.0.1/tcp/7002",
        ])
        .unwrap();
        match cli.command {
            Command::Run {
                config,
                port,
                no_bootstrap,
                boot_nodes,
                key_seed,
            } => {
                assert_eq!(config, CONFIG_FILE_NAME);
                assert_eq!(port, Some(9000));
                assert!(no_bootstrap);
                assert_eq!(boot_nodes.len(), 2);
                assert!(key_seed.is_none());
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_configured_log_level_without_file() {
        let cli = Cli::try_parse_from(["skein", "run", "--config", "/nonexistent/skein.toml"])
            .unwrap();
        assert_eq!(cli.configured_log_level(), None);
    }
}

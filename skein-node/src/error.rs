use std::time::Duration;

use skein_relay::{ConnectError, ConstructionError, DiscoveryError, SendError, StartError};
use skein_types::CodecError;
use thiserror::Error;

/// Errors that can occur in the node binary.
#[derive(Debug, Error)]
#[allow(clippy::enum_variant_names)]
pub enum NodeError {
    #[error("config error: {reason}")]
    ConfigError { reason: String },

    #[error("node construction failed: {0}")]
    ConstructionError(#[from] ConstructionError),

    #[error("node start failed: {0}")]
    StartError(#[from] StartError),

    #[error("connect failed: {0}")]
    ConnectError(#[from] ConnectError),

    #[error("send failed: {0}")]
    SendError(#[from] SendError),

    #[error("discovery failed: {0}")]
    DiscoveryError(#[from] DiscoveryError),

    #[error("codec error: {0}")]
    CodecError(#[from] CodecError),

    #[error("timed out after {waited:?} waiting for {what}")]
    TimeoutError { waited: Duration, what: String },

    #[error("demo failed: {reason}")]
    DemoError { reason: String },

    #[error("channel closed: {reason}")]
    ChannelClosed { reason: String },

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

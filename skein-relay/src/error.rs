use std::time::Duration;

use libp2p::PeerId;
use thiserror::Error;

use crate::service::ServiceState;

/// Errors raised while building a [`NodeService`](crate::service::NodeService).
#[derive(Debug, Error)]
pub enum ConstructionError {
    /// The configured keypair seed is not a valid Ed25519 secret.
    #[error("invalid keypair seed: {reason}")]
    InvalidKeySeed { reason: String },

    /// The configured stream protocol name is rejected by the transport.
    #[error("invalid protocol id '{protocol}': {reason}")]
    InvalidProtocol { protocol: String, reason: String },

    /// Any other inconsistent configuration value.
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },
}

/// Errors reported on the completion signal of `start()`.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("service already started (state: {state})")]
    AlreadyStarted { state: ServiceState },

    /// The transport stack could not be assembled.
    #[error("transport error: {reason}")]
    Transport { reason: String },

    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    /// A bootstrap peer could not be dialed.
    #[error("bootstrap failed: {reason}")]
    Bootstrap { reason: String },

    /// The service was stopped before it finished starting.
    #[error("start cancelled")]
    Cancelled,
}

/// Errors returned by `connect()`.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("service is not running")]
    NotRunning,

    #[error("peer {peer} unreachable: {reason}")]
    Unreachable { peer: PeerId, reason: String },

    #[error("handshake with {peer} failed: {reason}")]
    Handshake { peer: PeerId, reason: String },

    #[error("connect cancelled")]
    Cancelled,
}

/// Errors returned by `send()`.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("service is not running")]
    NotRunning,

    /// No connection exists and no address could be resolved or dialed.
    #[error("peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: PeerId, reason: String },

    /// The stream to the peer failed while writing or awaiting its ack.
    #[error("transport failure sending to {peer}: {reason}")]
    TransportFailure { peer: PeerId, reason: String },

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("send cancelled")]
    Cancelled,
}

/// Errors returned by peer discovery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("peer not found: {peer}")]
    PeerNotFound { peer: PeerId },

    #[error("lookup of {peer} timed out after {timeout:?}")]
    Timeout { peer: PeerId, timeout: Duration },

    #[error("lookup cancelled")]
    Cancelled,

    #[error("service is not running")]
    NotRunning,
}

/// Errors parsing a `/.../p2p/<peer-id>` address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddrError {
    #[error("invalid multiaddr '{addr}': {reason}")]
    Parse { addr: String, reason: String },

    #[error("multiaddr '{addr}' has no /p2p peer id suffix")]
    MissingPeerId { addr: String },
}

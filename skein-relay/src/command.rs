use libp2p::{Multiaddr, PeerId};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::addr_info::PeerAddrInfo;
use crate::codec::Frame;
use crate::error::{ConnectError, DiscoveryError, SendError};

/// Requests handled by the swarm task. Each carries the channel its answer
/// goes back on.
pub(crate) enum Command {
    Dial {
        info: PeerAddrInfo,
        reply: oneshot::Sender<Result<(), ConnectError>>,
    },
    Send {
        peer: PeerId,
        /// Where to dial if no connection exists. Ignored when connected.
        addrs: Vec<Multiaddr>,
        frame: Frame,
        reply: oneshot::Sender<Result<(), SendError>>,
    },
    FindPeer {
        peer: PeerId,
        reply: oneshot::Sender<Result<PeerAddrInfo, DiscoveryError>>,
    },
    IsConnected {
        peer: PeerId,
        reply: oneshot::Sender<bool>,
    },
    ConnectedPeers {
        reply: oneshot::Sender<Vec<PeerId>>,
    },
}

/// Why a command could not be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallError {
    NotRunning,
    Cancelled,
}

/// Send a command to the swarm task and wait for its answer.
pub(crate) async fn request<T>(
    commands: &mpsc::Sender<Command>,
    cancel: &CancellationToken,
    make: impl FnOnce(oneshot::Sender<T>) -> Command,
) -> Result<T, CallError> {
    if cancel.is_cancelled() {
        return Err(CallError::NotRunning);
    }
    let (reply, answer) = oneshot::channel();
    let command = make(reply);

    tokio::select! {
        _ = cancel.cancelled() => return Err(CallError::Cancelled),
        sent = commands.send(command) => {
            if sent.is_err() {
                return Err(CallError::NotRunning);
            }
        }
    }

    tokio::select! {
        _ = cancel.cancelled() => Err(CallError::Cancelled),
        // The swarm task dropped the reply while shutting down.
        res = answer => res.map_err(|_| CallError::Cancelled),
    }
}

impl From<CallError> for ConnectError {
    fn from(e: CallError) -> Self {
        match e {
            CallError::NotRunning => ConnectError::NotRunning,
            CallError::Cancelled => ConnectError::Cancelled,
        }
    }
}

impl From<CallError> for SendError {
    fn from(e: CallError) -> Self {
        match e {
            CallError::NotRunning => SendError::NotRunning,
            CallError::Cancelled => SendError::Cancelled,
        }
    }
}

impl From<CallError> for DiscoveryError {
    fn from(e: CallError) -> Self {
        match e {
            CallError::NotRunning => DiscoveryError::NotRunning,
            CallError::Cancelled => DiscoveryError::Cancelled,
        }
    }
}

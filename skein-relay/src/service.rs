use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use libp2p::identity::Keypair;
use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId, StreamProtocol};
use skein_types::constants::MAX_MESSAGE_SIZE;
use skein_types::Message;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::addr_info::PeerAddrInfo;
use crate::codec::Frame;
use crate::command::{self, CallError, Command};
use crate::config::NetworkConfig;
use crate::directory::{AddrTtl, PeerDirectory};
use crate::discovery::{DhtClient, Discovery};
use crate::error::{ConnectError, ConstructionError, DiscoveryError, SendError, StartError};
use crate::event_loop::{self, RunParams};
use crate::protocol::COMMAND_BUFFER;

/// Lifecycle state of a [`NodeService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Stopped => write!(f, "stopped"),
            ServiceState::Starting => write!(f, "starting"),
            ServiceState::Running => write!(f, "running"),
        }
    }
}

/// State written by the swarm task and read by the service handle.
pub(crate) struct Shared {
    state: Mutex<ServiceState>,
    listen_addrs: RwLock<Vec<Multiaddr>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: Mutex::new(ServiceState::Stopped),
            listen_addrs: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn state(&self) -> ServiceState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_state(&self, state: ServiceState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Move from `Stopped` to `Starting`, or report the current state.
    fn begin_start(&self) -> Result<(), ServiceState> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != ServiceState::Stopped {
            return Err(*state);
        }
        *state = ServiceState::Starting;
        Ok(())
    }

    pub(crate) fn listen_addrs(&self) -> Vec<Multiaddr> {
        self.listen_addrs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn add_listen_addr(&self, addr: Multiaddr) {
        let mut addrs = self
            .listen_addrs
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if !addrs.contains(&addr) {
            addrs.push(addr);
        }
    }

    pub(crate) fn remove_listen_addr(&self, addr: &Multiaddr) {
        self.listen_addrs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|a| a != addr);
    }

    pub(crate) fn clear_listen_addrs(&self) {
        self.listen_addrs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Handles to the swarm task of the current run.
struct Run {
    cancel: CancellationToken,
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

/// A peer-to-peer node: one identity, one listener, a peer directory and a
/// DHT-backed discovery client.
///
/// The swarm itself lives on a task spawned by [`start`](Self::start); every
/// other method talks to it over a command channel. A stopped service can be
/// started again and gets a fresh cancellation scope each time.
pub struct NodeService {
    config: NetworkConfig,
    keypair: Keypair,
    peer_id: PeerId,
    protocol: StreamProtocol,
    directory: Arc<PeerDirectory>,
    discovery: Arc<Discovery>,
    shared: Arc<Shared>,
    inbound: Option<mpsc::Sender<Message>>,
    run: Mutex<Option<Run>>,
}

impl NodeService {
    /// Build a service from its config. Nothing touches the network until
    /// [`start`](Self::start).
    ///
    /// Every successfully decoded inbound message is pushed to `inbound` when
    /// given; otherwise inbound messages are logged and dropped.
    pub fn new(
        config: NetworkConfig,
        inbound: Option<mpsc::Sender<Message>>,
    ) -> Result<Self, ConstructionError> {
        if config.max_connections == 0 {
            return Err(ConstructionError::InvalidConfig {
                reason: "max_connections must be at least 1".to_string(),
            });
        }

        let keypair = if let Some(seed) = &config.key_seed {
            let mut seed_bytes = *seed;
            Keypair::ed25519_from_bytes(&mut seed_bytes).map_err(|e| {
                ConstructionError::InvalidKeySeed {
                    reason: e.to_string(),
                }
            })?
        } else {
            Keypair::generate_ed25519()
        };
        let peer_id = keypair.public().to_peer_id();

        let protocol = StreamProtocol::try_from_owned(config.protocol_id.clone()).map_err(|e| {
            ConstructionError::InvalidProtocol {
                protocol: config.protocol_id.clone(),
                reason: format!("{:?}", e),
            }
        })?;

        let directory = Arc::new(PeerDirectory::new());
        let discovery = Arc::new(Discovery::new(directory.clone(), &config.boot_nodes));

        debug!(%peer_id, listen = %config.listen_multiaddr(), "node service created");

        Ok(Self {
            config,
            keypair,
            peer_id,
            protocol,
            directory,
            discovery,
            shared: Arc::new(Shared::new()),
            inbound,
            run: Mutex::new(None),
        })
    }

    /// Start the service. Returns at once; the receiver resolves when the
    /// listener is up and boot nodes are dialed, or with the reason startup
    /// failed. Must be called from within a tokio runtime.
    pub fn start(&self) -> oneshot::Receiver<Result<(), StartError>> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let mut run = self.run.lock().unwrap_or_else(PoisonError::into_inner);

        if let Err(state) = self.shared.begin_start() {
            let _ = ready_tx.send(Err(StartError::AlreadyStarted { state }));
            return ready_rx;
        }

        // Left over from a run that failed to start.
        if let Some(old) = run.take() {
            old.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let params = RunParams {
            keypair: self.keypair.clone(),
            config: self.config.clone(),
            protocol: self.protocol.clone(),
            directory: self.directory.clone(),
            boot_nodes: self.discovery.boot_nodes().to_vec(),
            shared: self.shared.clone(),
            inbound: self.inbound.clone(),
            commands: command_rx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(event_loop::run(params, ready_tx));

        *run = Some(Run {
            cancel,
            commands: command_tx,
            task,
        });
        ready_rx
    }

    /// Stop the service and wait for its swarm task to exit. Calling it on a
    /// stopped service does nothing.
    pub async fn stop(&self) {
        let run = self
            .run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(run) = run {
            run.cancel.cancel();
            drop(run.commands);
            if let Err(e) = run.task.await {
                warn!(peer_id = %self.peer_id, error = %e, "node task ended abnormally");
            }
            info!(peer_id = %self.peer_id, "node service stopped");
        }

        self.shared.clear_listen_addrs();
        self.shared.set_state(ServiceState::Stopped);
    }

    /// Dial `info` and wait until the connection is established.
    pub async fn connect(&self, info: PeerAddrInfo) -> Result<(), ConnectError> {
        if info.peer_id != self.peer_id {
            self.directory.add_info(&info, AddrTtl::TEMP);
        }
        self.call(|reply| Command::Dial { info, reply }).await?
    }

    /// Send an encoded message to `peer`.
    ///
    /// Uses an existing connection when there is one; otherwise resolves the
    /// peer through the directory and the DHT and dials it. Resolves once the
    /// remote node has decoded the message and queued it for delivery.
    pub async fn send(&self, peer: PeerId, encoded: Vec<u8>) -> Result<(), SendError> {
        if encoded.len() > MAX_MESSAGE_SIZE {
            return Err(SendError::MessageTooLarge {
                size: encoded.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        if peer == self.peer_id {
            return Err(SendError::PeerUnreachable {
                peer,
                reason: "cannot send to the local peer".to_string(),
            });
        }

        let connected = self
            .call(|reply| Command::IsConnected { peer, reply })
            .await?;
        let addrs = if connected {
            Vec::new()
        } else {
            match self.find_peer(peer, self.config.discovery_timeout).await {
                Ok(info) => info.addrs,
                Err(DiscoveryError::Cancelled) => return Err(SendError::Cancelled),
                Err(DiscoveryError::NotRunning) => return Err(SendError::NotRunning),
                Err(e) => {
                    return Err(SendError::PeerUnreachable {
                        peer,
                        reason: e.to_string(),
                    })
                }
            }
        };

        let frame = Frame(encoded);
        self.call(|reply| Command::Send {
            peer,
            addrs,
            frame,
            reply,
        })
        .await?
    }

    /// Send to every connected peer. Returns how many sends succeeded.
    pub async fn broadcast(&self, encoded: Vec<u8>) -> usize {
        let peers = self.connected_peers().await;
        let sends = peers.into_iter().map(|peer| {
            let payload = encoded.clone();
            async move { (peer, self.send(peer, payload).await) }
        });

        futures::future::join_all(sends)
            .await
            .into_iter()
            .filter(|(peer, res)| match res {
                Ok(()) => true,
                Err(e) => {
                    debug!(%peer, error = %e, "broadcast send failed");
                    false
                }
            })
            .count()
    }

    /// Resolve `peer` to addresses: directory first, then the DHT under
    /// `timeout`. Cancelled when the service stops.
    pub async fn find_peer(
        &self,
        peer: PeerId,
        timeout: Duration,
    ) -> Result<PeerAddrInfo, DiscoveryError> {
        let (commands, cancel) = self.handles().ok_or(DiscoveryError::NotRunning)?;
        let dht = SwarmDht {
            commands,
            cancel: cancel.clone(),
        };
        self.discovery.find_peer(&cancel, &dht, peer, timeout).await
    }

    /// Peers with a live connection. Empty when not running.
    pub async fn connected_peers(&self) -> Vec<PeerId> {
        self.call(|reply| Command::ConnectedPeers { reply })
            .await
            .unwrap_or_default()
    }

    pub async fn peer_count(&self) -> usize {
        self.connected_peers().await.len()
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn state(&self) -> ServiceState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ServiceState::Running
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Addresses the listener is bound to. Empty unless running.
    pub fn listen_addrs(&self) -> Vec<Multiaddr> {
        self.shared.listen_addrs()
    }

    /// Listen addresses with `/p2p/<peer-id>` appended.
    pub fn full_addrs(&self) -> Vec<Multiaddr> {
        self.listen_addrs()
            .into_iter()
            .map(|a| a.with(Protocol::P2p(self.peer_id)))
            .collect()
    }

    /// This node's identity and listen addresses.
    pub fn addr_info(&self) -> PeerAddrInfo {
        PeerAddrInfo::new(self.peer_id, self.listen_addrs())
    }

    pub fn directory(&self) -> &Arc<PeerDirectory> {
        &self.directory
    }

    pub fn discovery(&self) -> &Arc<Discovery> {
        &self.discovery
    }

    /// Cancellation token of the current run, if one exists.
    pub fn context(&self) -> Option<CancellationToken> {
        self.run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|run| run.cancel.clone())
    }

    fn handles(&self) -> Option<(mpsc::Sender<Command>, CancellationToken)> {
        if !self.is_running() {
            return None;
        }
        self.run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|run| (run.commands.clone(), run.cancel.clone()))
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, CallError> {
        let (commands, cancel) = self.handles().ok_or(CallError::NotRunning)?;
        command::request(&commands, &cancel, make).await
    }
}

impl Drop for NodeService {
    fn drop(&mut self) {
        let run = self
            .run
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(run) = run {
            run.cancel.cancel();
        }
    }
}

/// [`DhtClient`] backed by the swarm task's Kademlia behaviour.
struct SwarmDht {
    commands: mpsc::Sender<Command>,
    cancel: CancellationToken,
}

#[async_trait]
impl DhtClient for SwarmDht {
    async fn find_peer(&self, peer: PeerId) -> Result<PeerAddrInfo, DiscoveryError> {
        command::request(&self.commands, &self.cancel, |reply| Command::FindPeer {
            peer,
            reply,
        })
        .await?
    }
}

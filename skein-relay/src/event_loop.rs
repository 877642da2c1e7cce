use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use futures::StreamExt;
use libp2p::identity::Keypair;
use libp2p::kad::{self, QueryId, QueryResult};
use libp2p::request_response::{
    self, InboundFailure, OutboundFailure, OutboundRequestId, ResponseChannel,
};
use libp2p::swarm::dial_opts::{DialOpts, PeerCondition};
use libp2p::swarm::{DialError, SwarmEvent};
use libp2p::{identify, noise, tcp, yamux, Multiaddr, PeerId, StreamProtocol, Swarm, SwarmBuilder};
use skein_types::constants::DIRECTORY_PRUNE_INTERVAL;
use skein_types::Message;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::addr_info::PeerAddrInfo;
use crate::behaviour::{build_behaviour, SkeinBehaviour, SkeinBehaviourEvent};
use crate::codec::{Ack, Frame};
use crate::command::Command;
use crate::config::NetworkConfig;
use crate::directory::{AddrTtl, PeerDirectory};
use crate::dispatch::{spawn_dispatcher, PeerQueue};
use crate::error::{ConnectError, DiscoveryError, SendError, StartError};
use crate::peer_manager::PeerManager;
use crate::protocol::{DISPATCH_QUEUE, LISTEN_TIMEOUT};
use crate::service::{ServiceState, Shared};

/// Everything one run of the swarm task needs.
pub(crate) struct RunParams {
    pub keypair: Keypair,
    pub config: NetworkConfig,
    pub protocol: StreamProtocol,
    pub directory: Arc<PeerDirectory>,
    pub boot_nodes: Vec<PeerAddrInfo>,
    pub shared: Arc<Shared>,
    pub inbound: Option<mpsc::Sender<Message>>,
    pub commands: mpsc::Receiver<Command>,
    pub cancel: CancellationToken,
}

/// A caller waiting for a connection to `peer`.
enum PendingDial {
    Connect(oneshot::Sender<Result<(), ConnectError>>),
    Send {
        frame: Frame,
        reply: oneshot::Sender<Result<(), SendError>>,
    },
}

/// Why a dial did not produce a connection.
enum DialFailure {
    Unreachable(String),
    Handshake(String),
}

impl DialFailure {
    fn from_dial_error(error: &DialError) -> Self {
        match error {
            DialError::WrongPeerId { .. } | DialError::Denied { .. } => {
                DialFailure::Handshake(error.to_string())
            }
            _ => DialFailure::Unreachable(error.to_string()),
        }
    }

    fn reason(&self) -> &str {
        match self {
            DialFailure::Unreachable(reason) | DialFailure::Handshake(reason) => reason,
        }
    }
}

impl PendingDial {
    fn fail(self, peer: PeerId, failure: &DialFailure) {
        match self {
            PendingDial::Connect(reply) => {
                let err = match failure {
                    DialFailure::Unreachable(reason) => ConnectError::Unreachable {
                        peer,
                        reason: reason.clone(),
                    },
                    DialFailure::Handshake(reason) => ConnectError::Handshake {
                        peer,
                        reason: reason.clone(),
                    },
                };
                let _ = reply.send(Err(err));
            }
            PendingDial::Send { reply, .. } => {
                let _ = reply.send(Err(SendError::PeerUnreachable {
                    peer,
                    reason: failure.reason().to_string(),
                }));
            }
        }
    }

    fn cancel(self) {
        match self {
            PendingDial::Connect(reply) => {
                let _ = reply.send(Err(ConnectError::Cancelled));
            }
            PendingDial::Send { reply, .. } => {
                let _ = reply.send(Err(SendError::Cancelled));
            }
        }
    }
}

/// Callers waiting for addresses of one peer. A lookup only ends with an
/// answer; giving up is the caller's timeout.
struct PendingLookup {
    /// The running closest-peers query, `None` once it is done or when the
    /// peer is connected and its identify report is awaited.
    query: Option<QueryId>,
    replies: Vec<oneshot::Sender<Result<PeerAddrInfo, DiscoveryError>>>,
}

impl PendingLookup {
    /// Forget callers that stopped waiting. False when none are left.
    fn retain_waiting(&mut self) -> bool {
        self.replies.retain(|reply| !reply.is_closed());
        !self.replies.is_empty()
    }
}

/// Drop lookups nobody waits for any more. Returns their running queries.
fn retain_waiting_lookups(lookups: &mut HashMap<PeerId, PendingLookup>) -> Vec<QueryId> {
    let mut queries = Vec::new();
    lookups.retain(|_, lookup| {
        let waiting = lookup.retain_waiting();
        if !waiting {
            queries.extend(lookup.query);
        }
        waiting
    });
    queries
}

/// Owns the swarm for one run of a node and serves commands against it.
struct EventLoop {
    swarm: Swarm<SkeinBehaviour>,
    directory: Arc<PeerDirectory>,
    shared: Arc<Shared>,
    peer_manager: PeerManager,
    max_connections: usize,
    inbound: Option<mpsc::Sender<Message>>,
    commands: mpsc::Receiver<Command>,
    cancel: CancellationToken,
    ready_tx: mpsc::UnboundedSender<PeerId>,
    ready_rx: mpsc::UnboundedReceiver<PeerId>,
    dispatchers: HashMap<PeerId, PeerQueue<ResponseChannel<Ack>>>,
    pending_dials: HashMap<PeerId, Vec<PendingDial>>,
    pending_sends: HashMap<OutboundRequestId, (PeerId, oneshot::Sender<Result<(), SendError>>)>,
    pending_lookups: HashMap<PeerId, PendingLookup>,
}

/// Body of the task spawned by `NodeService::start`.
///
/// Reports the outcome of startup on `ready`, then serves the swarm until the
/// run is cancelled.
pub(crate) async fn run(params: RunParams, ready: oneshot::Sender<Result<(), StartError>>) {
    let shared = params.shared.clone();
    match EventLoop::start(params).await {
        Ok(event_loop) => {
            shared.set_state(ServiceState::Running);
            info!(
                peer_id = %event_loop.swarm.local_peer_id(),
                listen = ?shared.listen_addrs(),
                "node service started"
            );
            let _ = ready.send(Ok(()));
            event_loop.run().await;
        }
        Err(e) => {
            warn!(error = %e, "node service failed to start");
            shared.clear_listen_addrs();
            shared.set_state(ServiceState::Stopped);
            let _ = ready.send(Err(e));
        }
    }
}

impl EventLoop {
    async fn start(params: RunParams) -> Result<Self, StartError> {
        let RunParams {
            keypair,
            config,
            protocol,
            directory,
            boot_nodes,
            shared,
            inbound,
            commands,
            cancel,
        } = params;

        let idle_timeout = config.idle_connection_timeout;
        let mut swarm = SwarmBuilder::with_existing_identity(keypair)
            .with_tokio()
            .with_tcp(
                tcp::Config::default(),
                noise::Config::new,
                yamux::Config::default,
            )
            .map_err(|e| StartError::Transport {
                reason: format!("tcp transport: {}", e),
            })?
            .with_behaviour(|key| build_behaviour(key, protocol))
            .map_err(|e| StartError::Transport {
                reason: format!("behaviour: {}", e),
            })?
            .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(idle_timeout))
            .build();

        let listen_addr = config.listen_multiaddr();
        swarm
            .listen_on(listen_addr.clone())
            .map_err(|e| StartError::Bind {
                addr: listen_addr.to_string(),
                reason: e.to_string(),
            })?;

        // The listener binds asynchronously; wait until it reports an address.
        let deadline = tokio::time::sleep(LISTEN_TIMEOUT);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(StartError::Cancelled),
                _ = &mut deadline => {
                    return Err(StartError::Bind {
                        addr: listen_addr.to_string(),
                        reason: "timed out waiting for listener".to_string(),
                    });
                }
                event = swarm.select_next_some() => match event {
                    SwarmEvent::NewListenAddr { address, .. } => {
                        info!(%address, "listening on new address");
                        shared.add_listen_addr(address);
                        break;
                    }
                    SwarmEvent::ListenerError { error, .. } => {
                        return Err(StartError::Bind {
                            addr: listen_addr.to_string(),
                            reason: error.to_string(),
                        });
                    }
                    SwarmEvent::ListenerClosed { reason: Err(error), .. } => {
                        return Err(StartError::Bind {
                            addr: listen_addr.to_string(),
                            reason: error.to_string(),
                        });
                    }
                    other => debug!(?other, "swarm event during startup"),
                },
            }
        }

        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        let mut event_loop = Self {
            swarm,
            directory,
            shared,
            peer_manager: PeerManager::new(config.max_connections),
            max_connections: config.max_connections,
            inbound,
            commands,
            cancel,
            ready_tx,
            ready_rx,
            dispatchers: HashMap::new(),
            pending_dials: HashMap::new(),
            pending_sends: HashMap::new(),
            pending_lookups: HashMap::new(),
        };

        if config.no_bootstrap {
            debug!("bootstrap disabled");
        } else {
            event_loop.bootstrap(&boot_nodes)?;
        }

        Ok(event_loop)
    }

    fn bootstrap(&mut self, boot_nodes: &[PeerAddrInfo]) -> Result<(), StartError> {
        let local = *self.swarm.local_peer_id();
        let mut dialed = 0;
        for node in boot_nodes.iter().filter(|n| n.peer_id != local) {
            self.directory.add_info(node, AddrTtl::PERMANENT);
            for addr in &node.addrs {
                self.swarm
                    .behaviour_mut()
                    .kad
                    .add_address(&node.peer_id, addr.clone());
            }
            let opts = DialOpts::peer_id(node.peer_id)
                .addresses(node.addrs.clone())
                .build();
            self.swarm
                .dial(opts)
                .map_err(|e| StartError::Bootstrap {
                    reason: format!("dial boot node {}: {}", node, e),
                })?;
            dialed += 1;
        }

        if dialed > 0 {
            if let Err(e) = self.swarm.behaviour_mut().kad.bootstrap() {
                warn!(error = %e, "DHT bootstrap not started");
            }
            info!(count = dialed, "dialing boot nodes");
        }
        Ok(())
    }

    /// Main event loop. Runs until the run's token is cancelled.
    async fn run(mut self) {
        let mut prune = tokio::time::interval(DIRECTORY_PRUNE_INTERVAL);
        prune.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        prune.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some(command) = self.commands.recv() => self.handle_command(command),
                Some(peer) = self.ready_rx.recv() => self.release_held(peer),
                event = self.swarm.select_next_some() => self.handle_swarm_event(event),
                _ = prune.tick() => {
                    let removed = self.directory.prune();
                    if removed > 0 {
                        debug!(removed, "pruned expired addresses");
                    }
                    self.drop_abandoned_lookups();
                }
            }
        }

        self.shutdown();
    }

    fn shutdown(mut self) {
        for (_, pending) in self.pending_dials.drain() {
            for dial in pending {
                dial.cancel();
            }
        }
        for (_, (_, reply)) in self.pending_sends.drain() {
            let _ = reply.send(Err(SendError::Cancelled));
        }
        for (_, lookup) in self.pending_lookups.drain() {
            for reply in lookup.replies {
                let _ = reply.send(Err(DiscoveryError::Cancelled));
            }
        }
        self.dispatchers.clear();
        self.shared.clear_listen_addrs();
        self.shared.set_state(ServiceState::Stopped);
        info!(peer_id = %self.swarm.local_peer_id(), "node event loop stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Dial { info, reply } => {
                self.dial(info, PendingDial::Connect(reply));
            }
            Command::Send {
                peer,
                addrs,
                frame,
                reply,
            } => {
                if self.peer_manager.is_connected(&peer) {
                    self.send_request(peer, frame, reply);
                } else {
                    self.dial(PeerAddrInfo::new(peer, addrs), PendingDial::Send { frame, reply });
                }
            }
            Command::FindPeer { peer, reply } => self.find_peer(peer, reply),
            Command::IsConnected { peer, reply } => {
                let _ = reply.send(self.peer_manager.is_connected(&peer));
            }
            Command::ConnectedPeers { reply } => {
                let _ = reply.send(self.peer_manager.connected_peers().copied().collect());
            }
        }
    }

    fn dial(&mut self, info: PeerAddrInfo, pending: PendingDial) {
        let peer = info.peer_id;
        if peer == *self.swarm.local_peer_id() {
            pending.fail(
                peer,
                &DialFailure::Unreachable("cannot dial the local peer".to_string()),
            );
            return;
        }
        if self.peer_manager.is_connected(&peer) {
            self.complete_dial(peer, pending);
            return;
        }
        if let Some(waiting) = self.pending_dials.get_mut(&peer) {
            waiting.push(pending);
            return;
        }

        let mut addrs = info.addrs;
        if addrs.is_empty() {
            addrs = self.directory.lookup(&peer).unwrap_or_default();
        }
        if addrs.is_empty() {
            pending.fail(
                peer,
                &DialFailure::Unreachable("no known addresses".to_string()),
            );
            return;
        }

        debug!(%peer, ?addrs, "dialing peer");
        self.pending_dials.insert(peer, vec![pending]);
        let opts = DialOpts::peer_id(peer)
            .condition(PeerCondition::Disconnected)
            .addresses(addrs)
            .build();
        if let Err(e) = self.swarm.dial(opts) {
            self.fail_dials(peer, DialFailure::from_dial_error(&e));
        }
    }

    fn complete_dial(&mut self, peer: PeerId, pending: PendingDial) {
        match pending {
            PendingDial::Connect(reply) => {
                let _ = reply.send(Ok(()));
            }
            PendingDial::Send { frame, reply } => self.send_request(peer, frame, reply),
        }
    }

    fn complete_dials(&mut self, peer: PeerId) {
        if let Some(pending) = self.pending_dials.remove(&peer) {
            for dial in pending {
                self.complete_dial(peer, dial);
            }
        }
    }

    fn fail_dials(&mut self, peer: PeerId, failure: DialFailure) {
        if let Some(pending) = self.pending_dials.remove(&peer) {
            debug!(%peer, reason = failure.reason(), "dial failed");
            for dial in pending {
                dial.fail(peer, &failure);
            }
        }
    }

    fn send_request(
        &mut self,
        peer: PeerId,
        frame: Frame,
        reply: oneshot::Sender<Result<(), SendError>>,
    ) {
        let request_id = self
            .swarm
            .behaviour_mut()
            .request_response
            .send_request(&peer, frame);
        self.pending_sends.insert(request_id, (peer, reply));
    }

    fn send_ack(&mut self, channel: ResponseChannel<Ack>) {
        if self
            .swarm
            .behaviour_mut()
            .request_response
            .send_response(channel, Ack)
            .is_err()
        {
            debug!("acknowledgement dropped, stream already closed");
        }
    }

    fn find_peer(
        &mut self,
        peer: PeerId,
        reply: oneshot::Sender<Result<PeerAddrInfo, DiscoveryError>>,
    ) {
        if peer == *self.swarm.local_peer_id() {
            let _ = reply.send(Err(DiscoveryError::PeerNotFound { peer }));
            return;
        }
        let known = self.known_addrs(&peer);
        if !known.is_empty() {
            let _ = reply.send(Ok(PeerAddrInfo::new(peer, known)));
            return;
        }
        if let Some(lookup) = self.pending_lookups.get_mut(&peer) {
            lookup.retain_waiting();
            lookup.replies.push(reply);
            if lookup.query.is_none() && !self.peer_manager.is_connected(&peer) {
                debug!(%peer, "restarting DHT lookup");
                lookup.query = Some(self.swarm.behaviour_mut().kad.get_closest_peers(peer));
            }
            return;
        }

        // A connected peer announces its listen addresses over identify.
        let query = if self.peer_manager.is_connected(&peer) {
            debug!(%peer, "waiting for identify from connected peer");
            None
        } else {
            debug!(%peer, "starting DHT lookup");
            Some(self.swarm.behaviour_mut().kad.get_closest_peers(peer))
        };
        self.pending_lookups.insert(
            peer,
            PendingLookup {
                query,
                replies: vec![reply],
            },
        );
    }

    /// Answer the lookup for `peer` if its addresses are known by now.
    /// Otherwise it stays pending for identify or routing updates.
    fn try_finish_lookup(&mut self, peer: PeerId) {
        let addrs = self.known_addrs(&peer);
        if addrs.is_empty() {
            return;
        }
        let lookup = match self.pending_lookups.remove(&peer) {
            Some(lookup) => lookup,
            None => return,
        };
        if let Some(id) = lookup.query {
            if let Some(mut query) = self.swarm.behaviour_mut().kad.query_mut(&id) {
                query.finish();
            }
        }

        debug!(%peer, ?addrs, "peer lookup resolved");
        let info = PeerAddrInfo::new(peer, addrs);
        for reply in lookup.replies {
            let _ = reply.send(Ok(info.clone()));
        }
    }

    fn drop_abandoned_lookups(&mut self) {
        for id in retain_waiting_lookups(&mut self.pending_lookups) {
            if let Some(mut query) = self.swarm.behaviour_mut().kad.query_mut(&id) {
                query.finish();
            }
        }
    }

    /// Routing-table addresses for `peer`, falling back to the directory.
    fn known_addrs(&mut self, peer: &PeerId) -> Vec<Multiaddr> {
        let addrs = self.routing_addrs(peer);
        if !addrs.is_empty() {
            return addrs;
        }
        self.directory.lookup(peer).unwrap_or_default()
    }

    /// Addresses the Kademlia routing table holds for `peer`.
    fn routing_addrs(&mut self, peer: &PeerId) -> Vec<Multiaddr> {
        self.swarm
            .behaviour_mut()
            .kad
            .kbucket(*peer)
            .and_then(|bucket| {
                bucket
                    .iter()
                    .find(|entry| entry.node.key.preimage() == peer)
                    .map(|entry| entry.node.value.iter().cloned().collect())
            })
            .unwrap_or_default()
    }

    fn dispatcher(&mut self, peer: PeerId) -> &mut PeerQueue<ResponseChannel<Ack>> {
        self.dispatchers.entry(peer).or_insert_with(|| {
            PeerQueue::new(spawn_dispatcher(
                peer,
                self.inbound.clone(),
                self.ready_tx.clone(),
                DISPATCH_QUEUE,
                self.cancel.child_token(),
            ))
        })
    }

    /// The dispatcher for `peer` took a message; move held frames up.
    fn release_held(&mut self, peer: PeerId) {
        let acks = match self.dispatchers.get_mut(&peer) {
            Some(queue) => queue.flush(|channel| channel.is_open()),
            None => return,
        };
        for channel in acks {
            self.send_ack(channel);
        }
    }

    fn handle_inbound_frame(&mut self, peer: PeerId, frame: Frame, channel: ResponseChannel<Ack>) {
        match Message::decode(&frame.0) {
            Ok(message) => {
                debug!(%peer, kind = %message.kind(), "received message");
                let queue = self.dispatcher(peer);
                match queue.offer(message, channel) {
                    Some(channel) => self.send_ack(channel),
                    None => debug!(%peer, held = queue.held(), "dispatch queue full, holding ack"),
                }
            }
            Err(e) => {
                warn!(%peer, error = %e, "failed to decode message, closing connection");
                drop(channel);
                // Inbound requests do not carry their connection id, so the
                // whole peer is dropped rather than the one connection.
                let _ = self.swarm.disconnect_peer_id(peer);
            }
        }
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<SkeinBehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(SkeinBehaviourEvent::RequestResponse(event)) => {
                self.handle_request_response_event(event);
            }
            SwarmEvent::Behaviour(SkeinBehaviourEvent::Kad(event)) => {
                self.handle_kad_event(event);
            }
            SwarmEvent::Behaviour(SkeinBehaviourEvent::Identify(event)) => {
                self.handle_identify_event(event);
            }
            SwarmEvent::ConnectionEstablished {
                peer_id, endpoint, ..
            } => {
                if !self.peer_manager.add_peer(peer_id) {
                    warn!(
                        %peer_id,
                        max = self.max_connections,
                        "peer limit reached, disconnecting peer"
                    );
                    let _ = self.swarm.disconnect_peer_id(peer_id);
                    self.fail_dials(
                        peer_id,
                        DialFailure::Unreachable("connection limit reached".to_string()),
                    );
                    return;
                }
                debug!(
                    %peer_id,
                    ?endpoint,
                    peers = self.peer_manager.peer_count(),
                    "connection established"
                );
                self.dispatcher(peer_id);
                if endpoint.is_dialer() {
                    let remote = endpoint.get_remote_address().clone();
                    self.directory.add_addresses(
                        peer_id,
                        [remote.clone()],
                        AddrTtl::RECENTLY_CONNECTED,
                    );
                    self.swarm.behaviour_mut().kad.add_address(&peer_id, remote);
                }
                self.complete_dials(peer_id);
                if self.pending_lookups.contains_key(&peer_id) {
                    self.try_finish_lookup(peer_id);
                }
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                cause,
                ..
            } => {
                debug!(%peer_id, ?cause, "connection closed");
                if num_established == 0 {
                    if let Some(info) = self.peer_manager.remove_peer(&peer_id) {
                        info!(
                            %peer_id,
                            connected_for = ?info.connected_at.elapsed(),
                            agent = info.agent_version.as_deref().unwrap_or("unknown"),
                            "peer disconnected"
                        );
                    }
                    // Already queued messages still drain to the sink. Held
                    // frames were never acknowledged and are dropped.
                    self.dispatchers.remove(&peer_id);
                }
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                if let Some(peer) = peer_id {
                    debug!(%peer, %error, "outgoing connection failed");
                    self.fail_dials(peer, DialFailure::from_dial_error(&error));
                }
            }
            SwarmEvent::IncomingConnectionError {
                send_back_addr,
                error,
                ..
            } => {
                debug!(%send_back_addr, %error, "incoming connection failed");
            }
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(%address, "listening on new address");
                self.shared.add_listen_addr(address);
            }
            SwarmEvent::ExpiredListenAddr { address, .. } => {
                debug!(%address, "listen address expired");
                self.shared.remove_listen_addr(&address);
            }
            other => {
                debug!(?other, "other swarm event");
            }
        }
    }

    fn handle_request_response_event(&mut self, event: request_response::Event<Frame, Ack>) {
        match event {
            request_response::Event::Message { peer, message, .. } => match message {
                request_response::Message::Request {
                    request, channel, ..
                } => {
                    self.handle_inbound_frame(peer, request, channel);
                }
                request_response::Message::Response { request_id, .. } => {
                    if let Some((_, reply)) = self.pending_sends.remove(&request_id) {
                        let _ = reply.send(Ok(()));
                    }
                }
            },
            request_response::Event::OutboundFailure {
                peer,
                request_id,
                error,
                ..
            } => {
                debug!(%peer, %error, "direct message failed");
                if let Some((peer, reply)) = self.pending_sends.remove(&request_id) {
                    let reason = error.to_string();
                    let err = match error {
                        OutboundFailure::DialFailure => SendError::PeerUnreachable { peer, reason },
                        _ => SendError::TransportFailure { peer, reason },
                    };
                    let _ = reply.send(Err(err));
                }
            }
            request_response::Event::InboundFailure { peer, error, .. } => {
                if let InboundFailure::Io(e) = &error {
                    if e.kind() == io::ErrorKind::InvalidData {
                        warn!(%peer, error = %e, "malformed frame, closing connection");
                        // No connection id on inbound failures either.
                        let _ = self.swarm.disconnect_peer_id(peer);
                        return;
                    }
                }
                debug!(%peer, %error, "inbound message failed");
            }
            request_response::Event::ResponseSent { .. } => {}
        }
    }

    fn handle_kad_event(&mut self, event: kad::Event) {
        match event {
            kad::Event::OutboundQueryProgressed {
                id,
                result: QueryResult::GetClosestPeers(_),
                step,
                ..
            } if step.last => {
                let peer = self
                    .pending_lookups
                    .iter_mut()
                    .find(|(_, lookup)| lookup.query == Some(id))
                    .map(|(peer, lookup)| {
                        lookup.query = None;
                        *peer
                    });
                if let Some(peer) = peer {
                    debug!(%peer, "DHT query finished");
                    self.try_finish_lookup(peer);
                }
            }
            kad::Event::RoutingUpdated {
                peer, addresses, ..
            } => {
                self.directory.add_addresses(
                    peer,
                    addresses.iter().cloned(),
                    AddrTtl::DISCOVERED,
                );
                if self.pending_lookups.contains_key(&peer) {
                    self.try_finish_lookup(peer);
                }
            }
            kad::Event::RoutablePeer { peer, address }
            | kad::Event::PendingRoutablePeer { peer, address } => {
                self.directory
                    .add_addresses(peer, [address], AddrTtl::DISCOVERED);
            }
            other => {
                debug!(?other, "kad event");
            }
        }
    }

    fn handle_identify_event(&mut self, event: identify::Event) {
        if let identify::Event::Received { peer_id, info, .. } = event {
            debug!(
                %peer_id,
                protocol = %info.protocol_version,
                agent = %info.agent_version,
                "identified peer"
            );
            self.peer_manager
                .set_agent_version(&peer_id, info.agent_version.clone());
            for addr in &info.listen_addrs {
                self.swarm
                    .behaviour_mut()
                    .kad
                    .add_address(&peer_id, addr.clone());
            }
            self.directory
                .add_addresses(peer_id, info.listen_addrs, AddrTtl::DISCOVERED);
            if self.pending_lookups.contains_key(&peer_id) {
                self.try_finish_lookup(peer_id);
            }
        }
    }
}

//! Integration tests running real node services over loopback TCP.

use std::time::Duration;

use skein_relay::{
    AddrTtl, ConnectError, NetworkConfig, NodeService, PeerAddrInfo, PeerId, SendError,
    ServiceState, StartError,
};
use skein_types::{Message, TransactionMessage};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

const WAIT: Duration = Duration::from_secs(10);

fn tx_message(tag: u8) -> Message {
    Message::Transaction(TransactionMessage {
        extrinsics: vec![vec![tag; 4]],
    })
}

fn local_config() -> NetworkConfig {
    NetworkConfig {
        discovery_timeout: Duration::from_secs(2),
        ..NetworkConfig::local(0)
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn start_node(inbound: Option<mpsc::Sender<Message>>) -> NodeService {
    init_tracing();
    let node = NodeService::new(local_config(), inbound).expect("construct node");
    node.start()
        .await
        .expect("start signal dropped")
        .expect("node failed to start");
    node
}

/// Wait until `node` no longer lists `peer` as connected.
async fn wait_disconnected(node: &NodeService, peer: PeerId) -> bool {
    for _ in 0..100 {
        if !node.connected_peers().await.contains(&peer) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn test_start_stop_restart() {
    let node = NodeService::new(local_config(), None).unwrap();
    assert_eq!(node.state(), ServiceState::Stopped);

    node.start().await.unwrap().unwrap();
    assert!(node.is_running());
    assert!(!node.listen_addrs().is_empty());
    assert!(node.full_addrs()[0].to_string().ends_with(&node.peer_id().to_string()));

    // A second start is rejected while running.
    let second = node.start().await.unwrap();
    assert!(matches!(
        second,
        Err(StartError::AlreadyStarted {
            state: ServiceState::Running
        })
    ));

    let ctx = node.context().expect("running node has a context");
    node.stop().await;
    assert!(ctx.is_cancelled());
    assert_eq!(node.state(), ServiceState::Stopped);
    assert!(node.listen_addrs().is_empty());

    // Stop is idempotent.
    node.stop().await;
    assert_eq!(node.state(), ServiceState::Stopped);

    // And the node can run again under a fresh context.
    node.start().await.unwrap().unwrap();
    assert!(node.is_running());
    assert!(!node.context().unwrap().is_cancelled());
    node.stop().await;
}

#[tokio::test]
async fn test_operations_after_stop_fail() {
    let node = start_node(None).await;
    node.stop().await;

    let peer = PeerId::random();
    assert!(matches!(
        node.send(peer, tx_message(1).encode().unwrap()).await,
        Err(SendError::NotRunning)
    ));
    assert!(matches!(
        node.connect(PeerAddrInfo::new(peer, vec![])).await,
        Err(ConnectError::NotRunning)
    ));
}

#[tokio::test]
async fn test_bind_conflict_fails_start() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let node = NodeService::new(NetworkConfig::local(port), None).unwrap();
    let res = node.start().await.unwrap();
    assert!(matches!(res, Err(StartError::Bind { .. })), "got {:?}", res);
    assert_eq!(node.state(), ServiceState::Stopped);

    // The failed start leaves the node restartable.
    drop(taken);
    node.stop().await;
}

#[tokio::test]
async fn test_connect_and_send() {
    let (tx, mut rx) = mpsc::channel(16);
    let a = start_node(Some(tx)).await;
    let b = start_node(None).await;

    b.connect(a.addr_info()).await.expect("connect failed");
    assert!(b.connected_peers().await.contains(&a.peer_id()));

    let msg = tx_message(7);
    b.send(a.peer_id(), msg.encode().unwrap())
        .await
        .expect("send failed");

    let received = timeout(WAIT, rx.recv()).await.expect("timed out");
    assert_eq!(received, Some(msg));

    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn test_send_resolves_from_directory() {
    let (tx, mut rx) = mpsc::channel(16);
    let a = start_node(Some(tx)).await;
    let b = start_node(None).await;

    // No explicit connect: the address is only in b's directory.
    b.directory()
        .add_addresses(a.peer_id(), a.listen_addrs(), AddrTtl::PERMANENT);

    let msg = tx_message(3);
    b.send(a.peer_id(), msg.encode().unwrap()).await.unwrap();
    assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), Some(msg));
    assert_eq!(b.peer_count().await, 1);

    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn test_messages_keep_per_peer_order() {
    let (tx, mut rx) = mpsc::channel(64);
    let a = start_node(Some(tx)).await;
    let b = start_node(None).await;
    b.connect(a.addr_info()).await.unwrap();

    for n in 0..10u8 {
        b.send(a.peer_id(), tx_message(n).encode().unwrap())
            .await
            .unwrap();
    }
    for n in 0..10u8 {
        assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), Some(tx_message(n)));
    }

    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn test_send_to_unknown_peer_is_unreachable() {
    let node = start_node(None).await;
    let err = node
        .send(PeerId::random(), tx_message(1).encode().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, SendError::PeerUnreachable { .. }), "got {:?}", err);
    node.stop().await;
}

#[tokio::test]
async fn test_connect_to_closed_port_is_unreachable() {
    let node = start_node(None).await;
    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = closed.local_addr().unwrap().port();
    drop(closed);

    let info = PeerAddrInfo::new(
        PeerId::random(),
        vec![format!("/ip4/127.0.0.1/tcp/{}", port).parse().unwrap()],
    );
    let err = node.connect(info).await.unwrap_err();
    assert!(matches!(err, ConnectError::Unreachable { .. }), "got {:?}", err);
    assert!(node.is_running());
    node.stop().await;
}

#[tokio::test]
async fn test_garbage_closes_only_that_peer() {
    let (tx, mut rx) = mpsc::channel(16);
    let a = start_node(Some(tx)).await;
    let bad = start_node(None).await;
    let good = start_node(None).await;

    bad.connect(a.addr_info()).await.unwrap();
    good.connect(a.addr_info()).await.unwrap();

    // Unknown message kind.
    let res = bad.send(a.peer_id(), vec![0xff, 0x01, 0x02]).await;
    assert!(res.is_err(), "garbage should not be acknowledged");
    assert!(wait_disconnected(&a, bad.peer_id()).await);

    let msg = tx_message(9);
    good.send(a.peer_id(), msg.encode().unwrap()).await.unwrap();
    assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), Some(msg));
    assert!(a.is_running());
    assert!(a.connected_peers().await.contains(&good.peer_id()));

    a.stop().await;
    bad.stop().await;
    good.stop().await;
}

#[tokio::test]
async fn test_broadcast_reaches_connected_peers() {
    let (tx1, mut rx1) = mpsc::channel(16);
    let (tx2, mut rx2) = mpsc::channel(16);
    let hub = start_node(None).await;
    let n1 = start_node(Some(tx1)).await;
    let n2 = start_node(Some(tx2)).await;

    hub.connect(n1.addr_info()).await.unwrap();
    hub.connect(n2.addr_info()).await.unwrap();

    let msg = tx_message(5);
    assert_eq!(hub.broadcast(msg.encode().unwrap()).await, 2);
    assert_eq!(timeout(WAIT, rx1.recv()).await.unwrap(), Some(msg.clone()));
    assert_eq!(timeout(WAIT, rx2.recv()).await.unwrap(), Some(msg));

    hub.stop().await;
    n1.stop().await;
    n2.stop().await;
}

#[tokio::test]
async fn test_connection_limit() {
    let config = NetworkConfig {
        max_connections: 1,
        ..local_config()
    };
    let a = NodeService::new(config, None).unwrap();
    a.start().await.unwrap().unwrap();
    let b = start_node(None).await;
    let c = start_node(None).await;

    b.connect(a.addr_info()).await.unwrap();
    c.connect(a.addr_info()).await.ok();

    assert!(wait_disconnected(&c, a.peer_id()).await);
    assert_eq!(a.connected_peers().await, vec![b.peer_id()]);

    a.stop().await;
    b.stop().await;
    c.stop().await;
}

#[tokio::test]
async fn test_send_returns_while_receiver_is_busy() {
    // A's consumer never drains its channel.
    let (tx, mut rx) = mpsc::channel(1);
    let a = start_node(Some(tx)).await;
    let b = start_node(None).await;
    b.connect(a.addr_info()).await.unwrap();

    for n in 0..3u8 {
        let sent = timeout(
            Duration::from_secs(5),
            b.send(a.peer_id(), tx_message(n).encode().unwrap()),
        )
        .await
        .expect("send blocked on a busy receiver");
        assert!(sent.is_ok(), "send {} failed: {:?}", n, sent);
    }

    for n in 0..3u8 {
        assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), Some(tx_message(n)));
    }

    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn test_listener_resolves_peer_right_after_inbound_connect() {
    let a = start_node(None).await;
    let b = start_node(None).await;

    b.connect(a.addr_info()).await.unwrap();
    // A may not have seen the connection yet; the lookup must still land.
    let info = a
        .find_peer(b.peer_id(), WAIT)
        .await
        .expect("listener could not resolve its new peer");
    assert_eq!(info.peer_id, b.peer_id());
    assert!(!info.addrs.is_empty());
    assert!(a.directory().lookup(&b.peer_id()).is_some());

    a.stop().await;
    b.stop().await;
}

/// B finds C through the DHT routing table of A, a node both are connected to.
#[tokio::test]
async fn test_find_peer_through_dht() {
    let a = start_node(None).await;
    let b = start_node(None).await;
    let c = start_node(None).await;

    b.connect(a.addr_info()).await.unwrap();
    c.connect(a.addr_info()).await.unwrap();
    // Let identify populate the routing tables.
    tokio::time::sleep(Duration::from_secs(1)).await;

    // Routing events may already have told B about C; start from a miss.
    if let Some(addrs) = b.directory().lookup(&c.peer_id()) {
        for addr in &addrs {
            b.directory().remove_address(&c.peer_id(), addr);
        }
    }
    assert!(b.directory().lookup(&c.peer_id()).is_none());

    let info = b
        .find_peer(c.peer_id(), WAIT)
        .await
        .expect("lookup failed");
    assert_eq!(info.peer_id, c.peer_id());
    assert!(!info.addrs.is_empty());
    // Written back to the directory.
    assert!(b.directory().lookup(&c.peer_id()).is_some());

    a.stop().await;
    b.stop().await;
    c.stop().await;
}

//! Two-node exchange: node B connects to node A, A resolves B and sends it a
//! block request, B reports the message on its inbound channel.

use std::time::Duration;

use skein_relay::{AddrTtl, NetworkConfig, NodeService};
use skein_types::primitives::hash_from_hex;
use skein_types::{BlockRequestMessage, Direction, Message, RequestedData};
use tokio::sync::mpsc;
use tracing::info;

use crate::error::NodeError;

pub const DEFAULT_PORT_A: u16 = 7004;
pub const DEFAULT_PORT_B: u16 = 7005;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// End block hash carried by the demo request.
pub const DEMO_END_BLOCK_HASH: &str =
    "0xfd19d9ebac759c993fd2e05a1cff9e757d8741c2704c8682c15b5503496b6aa1";

const INBOUND_BUFFER: usize = 16;

#[derive(Debug, Clone)]
pub struct DemoOptions {
    pub port_a: u16,
    pub port_b: u16,
    /// Budget for peer resolution and for the message to arrive.
    pub timeout: Duration,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self {
            port_a: DEFAULT_PORT_A,
            port_b: DEFAULT_PORT_B,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// The block request node A sends to node B.
pub fn block_request() -> Result<Message, NodeError> {
    Ok(Message::BlockRequest(BlockRequestMessage {
        id: 7,
        requested_data: RequestedData::HEADER,
        starting_block: vec![1, 1],
        end_block_hash: Some(hash_from_hex(DEMO_END_BLOCK_HASH)?),
        direction: Direction::Descending,
        max: Some(1),
    }))
}

/// Wait for the next inbound message, failing after `wait`.
pub async fn wait_for_message(
    rx: &mut mpsc::Receiver<Message>,
    wait: Duration,
) -> Result<Message, NodeError> {
    match tokio::time::timeout(wait, rx.recv()).await {
        Ok(Some(message)) => Ok(message),
        Ok(None) => Err(NodeError::ChannelClosed {
            reason: "inbound channel closed".to_string(),
        }),
        Err(_) => Err(NodeError::TimeoutError {
            waited: wait,
            what: "inbound message".to_string(),
        }),
    }
}

/// Start both nodes, run one exchange, stop both nodes.
///
/// Returns the sent and the received message. Any failure along the way,
/// including a failed send, aborts the exchange.
pub async fn run_demo(opts: &DemoOptions) -> Result<(Message, Message), NodeError> {
    let node_a = NodeService::new(NetworkConfig::local(opts.port_a), None)?;
    let (inbound_tx, mut inbound_rx) = mpsc::channel(INBOUND_BUFFER);
    let node_b = NodeService::new(NetworkConfig::local(opts.port_b), Some(inbound_tx))?;

    let result = async {
        start(&node_a).await?;
        start(&node_b).await?;
        exchange(&node_a, &node_b, &mut inbound_rx, opts.timeout).await
    }
    .await;

    node_a.stop().await;
    node_b.stop().await;
    result
}

async fn start(node: &NodeService) -> Result<(), NodeError> {
    node.start().await.map_err(|_| NodeError::ChannelClosed {
        reason: "start signal dropped".to_string(),
    })??;
    Ok(())
}

async fn exchange(
    node_a: &NodeService,
    node_b: &NodeService,
    inbound_rx: &mut mpsc::Receiver<Message>,
    wait: Duration,
) -> Result<(Message, Message), NodeError> {
    let a_info = node_a.addr_info();
    info!(peer = %a_info, "node A listening");
    info!(peer = %node_b.addr_info(), "node B listening");

    node_b.directory().add_info(&a_info, AddrTtl::PERMANENT);
    node_b.connect(a_info).await?;
    info!("node B connected to node A");

    let b_info = node_a.find_peer(node_b.peer_id(), wait).await?;
    info!(peer = %b_info, "node A resolved node B");

    let request = block_request()?;
    let encoded = request.encode()?;
    node_a.send(b_info.peer_id, encoded).await?;
    info!(message = %request, "node A sent request");

    let received = wait_for_message(inbound_rx, wait).await?;
    info!(message = %received, "node B received message");
    Ok((request, received))
}

use std::time::Duration;

use libp2p::StreamProtocol;

/// Frame format version. Bump this whenever the frame layout or the message
/// encoding changes incompatibly.
pub const PROTOCOL_VERSION: u8 = 1;

/// Byte written back once a frame has been decoded and queued for delivery.
pub const ACK_BYTE: u8 = 0x06;

/// Identify protocol version string.
pub const IDENTIFY_PROTOCOL: &str = "/skein/id/1.0.0";

/// Kademlia protocol name. Nodes only share a DHT with peers speaking it.
pub const KAD_PROTOCOL: StreamProtocol = StreamProtocol::new("/skein/kad/1.0.0");

/// Agent string advertised over identify.
pub const AGENT_VERSION: &str = concat!("skein/", env!("CARGO_PKG_VERSION"));

/// How long a direct message may wait for its acknowledgement.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on how long `start()` waits for the listener to come up.
pub const LISTEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the command channel into a node's swarm task.
pub const COMMAND_BUFFER: usize = 256;

/// Decoded messages queued per peer ahead of the inbound channel. Once full,
/// acknowledgements to that peer are held back until the queue drains.
pub const DISPATCH_QUEUE: usize = 64;

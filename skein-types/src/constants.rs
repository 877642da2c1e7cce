use std::time::Duration;

// ─── Wire Parameters ─────────────────────────────────────────────────────────

/// Maximum encoded message size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 4_194_304; // 4 MB

/// Length of a block or state hash.
pub const HASH_LENGTH: usize = 32;

// ─── Network Parameters ──────────────────────────────────────────────────────

/// Default listen port.
pub const DEFAULT_PORT: u16 = 7001;

/// Default stream protocol for direct messages.
pub const DEFAULT_PROTOCOL_ID: &str = "/skein/direct/1.0.0";

/// Maximum number of connected peers.
pub const MAX_PEER_CONNECTIONS: usize = 50;

/// Well-known bootstrap peers. Empty until a public network exists.
pub const DEFAULT_BOOT_NODES: &[&str] = &[];

/// Default time budget for a DHT lookup.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default idle timeout for a connection without open streams.
pub const DEFAULT_IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);

// ─── Address Book Parameters ────────────────────────────────────────────────

/// Lifetime of addresses handed to an explicit connect.
pub const TEMP_ADDR_TTL: Duration = Duration::from_secs(120);

/// Lifetime of addresses observed on a live connection.
pub const RECENTLY_CONNECTED_ADDR_TTL: Duration = Duration::from_secs(600);

/// Lifetime of addresses learned from the DHT or identify.
pub const DISCOVERED_ADDR_TTL: Duration = Duration::from_secs(1_800);

/// How often a running node prunes expired directory entries.
pub const DIRECTORY_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

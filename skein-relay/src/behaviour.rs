use libp2p::identity::Keypair;
use libp2p::kad::{self, store::MemoryStore};
use libp2p::request_response;
use libp2p::swarm::NetworkBehaviour;
use libp2p::StreamProtocol;

use crate::codec::SkeinCodec;
use crate::protocol::{AGENT_VERSION, IDENTIFY_PROTOCOL, KAD_PROTOCOL, REQUEST_TIMEOUT};

/// Combined network behaviour for a skein node.
#[derive(NetworkBehaviour)]
pub struct SkeinBehaviour {
    /// Request-response for direct messaging.
    pub request_response: request_response::Behaviour<SkeinCodec>,
    /// Kademlia DHT for peer discovery.
    pub kad: kad::Behaviour<MemoryStore>,
    /// Identify protocol for peer identification and address exchange.
    pub identify: libp2p::identify::Behaviour,
}

/// Build a SkeinBehaviour from a keypair and the direct-message protocol.
///
/// Returns `Result<SkeinBehaviour, Box<dyn Error + Send + Sync>>` to conform
/// to the `TryIntoBehaviour` trait expected by `SwarmBuilder::with_behaviour`.
pub fn build_behaviour(
    keypair: &Keypair,
    protocol: StreamProtocol,
) -> Result<SkeinBehaviour, Box<dyn std::error::Error + Send + Sync>> {
    let local_peer_id = keypair.public().to_peer_id();

    // --- Request-Response ---
    let request_response = request_response::Behaviour::with_codec(
        SkeinCodec,
        [(protocol, request_response::ProtocolSupport::Full)],
        request_response::Config::default().with_request_timeout(REQUEST_TIMEOUT),
    );

    // --- Kademlia ---
    let kad_config = kad::Config::new(KAD_PROTOCOL);
    let mut kad = kad::Behaviour::with_config(
        local_peer_id,
        MemoryStore::new(local_peer_id),
        kad_config,
    );
    // Answer DHT queries even before an external address is confirmed.
    kad.set_mode(Some(kad::Mode::Server));

    // --- Identify ---
    let identify = libp2p::identify::Behaviour::new(
        libp2p::identify::Config::new(IDENTIFY_PROTOCOL.to_string(), keypair.public())
            .with_agent_version(AGENT_VERSION.to_string()),
    );

    Ok(SkeinBehaviour {
        request_response,
        kad,
        identify,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_behaviour() {
        let keypair = Keypair::generate_ed25519();
        let protocol = StreamProtocol::new("/skein/direct/1.0.0");
        assert!(build_behaviour(&keypair, protocol).is_ok());
    }
}

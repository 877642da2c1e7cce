use crate::constants::HASH_LENGTH;
use crate::error::CodecError;

/// 32-byte block or state hash.
pub type Hash = [u8; 32];

/// Block height.
pub type BlockNumber = u64;

/// Correlation identifier chosen by the sender of a request.
pub type MessageId = u64;

/// Parse a hex string (with or without a `0x` prefix) into a 32-byte hash.
pub fn hash_from_hex(s: &str) -> Result<Hash, CodecError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(digits).map_err(|e| CodecError::Decoding {
        reason: format!("invalid hex hash '{}': {}", s, e),
    })?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| CodecError::Decoding {
        reason: format!("expected {} hash bytes, got {}", HASH_LENGTH, len),
    })
}

/// Render a hash as `0x`-prefixed lowercase hex.
pub fn hash_to_hex(hash: &Hash) -> String {
    format!("0x{}", hex::encode(hash))
}

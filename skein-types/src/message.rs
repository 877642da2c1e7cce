//! Typed protocol messages and their binary encoding.
//!
//! Every message starts with a one-byte kind discriminator followed by the
//! variant's fields in declaration order. Integers are fixed-width little
//! endian, byte strings and lists carry a `u32` length prefix, and every
//! optional field is preceded by a presence byte (`0` absent, `1` present).

use std::fmt;
use std::ops::BitOr;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_MESSAGE_SIZE;
use crate::error::CodecError;
use crate::primitives::{BlockNumber, Hash, MessageId};

/// Discriminator of a [`Message`] variant. The value is the first byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Status = 0,
    BlockRequest = 1,
    BlockResponse = 2,
    BlockAnnounce = 3,
    Transaction = 4,
}

impl MessageKind {
    /// The wire tag of this kind.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Map a wire tag back to its kind.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(MessageKind::Status),
            1 => Some(MessageKind::BlockRequest),
            2 => Some(MessageKind::BlockResponse),
            3 => Some(MessageKind::BlockAnnounce),
            4 => Some(MessageKind::Transaction),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Status => "status",
            MessageKind::BlockRequest => "block-request",
            MessageKind::BlockResponse => "block-response",
            MessageKind::BlockAnnounce => "block-announce",
            MessageKind::Transaction => "transaction",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bit set selecting which block data a request asks for.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct RequestedData(pub u8);

impl RequestedData {
    pub const HEADER: RequestedData = RequestedData(1);
    pub const BODY: RequestedData = RequestedData(2);
    pub const RECEIPT: RequestedData = RequestedData(4);
    pub const MESSAGE_QUEUE: RequestedData = RequestedData(8);
    pub const JUSTIFICATION: RequestedData = RequestedData(16);

    /// Whether every bit of `other` is requested.
    pub fn contains(self, other: RequestedData) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for RequestedData {
    type Output = RequestedData;

    fn bitor(self, rhs: RequestedData) -> RequestedData {
        RequestedData(self.0 | rhs.0)
    }
}

/// Iteration order of a block range request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
#[borsh(use_discriminant = true)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ascending = 0,
    Descending = 1,
}

/// Handshake announcing a node's chain view.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct StatusMessage {
    pub protocol_version: u32,
    pub min_supported_version: u32,
    /// Role bit set of the sender (full, light, authority).
    pub roles: u8,
    pub best_block_number: BlockNumber,
    pub best_block_hash: Hash,
    pub genesis_hash: Hash,
    pub chain_status: Vec<u8>,
}

/// Request for a range of blocks.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct BlockRequestMessage {
    /// Correlation id echoed by the matching response.
    pub id: MessageId,
    pub requested_data: RequestedData,
    /// Start of the range: a block hash or an encoded block number.
    pub starting_block: Vec<u8>,
    pub end_block_hash: Option<Hash>,
    pub direction: Direction,
    /// Upper bound on the number of blocks returned.
    pub max: Option<u32>,
}

/// Answer to a [`BlockRequestMessage`].
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct BlockResponseMessage {
    pub id: MessageId,
    pub data: Vec<u8>,
}

/// Announcement of a newly imported block header.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct BlockAnnounceMessage {
    pub parent_hash: Hash,
    pub number: BlockNumber,
    pub state_root: Hash,
    pub extrinsics_root: Hash,
    pub digest: Vec<Vec<u8>>,
}

impl BlockAnnounceMessage {
    /// BLAKE3 hash of the encoded header fields.
    pub fn block_hash(&self) -> Result<Hash, CodecError> {
        let data = borsh::to_vec(self).map_err(|e| CodecError::Encoding {
            reason: e.to_string(),
        })?;
        Ok(*blake3::hash(&data).as_bytes())
    }
}

/// A batch of opaque extrinsics for the transaction pool.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct TransactionMessage {
    pub extrinsics: Vec<Vec<u8>>,
}

/// Every message exchanged between nodes.
///
/// Variant order fixes the wire discriminator; see [`MessageKind`].
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum Message {
    Status(StatusMessage),
    BlockRequest(BlockRequestMessage),
    BlockResponse(BlockResponseMessage),
    BlockAnnounce(BlockAnnounceMessage),
    Transaction(TransactionMessage),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Status(_) => MessageKind::Status,
            Message::BlockRequest(_) => MessageKind::BlockRequest,
            Message::BlockResponse(_) => MessageKind::BlockResponse,
            Message::BlockAnnounce(_) => MessageKind::BlockAnnounce,
            Message::Transaction(_) => MessageKind::Transaction,
        }
    }

    /// Encode into the self-describing wire form.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let data = borsh::to_vec(self).map_err(|e| CodecError::Encoding {
            reason: e.to_string(),
        })?;

        if data.len() > MAX_MESSAGE_SIZE {
            return Err(CodecError::MessageTooLarge {
                size: data.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        Ok(data)
    }

    /// Decode a message produced by [`Message::encode`].
    ///
    /// The whole slice must be consumed; trailing bytes are an error.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(CodecError::MessageTooLarge {
                size: data.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let tag = *data.first().ok_or_else(|| CodecError::Decoding {
            reason: "empty message".to_string(),
        })?;
        if MessageKind::from_tag(tag).is_none() {
            return Err(CodecError::Decoding {
                reason: format!("unknown message kind {}", tag),
            });
        }

        Message::try_from_slice(data).map_err(|e| CodecError::Decoding {
            reason: e.to_string(),
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Message::Status(s) => write!(f, "status best={}", s.best_block_number),
            Message::BlockRequest(r) => write!(f, "block-request id={}", r.id),
            Message::BlockResponse(r) => {
                write!(f, "block-response id={} len={}", r.id, r.data.len())
            }
            Message::BlockAnnounce(a) => write!(f, "block-announce number={}", a.number),
            Message::Transaction(t) => write!(f, "transaction count={}", t.extrinsics.len()),
        }
    }
}

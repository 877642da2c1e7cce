//! Shared message types and wire encoding for the Skein network.

pub mod constants;
pub mod error;
pub mod message;
pub mod primitives;

pub use error::CodecError;
pub use message::{
    BlockAnnounceMessage, BlockRequestMessage, BlockResponseMessage, Direction, Message,
    MessageKind, RequestedData, StatusMessage, TransactionMessage,
};

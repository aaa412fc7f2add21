//! Error types shared by client and server.

use crate::protocol::{ConnectionId, Delivery};

/// Errors raised while reading or writing length-prefixed frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame size {size} exceeds maximum {max}")]
    TooLarge { size: u32, max: u32 },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("invalid packet encoding: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single message body could not be turned into its typed payload.
///
/// Always recoverable: the message is dropped and the connection stays open.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("message '{name}' expects {expected} bytes, got {actual}")]
    Length {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("message '{name}' version {received} does not match handler version {expected}")]
    VersionMismatch {
        name: String,
        expected: u8,
        received: u8,
    },

    #[error("message '{name}' is malformed: {reason}")]
    Malformed { name: String, reason: String },
}

/// An outbound message could not be handed to the transport.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("connection {0} is not live")]
    NotConnected(ConnectionId),

    #[error("outbound queue for connection {0} is full")]
    Backlogged(ConnectionId),

    #[error("{size} byte body exceeds the {max} byte limit of {delivery:?}")]
    PayloadTooLarge {
        size: usize,
        max: usize,
        delivery: Delivery,
    },

    #[error("failed to encode message: {0}")]
    Encode(#[from] bincode::Error),
}

//! # Shared Wire Protocol
//!
//! Types used by both ends of a session: the packet envelope, the framing that
//! carries it over a byte stream, the fixed-layout named messages and the
//! registry that dispatches them to application handlers.

pub mod error;
pub mod framing;
pub mod message;
pub mod protocol;
pub mod registry;

pub use error::{DecodeError, DeliveryError, FrameError};
pub use framing::{read_frame, read_packet, write_frame, write_packet, FrameConfig};
pub use message::{NamedMessage, TestMsg};
pub use protocol::{
    ConnectionId, Delivery, Packet, MAX_CONNECT_PAYLOAD, MAX_HANDSHAKE_FRAME, MAX_MESSAGE_SIZE,
    MAX_PACKET_PAYLOAD,
};
pub use registry::{Dispatched, MessageRegistry};

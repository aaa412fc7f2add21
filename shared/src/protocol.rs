use crate::error::DeliveryError;
use crate::message::NamedMessage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest approval payload a connecting client may send.
pub const MAX_CONNECT_PAYLOAD: usize = 1024;

/// Upper bound on the first frame of a connection, read before admission.
/// Leaves room for the envelope around a payload slightly over the limit so
/// the peer still gets an explicit rejection.
pub const MAX_HANDSHAKE_FRAME: u32 = 4096;

/// Largest body that fits in a single transport packet.
pub const MAX_PACKET_PAYLOAD: usize = 1400;

/// Largest body a fragmented send may carry (10 MiB).
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Identifier of one live connection, assigned by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Sender id a client sees on messages from the server. Never assigned
    /// to a connection, ids start at 1.
    pub const SERVER: ConnectionId = ConnectionId(0);
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ConnectionId {
    fn from(id: u64) -> Self {
        ConnectionId(id)
    }
}

/// Ordering/reliability contract requested for a single outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Delivery {
    #[default]
    ReliableSequenced,
    ReliableFragmentedSequenced,
    Unreliable,
}

impl Delivery {
    /// Largest body this delivery mode accepts.
    pub fn max_payload(&self) -> usize {
        match self {
            Delivery::ReliableFragmentedSequenced => MAX_MESSAGE_SIZE,
            Delivery::ReliableSequenced | Delivery::Unreliable => MAX_PACKET_PAYLOAD,
        }
    }
}

/// Envelope for everything exchanged over a connection.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    /// First packet from a client, carrying its opaque approval payload.
    ConnectRequest {
        payload: Vec<u8>,
    },
    Approved {
        connection_id: ConnectionId,
    },
    Rejected {
        reason: String,
    },
    /// Application message; `body` is the fixed layout of the message `name`.
    Named {
        name: String,
        version: u8,
        delivery: Delivery,
        body: Vec<u8>,
    },
    Disconnect,
}

impl Packet {
    /// Encodes `message` under `name`, checking the body against the size
    /// class of `delivery`.
    pub fn named<M: NamedMessage>(
        name: &str,
        message: &M,
        delivery: Delivery,
    ) -> Result<Packet, DeliveryError> {
        let body = message.encode()?;
        let max = delivery.max_payload();
        if body.len() > max {
            return Err(DeliveryError::PayloadTooLarge {
                size: body.len(),
                max,
                delivery,
            });
        }

        Ok(Packet::Named {
            name: name.to_string(),
            version: M::VERSION,
            delivery,
            body,
        })
    }
}

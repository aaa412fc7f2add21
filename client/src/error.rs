use shared::{DeliveryError, FrameError};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("connection rejected by server: {0}")]
    Rejected(String),

    #[error("unexpected packet during handshake: {0}")]
    UnexpectedPacket(String),

    #[error("not connected")]
    NotConnected,

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

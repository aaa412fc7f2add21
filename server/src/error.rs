//! Error types for the server core.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("server is already running")]
    AlreadyRunning,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why the transport runs without encryption.
///
/// Never fatal: the server starts in plaintext mode and logs the reason.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportSecurityDegraded {
    #[error("No config file found at {}", .0.display())]
    ConfigArtifactMissing(PathBuf),

    #[error("Config file {} could not be read: {reason}", .path.display())]
    ConfigUnreadable { path: PathBuf, reason: String },

    #[error("No SSL certificate configured")]
    NotConfigured,

    #[error("No SSL certificate found at {}", .0.display())]
    FileMissing(PathBuf),

    #[error("SSL file {} could not be read: {reason}", .path.display())]
    FileUnreadable { path: PathBuf, reason: String },

    #[error("SSL certificate is empty")]
    EmptySecrets,

    #[error("SSL material is invalid: {0}")]
    InvalidMaterial(String),
}

//! Startup configuration: command line, config artifact and TLS secrets.
//!
//! Everything here is read once before the server binds. The resulting
//! [`ServerConfig`] is never mutated afterwards.

use crate::error::TransportSecurityDegraded;
use clap::Parser;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "gameServerConfig/config.json";
pub const DEFAULT_BROADCAST_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about)]
pub struct Args {
    /// Address to bind the listener to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    pub host: String,
    /// Port to listen on
    #[clap(short, long, default_value = "7777")]
    pub port: u16,
    /// Path to the JSON config file holding the SSL certificate and key paths
    #[clap(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
    /// Interval between broadcasts to connected clients, in milliseconds
    #[clap(short, long, default_value = "200", value_parser = clap::value_parser!(u64).range(1..))]
    pub broadcast_interval_ms: u64,
}

/// Contents of the JSON config file. Both paths are optional.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigArtifact {
    #[serde(default)]
    pub ssl_certificate_path: Option<String>,
    #[serde(default)]
    pub ssl_certificate_key_path: Option<String>,
}

/// PEM-encoded certificate chain and private key.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerSecrets {
    pub certificate_pem: String,
    pub private_key_pem: String,
}

impl fmt::Debug for ServerSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSecrets")
            .field("certificate_pem", &format!("{} bytes", self.certificate_pem.len()))
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityMode {
    Secure(ServerSecrets),
    Degraded(TransportSecurityDegraded),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub broadcast_interval: Duration,
    pub security: SecurityMode,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16, security: SecurityMode) -> Self {
        Self {
            host: host.into(),
            port,
            broadcast_interval: DEFAULT_BROADCAST_INTERVAL,
            security,
        }
    }

    pub fn with_broadcast_interval(mut self, interval: Duration) -> Self {
        self.broadcast_interval = interval;
        self
    }

    pub fn from_args(args: &Args) -> Self {
        Self::new(args.host.clone(), args.port, load_security(&args.config))
            .with_broadcast_interval(Duration::from_millis(args.broadcast_interval_ms))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Resolves the TLS secrets named by the config file at `path`.
///
/// Any problem along the way yields [`SecurityMode::Degraded`] instead of an
/// error so the server can still start.
pub fn load_security(path: &Path) -> SecurityMode {
    match read_secrets(path) {
        Ok(secrets) => SecurityMode::Secure(secrets),
        Err(reason) => SecurityMode::Degraded(reason),
    }
}

pub fn read_secrets(path: &Path) -> Result<ServerSecrets, TransportSecurityDegraded> {
    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(TransportSecurityDegraded::ConfigArtifactMissing(
                path.to_path_buf(),
            ));
        }
        Err(e) => {
            return Err(TransportSecurityDegraded::ConfigUnreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
        }
    };

    let artifact: ConfigArtifact =
        serde_json::from_str(&json).map_err(|e| TransportSecurityDegraded::ConfigUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let (cert_path, key_path) = match (
        non_empty(artifact.ssl_certificate_path),
        non_empty(artifact.ssl_certificate_key_path),
    ) {
        (Some(cert), Some(key)) => (PathBuf::from(cert), PathBuf::from(key)),
        _ => return Err(TransportSecurityDegraded::NotConfigured),
    };

    let certificate_pem = read_text(&cert_path)?;
    let private_key_pem = read_text(&key_path)?;

    if certificate_pem.is_empty() || private_key_pem.is_empty() {
        return Err(TransportSecurityDegraded::EmptySecrets);
    }

    Ok(ServerSecrets {
        certificate_pem,
        private_key_pem,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn read_text(path: &Path) -> Result<String, TransportSecurityDegraded> {
    match fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(TransportSecurityDegraded::FileMissing(path.to_path_buf()))
        }
        Err(e) => Err(TransportSecurityDegraded::FileUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

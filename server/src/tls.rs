//! Installs PEM certificate material into the transport's TLS layer.

use crate::config::ServerSecrets;
use crate::error::TransportSecurityDegraded;
use rustls_pemfile::Item;
use std::sync::Arc;
use tokio_rustls::rustls::{Certificate, PrivateKey, ServerConfig};
use tokio_rustls::TlsAcceptor;

/// Builds the TLS acceptor for `secrets`.
///
/// Unparseable material degrades the transport rather than failing startup.
pub fn build_acceptor(secrets: &ServerSecrets) -> Result<TlsAcceptor, TransportSecurityDegraded> {
    let certs: Vec<Certificate> = rustls_pemfile::certs(&mut secrets.certificate_pem.as_bytes())
        .map_err(|e| invalid(format!("failed to parse certificate PEM: {}", e)))?
        .into_iter()
        .map(Certificate)
        .collect();

    if certs.is_empty() {
        return Err(invalid("no certificates found in PEM".to_string()));
    }

    let key = private_key(&secrets.private_key_pem)?;

    let config = ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| invalid(format!("failed to build TLS config: {}", e)))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn private_key(pem: &str) -> Result<PrivateKey, TransportSecurityDegraded> {
    let items = rustls_pemfile::read_all(&mut pem.as_bytes())
        .map_err(|e| invalid(format!("failed to parse key PEM: {}", e)))?;

    items
        .into_iter()
        .find_map(|item| match item {
            Item::PKCS8Key(key) | Item::RSAKey(key) | Item::ECKey(key) => Some(PrivateKey(key)),
            _ => None,
        })
        .ok_or_else(|| invalid("no private key found in PEM".to_string()))
}

fn invalid(reason: String) -> TransportSecurityDegraded {
    TransportSecurityDegraded::InvalidMaterial(reason)
}

//! Runtime registry mapping message names to decode-and-dispatch handlers.
//!
//! Handlers can be installed, replaced and removed while traffic is flowing:
//! a dispatch clones the handler out of the map and releases the lock before
//! decoding, so registration never waits on a slow handler.

use crate::error::DecodeError;
use crate::message::NamedMessage;
use crate::protocol::ConnectionId;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type Handler = Arc<dyn Fn(ConnectionId, &[u8]) -> Result<(), DecodeError> + Send + Sync>;

#[derive(Clone)]
struct Entry {
    version: u8,
    handler: Handler,
}

/// Outcome of a dispatch that did not fail to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Decoded and passed to the registered handler.
    Handled,
    /// No handler for this name; the message was dropped.
    Unregistered,
}

#[derive(Default)]
pub struct MessageRegistry {
    handlers: RwLock<HashMap<String, Entry>>,
}

impl MessageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `handler` for `name`, replacing any previous handler.
    ///
    /// Bodies arriving under `name` are decoded with `M`'s fixed layout and
    /// must carry `M::VERSION`.
    pub async fn register<M, F>(&self, name: impl Into<String>, handler: F)
    where
        M: NamedMessage,
        F: Fn(ConnectionId, M) + Send + Sync + 'static,
    {
        let name = name.into();
        let handler: Handler = Arc::new(move |connection_id: ConnectionId, body: &[u8]| {
            let message = M::decode(body)?;
            handler(connection_id, message);
            Ok(())
        });

        let mut handlers = self.handlers.write().await;
        if handlers
            .insert(
                name.clone(),
                Entry {
                    version: M::VERSION,
                    handler,
                },
            )
            .is_some()
        {
            debug!("Replaced handler for message '{}'", name);
        } else {
            debug!("Registered handler for message '{}'", name);
        }
    }

    /// Removes dispatch for `name`. Returns false if nothing was registered.
    pub async fn unregister(&self, name: &str) -> bool {
        let removed = self.handlers.write().await.remove(name).is_some();
        if removed {
            debug!("Unregistered handler for message '{}'", name);
        }
        removed
    }

    /// Removes every handler, returning how many were installed.
    pub async fn clear(&self) -> usize {
        let mut handlers = self.handlers.write().await;
        let count = handlers.len();
        handlers.clear();
        count
    }

    pub async fn is_registered(&self, name: &str) -> bool {
        self.handlers.read().await.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.handlers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handlers.read().await.is_empty()
    }

    /// Decodes `body` for the handler registered under `name` and invokes it.
    ///
    /// Unknown names are dropped. Version or layout mismatches return a
    /// [`DecodeError`] without calling the handler.
    pub async fn dispatch(
        &self,
        name: &str,
        connection_id: ConnectionId,
        version: u8,
        body: &[u8],
    ) -> Result<Dispatched, DecodeError> {
        let entry = {
            let handlers = self.handlers.read().await;
            handlers.get(name).cloned()
        };

        let Some(entry) = entry else {
            debug!(
                "No handler for message '{}' from {}, dropping",
                name, connection_id
            );
            return Ok(Dispatched::Unregistered);
        };

        if entry.version != version {
            return Err(DecodeError::VersionMismatch {
                name: name.to_string(),
                expected: entry.version,
                received: version,
            });
        }

        (entry.handler)(connection_id, body)?;
        Ok(Dispatched::Handled)
    }
}

//! Server-side session tracking for connected clients
//!
//! This module holds the authoritative table of live sessions:
//! - A session is inserted when the transport reports an approved connection
//! - It is removed when the transport reports the disconnect
//! - Readers take a point-in-time snapshot instead of holding the table
//!
//! The table itself is a plain map; the server wraps it in an async
//! `RwLock` and only ever holds the lock for the duration of one call.

use log::info;
use shared::ConnectionId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Server-assigned state for one connected client
#[derive(Debug, Clone)]
pub struct ClientSession {
    /// Transport connection identifier, stable for the connection's lifetime
    pub connection_id: ConnectionId,
    /// When the session was created
    pub connected_at: Instant,
}

impl ClientSession {
    pub fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            connected_at: Instant::now(),
        }
    }

    /// How long the session has been live
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Mapping from live connection ids to their sessions
///
/// Only connect and disconnect events mutate the table, so at any quiescent
/// point it holds exactly the connections the transport considers live.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<ConnectionId, ClientSession>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a session for an approved connection
    ///
    /// A second connect for an id that is already present replaces the old
    /// entry. Returns true if an entry was replaced.
    pub fn on_connect(&mut self, connection_id: ConnectionId) -> bool {
        info!("Client connected: {}", connection_id);
        self.sessions
            .insert(connection_id, ClientSession::new(connection_id))
            .is_some()
    }

    /// Removes the session for `connection_id`
    ///
    /// Removing an id that is not present is a no-op. Returns the removed
    /// session, if any.
    pub fn on_disconnect(&mut self, connection_id: ConnectionId) -> Option<ClientSession> {
        let removed = self.sessions.remove(&connection_id);
        if removed.is_some() {
            info!("Client disconnected: {}", connection_id);
        }
        removed
    }

    /// Returns the live connection ids, in ascending order
    ///
    /// The result is an owned copy, so callers may iterate and send without
    /// holding any lock on the table.
    pub fn snapshot(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.sessions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn get(&self, connection_id: &ConnectionId) -> Option<&ClientSession> {
        self.sessions.get(connection_id)
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.sessions.contains_key(connection_id)
    }

    /// Drops every session; used during shutdown
    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    /// Returns the number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if no sessions are live
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_creation() {
        let session = ClientSession::new(ConnectionId(7));

        assert_eq!(session.connection_id, ConnectionId(7));
        assert!(session.age() < Duration::from_secs(1));
    }

    #[test]
    fn test_table_creation() {
        let table = SessionTable::new();
        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
        assert!(table.snapshot().is_empty());
    }

    #[test]
    fn test_connect_then_snapshot_includes_id_once() {
        let mut table = SessionTable::new();

        assert!(!table.on_connect(ConnectionId(1)));

        assert_eq!(table.snapshot(), vec![ConnectionId(1)]);
        assert!(table.contains(&ConnectionId(1)));
    }

    #[test]
    fn test_duplicate_connect_overwrites() {
        let mut table = SessionTable::new();
        table.on_connect(ConnectionId(1));
        let first = table.get(&ConnectionId(1)).unwrap().connected_at;

        assert!(table.on_connect(ConnectionId(1)));

        assert_eq!(table.len(), 1);
        assert_eq!(table.snapshot(), vec![ConnectionId(1)]);
        assert!(table.get(&ConnectionId(1)).unwrap().connected_at >= first);
    }

    #[test]
    fn test_disconnect_then_snapshot_excludes_id() {
        let mut table = SessionTable::new();
        table.on_connect(ConnectionId(1));
        table.on_connect(ConnectionId(2));

        let removed = table.on_disconnect(ConnectionId(1));

        assert_eq!(removed.map(|s| s.connection_id), Some(ConnectionId(1)));
        assert_eq!(table.snapshot(), vec![ConnectionId(2)]);
    }

    #[test]
    fn test_disconnect_unknown_is_noop() {
        let mut table = SessionTable::new();
        table.on_connect(ConnectionId(1));

        assert!(table.on_disconnect(ConnectionId(99)).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_snapshot_is_sorted_copy() {
        let mut table = SessionTable::new();
        for id in [5, 3, 9, 1] {
            table.on_connect(ConnectionId(id));
        }

        let snapshot = table.snapshot();
        table.on_disconnect(ConnectionId(3));

        assert_eq!(
            snapshot,
            vec![
                ConnectionId(1),
                ConnectionId(3),
                ConnectionId(5),
                ConnectionId(9)
            ]
        );
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_clear() {
        let mut table = SessionTable::new();
        table.on_connect(ConnectionId(1));
        table.on_connect(ConnectionId(2));

        table.clear();

        assert!(table.is_empty());
    }
}

//! # Session Server Library
//!
//! Server side of a named-message session engine. Clients connect over TCP
//! (TLS when certificates are configured), present an approval payload, and
//! once admitted exchange named, fixed-layout messages with the server. The
//! server periodically broadcasts a message to every connected client.
//!
//! ## Core Responsibilities
//!
//! ### Admission Control
//! Every connection attempt carries a payload that is checked before any
//! session state exists. Payloads above 1024 bytes are always refused; a
//! pluggable [`admission::AdmissionPolicy`] may refuse more.
//!
//! ### Session Tracking
//! The [`session::SessionTable`] holds one entry per live connection and is
//! only mutated by connect and disconnect events on the core task. Readers
//! get sorted snapshots, never the live table.
//!
//! ### Message Dispatch
//! Incoming named messages are decoded and handed to handlers registered in
//! the shared [`shared::MessageRegistry`]. Unknown names are dropped; a body
//! with the wrong layout or version is logged and dropped without closing
//! the connection.
//!
//! ### Broadcasting
//! The [`broadcast::BroadcastScheduler`] sends one message per connected
//! client every interval (200 ms by default). Ticks never overlap and a
//! failed recipient does not stop the rest of the tick.
//!
//! ## Architecture Design
//!
//! ### Event Queue
//! Connection tasks never touch core state. They push
//! [`transport::ServerEvent`]s onto a queue drained by [`network::Server::run`],
//! so session mutations and dispatch happen on one task, in arrival order.
//!
//! ### Per-Connection Writers
//! Outgoing packets are queued to a writer task per connection. Senders never
//! hold a lock across network I/O and a frame is never half-written.
//!
//! ### Degraded Transport
//! Missing, unreadable or invalid certificate material does not stop the
//! server. It binds in plaintext and logs the reason at warn level.
//!
//! ## Module Organization
//!
//! - `admission`: approval payload checks and the policy hook
//! - `broadcast`: periodic fan-out scheduler
//! - `config`: command line, JSON config file and TLS secrets
//! - `error`: server error types
//! - `network`: the server core and its handle
//! - `session`: the session table
//! - `tls`: building the TLS acceptor from PEM material
//! - `transport`: TCP listener, handshake and connection tasks
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::{load_security, ServerConfig};
//! use server::network::Server;
//! use shared::{ConnectionId, NamedMessage, TestMsg};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let security = load_security(Path::new("gameServerConfig/config.json"));
//!     let mut server = Server::bind(ServerConfig::new("0.0.0.0", 7777, security)).await?;
//!
//!     let handle = server.handle();
//!     handle
//!         .registry()
//!         .register(TestMsg::NAME, |id: ConnectionId, msg: TestMsg| {
//!             println!("{} sent {}", id, msg);
//!         })
//!         .await;
//!
//!     // Runs until handle.shutdown() is called
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod admission;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod network;
pub mod session;
pub mod tls;
pub mod transport;

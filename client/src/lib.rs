//! # Session Client Library
//!
//! Client side of the named-message session engine. A client connects to the
//! server (optionally over TLS, validating the server's identity against a
//! CA certificate), presents an approval payload and, once approved, sends
//! and receives named messages.
//!
//! Incoming messages are dispatched through the same
//! [`shared::MessageRegistry`] the server uses, with
//! [`shared::ConnectionId::SERVER`] as the sender.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientConfig};
//! use shared::{ConnectionId, Delivery, MessageRegistry, NamedMessage, TestMsg};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(MessageRegistry::new());
//!     registry
//!         .register(TestMsg::NAME, |_: ConnectionId, msg: TestMsg| println!("{}", msg))
//!         .await;
//!
//!     let config = ClientConfig::new("127.0.0.1:7777", b"hello".to_vec());
//!     let client = Client::connect(config, registry).await?;
//!     client.send_message(TestMsg::NAME, &TestMsg::default(), Delivery::ReliableSequenced)?;
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod network;

pub use error::ClientError;
pub use network::{Client, ClientConfig, ClientSecurity};

//! TCP transport binding with optional TLS.
//!
//! Each accepted connection goes through (optional) TLS, then a single
//! handshake frame carrying the approval payload. Admitted connections get a
//! reader task that forwards events to the server core and a writer task that
//! drains a per-connection queue, so callers only ever enqueue whole packets.

use crate::admission::{AdmissionController, ApprovalRequest};
use dashmap::DashMap;
use log::{debug, error, info, warn};
use shared::{read_packet, write_packet, ConnectionId, DeliveryError, FrameConfig, FrameError, Packet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

/// Events reported by the transport to the server core
#[derive(Debug)]
pub enum ServerEvent {
    Connected {
        connection_id: ConnectionId,
        addr: SocketAddr,
    },
    Disconnected {
        connection_id: ConnectionId,
    },
    MessageReceived {
        connection_id: ConnectionId,
        name: String,
        version: u8,
        body: Vec<u8>,
    },
}

/// Packets queued per connection before sends start failing.
pub const PEER_QUEUE_CAPACITY: usize = 256;

/// Hands packets to live connections.
pub trait Outbound: Send + Sync {
    fn send_packet(&self, connection_id: ConnectionId, packet: Packet) -> Result<(), DeliveryError>;
}

/// Atomic generator for connection ids, starting at 1.
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Outbound queues of every connection the transport considers live.
#[derive(Default)]
pub struct PeerMap {
    peers: DashMap<ConnectionId, mpsc::Sender<Packet>>,
}

impl PeerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, connection_id: ConnectionId, sender: mpsc::Sender<Packet>) {
        self.peers.insert(connection_id, sender);
    }

    pub fn remove(&self, connection_id: &ConnectionId) -> bool {
        self.peers.remove(connection_id).is_some()
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.peers.contains_key(connection_id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Drops every queue. Writers finish what is already queued, then close.
    pub fn clear(&self) {
        self.peers.clear();
    }
}

impl Outbound for PeerMap {
    fn send_packet(&self, connection_id: ConnectionId, packet: Packet) -> Result<(), DeliveryError> {
        let sender = self
            .peers
            .get(&connection_id)
            .map(|entry| entry.value().clone())
            .ok_or(DeliveryError::NotConnected(connection_id))?;

        sender.try_send(packet).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Backlogged(connection_id),
            mpsc::error::TrySendError::Closed(_) => DeliveryError::NotConnected(connection_id),
        })
    }
}

pub struct Transport {
    listener: TcpListener,
    connections: ConnectionContext,
}

impl Transport {
    /// Binds the listener. `acceptor` is installed here, once, before any
    /// connection can be accepted.
    pub async fn bind(
        addr: &str,
        acceptor: Option<TlsAcceptor>,
        admission: Arc<AdmissionController>,
        events: mpsc::UnboundedSender<ServerEvent>,
        shutdown: CancellationToken,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;

        Ok(Self {
            listener,
            connections: ConnectionContext {
                acceptor,
                admission,
                peers: Arc::new(PeerMap::new()),
                id_gen: Arc::new(IdGenerator::new()),
                events,
                shutdown,
            },
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn peers(&self) -> Arc<PeerMap> {
        Arc::clone(&self.connections.peers)
    }

    pub fn is_secure(&self) -> bool {
        self.connections.acceptor.is_some()
    }

    /// Spawns the accept loop, which runs until the shutdown token fires.
    pub fn spawn_accept_loop(self) -> JoinHandle<()> {
        let Transport {
            listener,
            connections,
        } = self;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = connections.shutdown.cancelled() => {
                        debug!("Accept loop stopped");
                        break;
                    }
                    result = listener.accept() => match result {
                        Ok((stream, addr)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                            }
                            let context = connections.clone();
                            tokio::spawn(async move {
                                context.serve(stream, addr).await;
                            });
                        }
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                }
            }
        })
    }
}

#[derive(Clone)]
struct ConnectionContext {
    acceptor: Option<TlsAcceptor>,
    admission: Arc<AdmissionController>,
    peers: Arc<PeerMap>,
    id_gen: Arc<IdGenerator>,
    events: mpsc::UnboundedSender<ServerEvent>,
    shutdown: CancellationToken,
}

impl ConnectionContext {
    async fn serve(self, stream: TcpStream, addr: SocketAddr) {
        match &self.acceptor {
            Some(acceptor) => match acceptor.accept(stream).await {
                Ok(tls) => self.run_connection(tls, addr).await,
                Err(e) => warn!("TLS handshake with {} failed: {}", addr, e),
            },
            None => self.run_connection(stream, addr).await,
        }
    }

    async fn run_connection<S>(&self, stream: S, addr: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let handshake = FrameConfig::handshake();

        let payload = match read_packet(&mut reader, &handshake).await {
            Ok(Packet::ConnectRequest { payload }) => payload,
            Ok(_) => {
                warn!("Expected connect request from {}, closing", addr);
                return;
            }
            Err(e) => {
                warn!("Handshake with {} failed: {}", addr, e);
                return;
            }
        };

        let connection_id = self.id_gen.next_id();
        let response = self.admission.approve(&ApprovalRequest {
            connection_id,
            payload,
        });

        if !response.approved {
            let reason = response
                .rejection
                .map(|r| r.to_string())
                .unwrap_or_else(|| "connection rejected".to_string());
            info!("Rejected connection from {}: {}", addr, reason);

            let _ = write_packet(&mut writer, &Packet::Rejected { reason }, &handshake).await;
            let _ = writer.shutdown().await;
            return;
        }

        if let Err(e) = write_packet(
            &mut writer,
            &Packet::Approved { connection_id },
            &handshake,
        )
        .await
        {
            warn!("Failed to approve connection from {}: {}", addr, e);
            return;
        }

        let (tx, rx) = mpsc::channel(PEER_QUEUE_CAPACITY);
        self.peers.insert(connection_id, tx);

        if self
            .events
            .send(ServerEvent::Connected {
                connection_id,
                addr,
            })
            .is_err()
        {
            self.peers.remove(&connection_id);
            return;
        }

        let writer_task = tokio::spawn(write_loop(writer, rx, connection_id));

        self.read_loop(reader, connection_id).await;

        self.peers.remove(&connection_id);
        let _ = self
            .events
            .send(ServerEvent::Disconnected { connection_id });
        let _ = writer_task.await;
    }

    async fn read_loop<S>(&self, mut reader: ReadHalf<S>, connection_id: ConnectionId)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let config = FrameConfig::default();

        loop {
            let result = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    let _ = self.peers.send_packet(connection_id, Packet::Disconnect);
                    break;
                }
                result = read_packet(&mut reader, &config) => result,
            };

            match result {
                Ok(Packet::Named {
                    name,
                    version,
                    body,
                    ..
                }) => {
                    let event = ServerEvent::MessageReceived {
                        connection_id,
                        name,
                        version,
                        body,
                    };
                    if self.events.send(event).is_err() {
                        break;
                    }
                }
                Ok(Packet::Disconnect) => {
                    debug!("Connection {} sent disconnect", connection_id);
                    break;
                }
                Ok(_) => {
                    warn!("Unexpected packet type from connection {}", connection_id);
                }
                // The frame boundary is intact, only this packet is lost.
                Err(FrameError::Encoding(e)) => {
                    warn!("Dropped undecodable packet from {}: {}", connection_id, e);
                }
                Err(FrameError::ConnectionClosed) => break,
                Err(e) => {
                    warn!("Error reading from connection {}: {}", connection_id, e);
                    break;
                }
            }
        }
    }
}

async fn write_loop<S>(
    mut writer: WriteHalf<S>,
    mut rx: mpsc::Receiver<Packet>,
    connection_id: ConnectionId,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let config = FrameConfig::default();

    while let Some(packet) = rx.recv().await {
        let closing = matches!(packet, Packet::Disconnect);
        if let Err(e) = write_packet(&mut writer, &packet, &config).await {
            debug!("Failed to write to connection {}: {}", connection_id, e);
            break;
        }
        if closing {
            break;
        }
    }

    let _ = writer.shutdown().await;
}

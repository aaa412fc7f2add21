//! Client side of a session: connect, handshake, then a reader task that
//! dispatches named messages and a writer task that drains the send queue.

use crate::error::ClientError;
use log::{debug, info, warn};
use shared::{
    read_packet, write_packet, ConnectionId, Delivery, FrameConfig, FrameError, MessageRegistry,
    NamedMessage, Packet,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::rustls::{self, Certificate, RootCertStore, ServerName};
use tokio_rustls::TlsConnector;

#[derive(Debug, Clone)]
pub enum ClientSecurity {
    Plaintext,
    /// Encrypted transport. `server_name` must match the server certificate,
    /// which must chain to `ca_certificate_pem`.
    Tls {
        server_name: String,
        ca_certificate_pem: String,
    },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: String,
    pub approval_payload: Vec<u8>,
    pub security: ClientSecurity,
}

impl ClientConfig {
    pub fn new(server_addr: impl Into<String>, approval_payload: Vec<u8>) -> Self {
        Self {
            server_addr: server_addr.into(),
            approval_payload,
            security: ClientSecurity::Plaintext,
        }
    }

    pub fn with_tls(mut self, server_name: impl Into<String>, ca_certificate_pem: impl Into<String>) -> Self {
        self.security = ClientSecurity::Tls {
            server_name: server_name.into(),
            ca_certificate_pem: ca_certificate_pem.into(),
        };
        self
    }
}

pub struct Client {
    connection_id: ConnectionId,
    outgoing: Option<mpsc::UnboundedSender<Packet>>,
    connected: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Client {
    /// Connects and presents the approval payload.
    ///
    /// Returns once the server has approved the connection. Incoming named
    /// messages are dispatched through `registry` from then on.
    pub async fn connect(
        config: ClientConfig,
        registry: Arc<MessageRegistry>,
    ) -> Result<Self, ClientError> {
        info!("Connecting to {}...", config.server_addr);
        let stream = TcpStream::connect(&config.server_addr).await?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }

        match config.security {
            ClientSecurity::Plaintext => {
                Self::handshake(stream, config.approval_payload, registry).await
            }
            ClientSecurity::Tls {
                server_name,
                ca_certificate_pem,
            } => {
                let connector = tls_connector(&ca_certificate_pem)?;
                let name = ServerName::try_from(server_name.as_str())
                    .map_err(|e| ClientError::Tls(format!("invalid server name '{}': {}", server_name, e)))?;
                let tls = connector
                    .connect(name, stream)
                    .await
                    .map_err(|e| ClientError::Tls(e.to_string()))?;
                Self::handshake(tls, config.approval_payload, registry).await
            }
        }
    }

    async fn handshake<S>(
        stream: S,
        payload: Vec<u8>,
        registry: Arc<MessageRegistry>,
    ) -> Result<Self, ClientError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let handshake = FrameConfig::handshake();

        write_packet(&mut writer, &Packet::ConnectRequest { payload }, &handshake).await?;

        let connection_id = match read_packet(&mut reader, &handshake).await? {
            Packet::Approved { connection_id } => connection_id,
            Packet::Rejected { reason } => return Err(ClientError::Rejected(reason)),
            other => return Err(ClientError::UnexpectedPacket(format!("{:?}", other))),
        };
        info!("Connected! Connection ID: {}", connection_id);

        let (tx, rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(true));

        let writer = tokio::spawn(write_loop(writer, rx));
        let reader = tokio::spawn(read_loop(reader, registry, Arc::clone(&connected)));

        Ok(Self {
            connection_id,
            outgoing: Some(tx),
            connected,
            reader,
            writer,
        })
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Queues `message` for the server.
    pub fn send_message<M: NamedMessage>(
        &self,
        name: &str,
        message: &M,
        delivery: Delivery,
    ) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let packet = Packet::named(name, message, delivery)?;
        self.outgoing
            .as_ref()
            .ok_or(ClientError::NotConnected)?
            .send(packet)
            .map_err(|_| ClientError::NotConnected)
    }

    /// Tells the server we are leaving and waits for both tasks to stop.
    pub async fn disconnect(mut self) {
        if let Some(outgoing) = self.outgoing.take() {
            let _ = outgoing.send(Packet::Disconnect);
        }
        let _ = (&mut self.writer).await;
        self.reader.abort();
        let _ = (&mut self.reader).await;
        self.connected.store(false, Ordering::Release);
        info!("Disconnected from server");
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

fn tls_connector(ca_certificate_pem: &str) -> Result<TlsConnector, ClientError> {
    let certs = rustls_pemfile::certs(&mut ca_certificate_pem.as_bytes())
        .map_err(|e| ClientError::Tls(format!("failed to parse CA certificate: {}", e)))?;

    let mut roots = RootCertStore::empty();
    for cert in certs {
        roots
            .add(&Certificate(cert))
            .map_err(|e| ClientError::Tls(format!("invalid CA certificate: {}", e)))?;
    }

    if roots.is_empty() {
        return Err(ClientError::Tls("no CA certificates found in PEM".to_string()));
    }

    let config = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

async fn read_loop<S>(
    mut reader: ReadHalf<S>,
    registry: Arc<MessageRegistry>,
    connected: Arc<AtomicBool>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let config = FrameConfig::default();

    loop {
        match read_packet(&mut reader, &config).await {
            Ok(Packet::Named {
                name,
                version,
                body,
                ..
            }) => {
                if let Err(e) = registry
                    .dispatch(&name, ConnectionId::SERVER, version, &body)
                    .await
                {
                    warn!("Dropped message '{}' from server: {}", name, e);
                }
            }
            Ok(Packet::Disconnect) => {
                info!("Server closed the connection");
                break;
            }
            Ok(other) => warn!("Unexpected packet from server: {:?}", other),
            Err(FrameError::Encoding(e)) => warn!("Failed to decode packet from server: {}", e),
            Err(FrameError::ConnectionClosed) => {
                info!("Connection to server lost");
                break;
            }
            Err(e) => {
                warn!("Error reading from server: {}", e);
                break;
            }
        }
    }

    connected.store(false, Ordering::Release);
}

async fn write_loop<S>(mut writer: WriteHalf<S>, mut outgoing: mpsc::UnboundedReceiver<Packet>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let config = FrameConfig::default();

    while let Some(packet) = outgoing.recv().await {
        let last = packet == Packet::Disconnect;
        if let Err(e) = write_packet(&mut writer, &packet, &config).await {
            warn!("Error sending to server: {}", e);
            break;
        }
        if last {
            break;
        }
    }

    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::TestMsg;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// Accepts one connection, answers the handshake with `reply` and returns
    /// the stream plus the payload the client presented.
    async fn fake_server(reply: Packet) -> (SocketAddr, JoinHandle<(TcpStream, Vec<u8>)>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let task = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let handshake = FrameConfig::handshake();
            let payload = match read_packet(&mut stream, &handshake).await.unwrap() {
                Packet::ConnectRequest { payload } => payload,
                other => panic!("expected connect request, got {:?}", other),
            };
            write_packet(&mut stream, &reply, &handshake).await.unwrap();
            (stream, payload)
        });

        (addr, task)
    }

    #[tokio::test]
    async fn test_connect_returns_assigned_id() {
        let (addr, server) = fake_server(Packet::Approved {
            connection_id: ConnectionId(3),
        })
        .await;

        let config = ClientConfig::new(addr.to_string(), b"let me in".to_vec());
        let client = Client::connect(config, Arc::new(MessageRegistry::new()))
            .await
            .unwrap();

        let (_stream, payload) = server.await.unwrap();
        assert_eq!(client.connection_id(), ConnectionId(3));
        assert!(client.is_connected());
        assert_eq!(payload, b"let me in");
    }

    #[tokio::test]
    async fn test_rejection_is_reported() {
        let (addr, _server) = fake_server(Packet::Rejected {
            reason: "payload too large".to_string(),
        })
        .await;

        let config = ClientConfig::new(addr.to_string(), Vec::new());
        match Client::connect(config, Arc::new(MessageRegistry::new())).await {
            Err(ClientError::Rejected(reason)) => assert_eq!(reason, "payload too large"),
            Err(other) => panic!("unexpected error {}", other),
            Ok(_) => panic!("connection should be rejected"),
        }
    }

    #[tokio::test]
    async fn test_incoming_messages_dispatch_from_server() {
        let (addr, server) = fake_server(Packet::Approved {
            connection_id: ConnectionId(1),
        })
        .await;

        let registry = Arc::new(MessageRegistry::new());
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        registry
            .register(TestMsg::NAME, move |from: ConnectionId, msg: TestMsg| {
                let _ = seen_tx.send((from, msg));
            })
            .await;

        let config = ClientConfig::new(addr.to_string(), Vec::new());
        let _client = Client::connect(config, registry).await.unwrap();
        let (mut stream, _) = server.await.unwrap();

        let msg = TestMsg {
            bool_value: true,
            int_value: 1,
            ulong_value: 1,
        };
        let packet = Packet::named(TestMsg::NAME, &msg, Delivery::ReliableFragmentedSequenced).unwrap();
        write_packet(&mut stream, &packet, &FrameConfig::default())
            .await
            .unwrap();

        let (from, received) = tokio::time::timeout(Duration::from_secs(2), seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(from, ConnectionId::SERVER);
        assert_eq!(received, msg);
    }

    #[tokio::test]
    async fn test_send_and_disconnect() {
        let (addr, server) = fake_server(Packet::Approved {
            connection_id: ConnectionId(2),
        })
        .await;

        let config = ClientConfig::new(addr.to_string(), Vec::new());
        let client = Client::connect(config, Arc::new(MessageRegistry::new()))
            .await
            .unwrap();
        let (mut stream, _) = server.await.unwrap();

        let msg = TestMsg {
            bool_value: false,
            int_value: 9,
            ulong_value: 2,
        };
        tokio_test::assert_ok!(client.send_message(TestMsg::NAME, &msg, Delivery::ReliableSequenced));
        client.disconnect().await;

        let config = FrameConfig::default();
        match read_packet(&mut stream, &config).await.unwrap() {
            Packet::Named { name, body, .. } => {
                assert_eq!(name, TestMsg::NAME);
                assert_eq!(TestMsg::decode(&body).unwrap(), msg);
            }
            other => panic!("unexpected packet {:?}", other),
        }
        assert_eq!(read_packet(&mut stream, &config).await.unwrap(), Packet::Disconnect);
    }

    #[tokio::test]
    async fn test_server_disconnect_marks_client_disconnected() {
        let (addr, server) = fake_server(Packet::Approved {
            connection_id: ConnectionId(5),
        })
        .await;

        let config = ClientConfig::new(addr.to_string(), Vec::new());
        let client = Client::connect(config, Arc::new(MessageRegistry::new()))
            .await
            .unwrap();
        let (stream, _) = server.await.unwrap();
        drop(stream);

        for _ in 0..100 {
            if !client.is_connected() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!client.is_connected());

        let msg = TestMsg::default();
        assert!(matches!(
            client.send_message(TestMsg::NAME, &msg, Delivery::Unreliable),
            Err(ClientError::NotConnected)
        ));
    }

    #[test]
    fn test_invalid_ca_pem_is_rejected() {
        assert!(matches!(
            tls_connector("not a certificate"),
            Err(ClientError::Tls(_))
        ));
    }
}

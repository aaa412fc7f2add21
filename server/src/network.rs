//! Server core: owns the session table, the message registry and the
//! broadcast scheduler, and drains transport events on a single task.

use crate::admission::AdmissionController;
use crate::broadcast::BroadcastScheduler;
use crate::config::{SecurityMode, ServerConfig};
use crate::error::ServerError;
use crate::session::SessionTable;
use crate::tls;
use crate::transport::{Outbound, PeerMap, ServerEvent, Transport};
use log::{debug, info, warn};
use shared::{ConnectionId, Delivery, DeliveryError, Dispatched, MessageRegistry, NamedMessage, Packet};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cloneable access to a running server.
///
/// Handed to whatever needs to register handlers, send messages or stop the
/// server.
#[derive(Clone)]
pub struct ServerHandle {
    registry: Arc<MessageRegistry>,
    sessions: Arc<RwLock<SessionTable>>,
    peers: Arc<PeerMap>,
    security: Arc<SecurityMode>,
    shutdown: CancellationToken,
}

impl ServerHandle {
    pub fn registry(&self) -> Arc<MessageRegistry> {
        Arc::clone(&self.registry)
    }

    /// Encodes `message` under `name` and queues it for `connection_id`.
    pub fn send_message<M: NamedMessage>(
        &self,
        connection_id: ConnectionId,
        name: &str,
        message: &M,
        delivery: Delivery,
    ) -> Result<(), DeliveryError> {
        let packet = Packet::named(name, message, delivery)?;
        self.peers.send_packet(connection_id, packet)?;
        debug!("Sent '{}' to client {}", name, connection_id);
        Ok(())
    }

    /// Ids of all connected clients at the time of the call.
    pub async fn snapshot(&self) -> Vec<ConnectionId> {
        self.sessions.read().await.snapshot()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Security the transport actually runs with.
    ///
    /// Secrets that failed to install are reported as degraded here.
    pub fn security_mode(&self) -> &SecurityMode {
        &self.security
    }

    pub fn is_secure(&self) -> bool {
        matches!(*self.security, SecurityMode::Secure(_))
    }

    /// Requests shutdown. `Server::run` returns once teardown completes.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

pub struct Server {
    local_addr: SocketAddr,
    transport: Option<Transport>,
    transport_shutdown: CancellationToken,
    events: mpsc::UnboundedReceiver<ServerEvent>,
    scheduler: BroadcastScheduler,
    handle: ServerHandle,
}

impl Server {
    /// Binds with the default admission controller.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        Self::bind_with_admission(config, AdmissionController::default()).await
    }

    /// Binds the listener and installs TLS when secrets are present.
    ///
    /// Missing or unusable secrets never fail the bind; the server then runs
    /// in plaintext and says so at warn level.
    pub async fn bind_with_admission(
        config: ServerConfig,
        admission: AdmissionController,
    ) -> Result<Self, ServerError> {
        let addr = config.bind_address();
        let broadcast_interval = config.broadcast_interval;

        let (acceptor, security) = match config.security {
            SecurityMode::Secure(secrets) => match tls::build_acceptor(&secrets) {
                Ok(acceptor) => {
                    info!("SSL certificate set");
                    (Some(acceptor), SecurityMode::Secure(secrets))
                }
                Err(reason) => (None, SecurityMode::Degraded(reason)),
            },
            SecurityMode::Degraded(reason) => (None, SecurityMode::Degraded(reason)),
        };

        if let SecurityMode::Degraded(reason) = &security {
            warn!(
                "{}. Running without encryption, connections are not secure",
                reason
            );
        }

        let (events_tx, events) = mpsc::unbounded_channel();
        let transport_shutdown = CancellationToken::new();

        let transport = Transport::bind(
            &addr,
            acceptor,
            Arc::new(admission),
            events_tx,
            transport_shutdown.clone(),
        )
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

        let local_addr = transport.local_addr()?;
        info!("Server listening on {}", local_addr);

        let handle = ServerHandle {
            registry: Arc::new(MessageRegistry::new()),
            sessions: Arc::new(RwLock::new(SessionTable::new())),
            peers: transport.peers(),
            security: Arc::new(security),
            shutdown: CancellationToken::new(),
        };

        Ok(Self {
            local_addr,
            transport: Some(transport),
            transport_shutdown,
            events,
            scheduler: BroadcastScheduler::new(broadcast_interval),
            handle,
        })
    }

    /// Replaces the default `TestMsg` broadcast.
    pub fn with_scheduler(mut self, scheduler: BroadcastScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Accepts connections and drains transport events until
    /// [`ServerHandle::shutdown`] is called, then tears everything down.
    pub async fn run(&mut self) -> Result<(), ServerError> {
        let transport = self.transport.take().ok_or(ServerError::AlreadyRunning)?;
        let accept_task = transport.spawn_accept_loop();

        let outbound: Arc<dyn Outbound> = self.handle.peers.clone();
        self.scheduler
            .start(Arc::clone(&self.handle.sessions), outbound);

        loop {
            tokio::select! {
                _ = self.handle.shutdown.cancelled() => break,
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
            }
        }

        self.teardown(accept_task).await;
        Ok(())
    }

    async fn handle_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::Connected {
                connection_id,
                addr,
            } => {
                debug!("Connection {} established from {}", connection_id, addr);
                let replaced = self.handle.sessions.write().await.on_connect(connection_id);
                if replaced {
                    warn!("Session for client {} replaced", connection_id);
                }
            }
            ServerEvent::Disconnected { connection_id } => {
                self.handle.sessions.write().await.on_disconnect(connection_id);
            }
            ServerEvent::MessageReceived {
                connection_id,
                name,
                version,
                body,
            } => {
                match self
                    .handle
                    .registry
                    .dispatch(&name, connection_id, version, &body)
                    .await
                {
                    Ok(Dispatched::Handled) | Ok(Dispatched::Unregistered) => {}
                    Err(e) => warn!("Dropped message from client {}: {}", connection_id, e),
                }
            }
        }
    }

    /// Handlers go first so nothing is dispatched into a half-torn-down
    /// server. The transport goes last.
    async fn teardown(&mut self, accept_task: JoinHandle<()>) {
        info!("Shutting down server");

        let removed = self.handle.registry.clear().await;
        debug!("Unregistered {} message handlers", removed);

        self.scheduler.stop().await;

        self.handle.sessions.write().await.clear();

        self.transport_shutdown.cancel();
        let _ = accept_task.await;

        info!("Server stopped");
    }
}

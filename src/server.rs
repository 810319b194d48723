//! # Session Server
//!
//! TCP acceptor for the line protocol. Every admitted connection gets its own
//! task running a [`ConnectionHandler`]; connections above the configured
//! ceiling are refused with an `ERROR` reply instead of being queued.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use session_coordinator::config::ServerConfig;
//! use session_coordinator::lock::FileLock;
//! use session_coordinator::protocol::ConnectionHandler;
//! use session_coordinator::registry::SessionCoordinator;
//! use session_coordinator::server::SessionServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handler = ConnectionHandler::new(
//!         Arc::new(SessionCoordinator::new()),
//!         Arc::new(FileLock::in_temp_dir()?),
//!         Duration::from_secs(300),
//!     );
//!     let server = SessionServer::new(ServerConfig::default(), handler);
//!     let address = server.start().await?;
//!     println!("listening on {address}");
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, OwnedSemaphorePermit, RwLock, Semaphore};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::protocol::{ConnectionHandler, Reply};

/// Accepts connections and dispatches them to handlers.
#[derive(Clone)]
pub struct SessionServer {
    config: ServerConfig,
    handler: Arc<ConnectionHandler>,

    /// Admission gate; `None` when connections are unlimited.
    admission: Option<Arc<Semaphore>>,

    /// Live-connection gauge and counters
    gauges: Arc<ConnectionGauges>,

    shutdown_tx: broadcast::Sender<()>,

    server_state: Arc<RwLock<ServerState>>,
}

impl SessionServer {
    pub fn new(config: ServerConfig, handler: ConnectionHandler) -> Self {
        let admission = (config.max_connections > 0)
            .then(|| Arc::new(Semaphore::new(config.max_connections)));
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            config,
            handler: Arc::new(handler),
            admission,
            gauges: Arc::new(ConnectionGauges::default()),
            shutdown_tx,
            server_state: Arc::new(RwLock::new(ServerState::default())),
        }
    }

    /// Bind the configured address and begin accepting connections. Returns
    /// the bound address, which differs from the configured one for port 0.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        let mut state = self.server_state.write().await;
        if state.running {
            return Err(ServerError::ServerAlreadyRunning);
        }

        let bind_address = self.config.bind_address();
        let listener = TcpListener::bind(&bind_address)
            .await
            .map_err(|e| ServerError::BindFailed {
                address: bind_address.clone(),
                error: e.to_string(),
            })?;
        let local_address = listener
            .local_addr()
            .map_err(|e| ServerError::BindFailed {
                address: bind_address.clone(),
                error: e.to_string(),
            })?;

        state.running = true;
        state.start_time = Some(chrono::Utc::now());
        state.local_address = Some(local_address);
        drop(state);

        info!(
            address = %local_address,
            max_connections = self.config.max_connections,
            "Session server listening"
        );

        let server = self.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            server.accept_connections(listener, shutdown_rx).await;
        });

        Ok(local_address)
    }

    /// Stop accepting connections. Handlers already running finish their
    /// exchange.
    pub async fn stop(&self) -> Result<(), ServerError> {
        let mut state = self.server_state.write().await;
        if !state.running {
            return Ok(());
        }

        info!("Stopping session server");
        let _ = self.shutdown_tx.send(());
        state.running = false;
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.server_state.read().await.running
    }

    pub async fn local_address(&self) -> Option<SocketAddr> {
        self.server_state.read().await.local_address
    }

    /// Get server statistics
    pub async fn stats(&self) -> ServerStats {
        let state = self.server_state.read().await;

        ServerStats {
            running: state.running,
            uptime_seconds: state
                .start_time
                .map(|start| (chrono::Utc::now() - start).num_seconds().max(0) as u64)
                .unwrap_or(0),
            total_connections: self.gauges.total.load(Ordering::Relaxed),
            active_connections: self.gauges.active.load(Ordering::Relaxed),
            rejected_connections: self.gauges.rejected.load(Ordering::Relaxed),
        }
    }

    /// Connection acceptance loop
    async fn accept_connections(&self, listener: TcpListener, mut shutdown_rx: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => self.admit(stream, peer).await,
                        Err(e) => error!("Failed to accept connection: {}", e),
                    }
                }

                _ = shutdown_rx.recv() => {
                    info!("Connection acceptance loop shutting down");
                    break;
                }
            }
        }
    }

    async fn admit(&self, stream: TcpStream, peer: SocketAddr) {
        self.gauges.total.fetch_add(1, Ordering::Relaxed);

        let permit = match &self.admission {
            None => None,
            Some(semaphore) => match semaphore.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    self.reject(stream, peer).await;
                    return;
                }
            },
        };

        let live = ActiveConnection::enter(self.gauges.clone(), permit);
        debug!(peer = %peer, active = live.active(), "Connection admitted");

        let handler = self.handler.clone();
        tokio::spawn(async move {
            handler.handle_connection(stream, peer).await;
            drop(live);
        });
    }

    async fn reject(&self, mut stream: TcpStream, peer: SocketAddr) {
        self.gauges.rejected.fetch_add(1, Ordering::Relaxed);

        let reply = Reply::Error(format!(
            "Max Connections Reached:  {}",
            self.config.max_connections
        ));
        warn!(peer = %peer, "{}", reply.message());

        if let Err(e) = reply.write_to(&mut stream).await {
            debug!(peer = %peer, error = %e, "Failed to write rejection");
        }
        let _ = stream.shutdown().await;
    }
}

#[derive(Debug, Default)]
struct ConnectionGauges {
    total: AtomicU64,
    active: AtomicUsize,
    rejected: AtomicU64,
}

/// Holds a connection slot for as long as its handler runs.
struct ActiveConnection {
    gauges: Arc<ConnectionGauges>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl ActiveConnection {
    fn enter(gauges: Arc<ConnectionGauges>, permit: Option<OwnedSemaphorePermit>) -> Self {
        gauges.active.fetch_add(1, Ordering::Relaxed);
        Self {
            gauges,
            _permit: permit,
        }
    }

    fn active(&self) -> usize {
        self.gauges.active.load(Ordering::Relaxed)
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.gauges.active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Server state information
#[derive(Debug, Default)]
struct ServerState {
    running: bool,
    start_time: Option<chrono::DateTime<chrono::Utc>>,
    local_address: Option<SocketAddr>,
}

/// Session server statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStats {
    pub running: bool,
    pub uptime_seconds: u64,
    pub total_connections: u64,
    pub active_connections: usize,
    pub rejected_connections: u64,
}

/// Session server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Server is already running")]
    ServerAlreadyRunning,

    #[error("Failed to bind to address {address}: {error}")]
    BindFailed { address: String, error: String },
}

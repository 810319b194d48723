//! Per-connection request handling.

use std::net::{Shutdown, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::{NodesRequest, PendingRequest, ProtocolError, Reply, Request, RequestReader, SessionRequest};
use crate::constants::{node_replies, EMPTY_NODE_LIST, LIST_DELIMITER, NODE_LIST_PREFIX};
use crate::lock::CrossProcessLock;
use crate::registry::{NodeOutcome, SessionCoordinator};

/// Reads one request from a connection, applies it to the registry while
/// holding the cross-process lock, and writes the reply.
#[derive(Debug, Clone)]
pub struct ConnectionHandler {
    coordinator: Arc<SessionCoordinator>,
    lock: Arc<dyn CrossProcessLock>,
    lock_timeout: Duration,
    read_timeout: Option<Duration>,
}

impl ConnectionHandler {
    pub fn new(
        coordinator: Arc<SessionCoordinator>,
        lock: Arc<dyn CrossProcessLock>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            coordinator,
            lock,
            lock_timeout,
            read_timeout: None,
        }
    }

    /// Bound each request line read. Without it a silent client holds its
    /// connection slot until it disconnects.
    pub fn with_read_timeout(mut self, read_timeout: Option<Duration>) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn coordinator(&self) -> &Arc<SessionCoordinator> {
        &self.coordinator
    }

    /// Serves one accepted socket, then shuts down its read side.
    pub async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let reply = self.serve(&mut reader, &mut write_half).await;
        debug!(peer = %peer, replied = reply.is_some(), "Request finished");

        // Input is no longer needed
        match reader.into_inner().reunite(write_half) {
            Ok(stream) => {
                if let Err(e) = stream
                    .into_std()
                    .and_then(|stream| stream.shutdown(Shutdown::Read))
                {
                    debug!(peer = %peer, error = %e, "Shutting down read side failed");
                }
            }
            Err(e) => debug!(peer = %peer, error = %e, "Could not reunite connection halves"),
        }
    }

    /// Runs one request/reply exchange over any stream pair. Returns the reply
    /// that was written, `None` for `TEST`.
    pub async fn serve<R, W>(&self, reader: R, writer: &mut W) -> Option<Reply>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let reply = match RequestReader::new(reader, self.read_timeout).read_request().await {
            Ok(Request::Test) => {
                debug!("Connectivity probe received");
                return None;
            }
            Ok(Request::Pending(action)) => {
                self.execute(writer, |handler| handler.apply_pending(action))
                    .await
            }
            Ok(Request::Session(action)) => {
                self.execute(writer, |handler| handler.apply_session(action))
                    .await
            }
            Ok(Request::Nodes(action)) => {
                self.execute(writer, |handler| handler.apply_nodes(action))
                    .await
            }
            Err(ProtocolError::ConnectionClosed) => {
                debug!("Client closed the connection before completing a request");
                Reply::Error(ProtocolError::ConnectionClosed.to_string())
            }
            Err(e) => Reply::Error(e.to_string()),
        };

        if !reply.is_success() {
            self.send(&reply, writer).await;
        }
        Some(reply)
    }

    /// Acquires the lock, applies the mutation and writes the success reply
    /// before the lock is given up. Error replies are returned unsent.
    async fn execute<W, F>(&self, writer: &mut W, mutation: F) -> Reply
    where
        W: AsyncWrite + Unpin,
        F: FnOnce(&Self) -> Reply,
    {
        let token = match self.lock.try_acquire(self.lock_timeout).await {
            Ok(token) => token,
            Err(e) => return Reply::Error(e.to_string()),
        };

        let reply = mutation(self);
        if reply.is_success() {
            self.send(&reply, writer).await;
        }

        token.release();
        reply
    }

    fn apply_pending(&self, action: PendingRequest) -> Reply {
        let pending = match action {
            PendingRequest::Increase => {
                debug!("Pending Session Add");
                self.coordinator.add_pending()
            }
            PendingRequest::Decrease => {
                debug!("Pending Session Remove");
                self.coordinator.remove_pending()
            }
            PendingRequest::Count => self.coordinator.pending_count(),
            PendingRequest::Reset => {
                debug!("Pending Session Reset");
                self.coordinator.reset_pending();
                0
            }
        };
        Reply::Success(pending.to_string())
    }

    fn apply_session(&self, action: SessionRequest) -> Reply {
        let count = match action {
            SessionRequest::Increase(node) => {
                debug!(node = %node, "Session Add");
                self.coordinator.add_session(&node)
            }
            SessionRequest::Decrease(node) => {
                debug!(node = %node, "Session Remove");
                self.coordinator.remove_session(&node)
            }
            SessionRequest::Count(node) => self.coordinator.session_count(&node),
            SessionRequest::ResetAll => {
                debug!("Session Reset All");
                self.coordinator.reset_all_sessions();
                0
            }
            SessionRequest::ResetNode(node) => {
                debug!(node = %node, "Session Reset");
                self.coordinator.reset_sessions(&node);
                0
            }
            SessionRequest::List => return Reply::Success(self.coordinator.known_hosts()),
        };
        Reply::Success(count.to_string())
    }

    fn apply_nodes(&self, action: NodesRequest) -> Reply {
        match action {
            NodesRequest::Add(address) => match self.coordinator.add_node(&address) {
                NodeOutcome::Applied => Reply::Success(format!("{}{address}", node_replies::ADDED)),
                NodeOutcome::Unchanged => {
                    Reply::Success(format!("{}{address}", node_replies::DUPLICATE))
                }
                NodeOutcome::Invalid => Reply::Error(format!("{}{address}", node_replies::INVALID)),
            },
            NodesRequest::Remove(address) => match self.coordinator.remove_node(&address) {
                NodeOutcome::Applied => {
                    Reply::Success(format!("{}{address}", node_replies::REMOVED))
                }
                NodeOutcome::Unchanged => {
                    Reply::Success(format!("{}{address}", node_replies::NOT_FOUND))
                }
                NodeOutcome::Invalid => Reply::Error(format!("{}{address}", node_replies::INVALID)),
            },
            NodesRequest::List => {
                let nodes = self.coordinator.list_nodes();
                let body = if nodes.is_empty() {
                    EMPTY_NODE_LIST.to_string()
                } else {
                    nodes.join(LIST_DELIMITER)
                };
                Reply::Success(format!("{NODE_LIST_PREFIX}{body}"))
            }
        }
    }

    async fn send<W: AsyncWrite + Unpin>(&self, reply: &Reply, writer: &mut W) {
        match reply {
            Reply::Success(message) => info!("{}", message),
            Reply::Error(message) => warn!("{}", message),
        }

        if let Err(e) = reply.write_to(writer).await {
            warn!(error = %e, "Failed to write reply");
        }
    }
}

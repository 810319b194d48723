//! # Session Client
//!
//! Issues the line protocol from test processes. Every call opens a fresh
//! connection, sends one request and reads the two-line reply.
//!
//! ```rust,no_run
//! use session_coordinator::client::SessionClient;
//!
//! # tokio_test::block_on(async {
//! let client = SessionClient::new("127.0.0.1", 4000);
//! client.add_pending().await?;
//! // ... launch the browser session on a node ...
//! client.add_session("10.0.0.5:4444").await?;
//! client.remove_pending().await?;
//! # Ok::<(), session_coordinator::client::ClientError>(())
//! # });
//! ```

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::constants::{node_replies, EMPTY_NODE_LIST, LIST_DELIMITER, NODE_LIST_PREFIX};
use crate::protocol::{NodesRequest, PendingRequest, Reply, Request, SessionRequest};
use crate::registry::{NodeKey, NodeOutcome};

/// Client for one session server.
#[derive(Debug, Clone)]
pub struct SessionClient {
    server: String,
    port: u16,
    timeout: Option<Duration>,
}

impl SessionClient {
    pub fn new(server: impl Into<String>, port: u16) -> Self {
        Self {
            server: server.into(),
            port,
            timeout: None,
        }
    }

    /// Bound every exchange, connection included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }

    /// Connectivity probe: the server accepts `TEST` and replies nothing.
    pub async fn test_connection(&self) -> Result<(), ClientError> {
        self.bounded(self.probe()).await
    }

    pub async fn add_pending(&self) -> Result<u32, ClientError> {
        self.count(Request::Pending(PendingRequest::Increase)).await
    }

    pub async fn remove_pending(&self) -> Result<u32, ClientError> {
        self.count(Request::Pending(PendingRequest::Decrease)).await
    }

    pub async fn pending_count(&self) -> Result<u32, ClientError> {
        self.count(Request::Pending(PendingRequest::Count)).await
    }

    pub async fn reset_pending(&self) -> Result<(), ClientError> {
        self.count(Request::Pending(PendingRequest::Reset))
            .await
            .map(|_| ())
    }

    pub async fn add_session(&self, node: &str) -> Result<u32, ClientError> {
        self.count(Request::Session(SessionRequest::Increase(parse_key(node)?)))
            .await
    }

    pub async fn remove_session(&self, node: &str) -> Result<u32, ClientError> {
        self.count(Request::Session(SessionRequest::Decrease(parse_key(node)?)))
            .await
    }

    pub async fn session_count(&self, node: &str) -> Result<u32, ClientError> {
        self.count(Request::Session(SessionRequest::Count(parse_key(node)?)))
            .await
    }

    pub async fn reset_sessions(&self, node: &str) -> Result<(), ClientError> {
        self.count(Request::Session(SessionRequest::ResetNode(parse_key(node)?)))
            .await
            .map(|_| ())
    }

    pub async fn reset_all_sessions(&self) -> Result<(), ClientError> {
        self.count(Request::Session(SessionRequest::ResetAll))
            .await
            .map(|_| ())
    }

    /// Every node key the server has counted sessions for.
    pub async fn list_hosts(&self) -> Result<Vec<String>, ClientError> {
        let message = self.success(Request::Session(SessionRequest::List)).await?;
        Ok(split_list(&message))
    }

    /// `Applied` when added, `Unchanged` when already present.
    pub async fn add_node(&self, url: &str) -> Result<NodeOutcome, ClientError> {
        let message = self
            .success(Request::Nodes(NodesRequest::Add(url.to_string())))
            .await?;
        node_outcome(message, node_replies::ADDED, node_replies::DUPLICATE)
    }

    /// `Applied` when removed, `Unchanged` when not found.
    pub async fn remove_node(&self, url: &str) -> Result<NodeOutcome, ClientError> {
        let message = self
            .success(Request::Nodes(NodesRequest::Remove(url.to_string())))
            .await?;
        node_outcome(message, node_replies::REMOVED, node_replies::NOT_FOUND)
    }

    pub async fn list_nodes(&self) -> Result<Vec<String>, ClientError> {
        let message = self.success(Request::Nodes(NodesRequest::List)).await?;
        let body = message
            .strip_prefix(NODE_LIST_PREFIX)
            .ok_or_else(|| ClientError::MalformedResponse {
                response: message.clone(),
            })?;
        if body == EMPTY_NODE_LIST {
            return Ok(Vec::new());
        }
        Ok(split_list(body))
    }

    /// Pending count plus the session count of every monitored node. Each
    /// value comes from its own connection, so the report is not atomic.
    pub async fn summary(&self) -> Result<ServerSummary, ClientError> {
        let pending = self.pending_count().await?;
        let mut nodes = Vec::new();
        for node in self.list_nodes().await? {
            let sessions = self.session_count(&node).await?;
            nodes.push(NodeSummary { node, sessions });
        }
        Ok(ServerSummary { pending, nodes })
    }

    async fn count(&self, request: Request) -> Result<u32, ClientError> {
        let message = self.success(request).await?;
        message
            .trim()
            .parse()
            .map_err(|_| ClientError::MalformedResponse { response: message })
    }

    async fn success(&self, request: Request) -> Result<String, ClientError> {
        match self.exchange(&request).await? {
            Reply::Success(message) => Ok(message),
            Reply::Error(message) => Err(ClientError::Rejected { message }),
        }
    }

    /// One request, one reply, over a fresh connection.
    pub async fn exchange(&self, request: &Request) -> Result<Reply, ClientError> {
        self.bounded(self.send(request)).await
    }

    async fn send(&self, request: &Request) -> Result<Reply, ClientError> {
        let mut stream = self.connect().await?;
        stream.write_all(request.encode().as_bytes()).await?;
        stream.flush().await?;

        let mut reader = BufReader::new(stream);
        let mut raw = String::new();
        for _ in 0..2 {
            if reader.read_line(&mut raw).await? == 0 {
                break;
            }
        }

        debug!(server = %self.address(), request = ?request, reply = %raw.trim_end(), "Exchange complete");
        Reply::decode(&raw).map_err(|_| ClientError::MalformedResponse { response: raw })
    }

    async fn probe(&self) -> Result<(), ClientError> {
        let mut stream = self.connect().await?;
        stream.write_all(Request::Test.encode().as_bytes()).await?;
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await?;
        Ok(())
    }

    async fn connect(&self) -> Result<TcpStream, ClientError> {
        TcpStream::connect(self.address())
            .await
            .map_err(|e| ClientError::ConnectFailed {
                address: self.address(),
                error: e.to_string(),
            })
    }

    async fn bounded<T, F>(&self, exchange: F) -> Result<T, ClientError>
    where
        F: std::future::Future<Output = Result<T, ClientError>>,
    {
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, exchange)
                .await
                .map_err(|_| ClientError::Timeout {
                    address: self.address(),
                    timeout_ms: timeout.as_millis(),
                })?,
            None => exchange.await,
        }
    }
}

/// Snapshot assembled by [`SessionClient::summary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerSummary {
    pub pending: u32,
    pub nodes: Vec<NodeSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSummary {
    pub node: String,
    pub sessions: u32,
}

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Could not connect to {address}: {error}")]
    ConnectFailed { address: String, error: String },

    #[error("Server rejected the request: {message}")]
    Rejected { message: String },

    #[error("Malformed response: {response:?}")]
    MalformedResponse { response: String },

    #[error("No response from {address} within {timeout_ms} ms")]
    Timeout { address: String, timeout_ms: u128 },

    #[error("Invalid node key: {node}")]
    InvalidNode { node: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn parse_key(node: &str) -> Result<NodeKey, ClientError> {
    node.parse().map_err(|_| ClientError::InvalidNode {
        node: node.to_string(),
    })
}

fn split_list(line: &str) -> Vec<String> {
    line.split(LIST_DELIMITER)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn node_outcome(message: String, applied: &str, unchanged: &str) -> Result<NodeOutcome, ClientError> {
    if message.starts_with(applied) {
        Ok(NodeOutcome::Applied)
    } else if message.starts_with(unchanged) {
        Ok(NodeOutcome::Unchanged)
    } else {
        Err(ClientError::MalformedResponse { response: message })
    }
}

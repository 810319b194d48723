//! # Line Protocol
//!
//! Newline-terminated text over a plain TCP socket, one request and one reply
//! per connection.
//!
//! ```text
//! TEST
//! PENDING \n (INCREASE|DECREASE|COUNT|RESET)
//! SESSION \n (INCREASE|DECREASE|COUNT) \n <host:port>
//! SESSION \n RESET \n (ALL | NODE \n <host:port>)
//! SESSION \n LIST
//! NODES   \n (INCREASE|DECREASE) \n <nodeAddress>
//! NODES   \n LIST
//! ```
//!
//! Replies are `SUCCESS` or `ERROR` followed by one result line. `TEST` gets
//! no reply at all. Command words match case-insensitively.

pub mod handler;

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

pub use handler::ConnectionHandler;

use crate::constants::{ERROR, SUCCESS};
use crate::registry::NodeKey;

/// First request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopCommand {
    Pending,
    Session,
    Nodes,
    Test,
    Unsupported,
}

impl TopCommand {
    pub fn parse(line: &str) -> Self {
        match line.trim().to_ascii_uppercase().as_str() {
            "PENDING" => TopCommand::Pending,
            "SESSION" => TopCommand::Session,
            "NODES" => TopCommand::Nodes,
            "TEST" => TopCommand::Test,
            _ => TopCommand::Unsupported,
        }
    }
}

/// Second (and, for `SESSION RESET`, third) request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubCommand {
    Increase,
    Decrease,
    List,
    Count,
    Reset,
    All,
    Node,
    Unsupported,
}

impl SubCommand {
    pub fn parse(line: &str) -> Self {
        match line.trim().to_ascii_uppercase().as_str() {
            "INCREASE" => SubCommand::Increase,
            "DECREASE" => SubCommand::Decrease,
            "LIST" => SubCommand::List,
            "COUNT" => SubCommand::Count,
            "RESET" => SubCommand::Reset,
            "ALL" => SubCommand::All,
            "NODE" => SubCommand::Node,
            _ => SubCommand::Unsupported,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingRequest {
    Increase,
    Decrease,
    Count,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRequest {
    Increase(NodeKey),
    Decrease(NodeKey),
    Count(NodeKey),
    ResetAll,
    ResetNode(NodeKey),
    List,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodesRequest {
    Add(String),
    Remove(String),
    List,
}

/// A fully read request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Test,
    Pending(PendingRequest),
    Session(SessionRequest),
    Nodes(NodesRequest),
}

impl Request {
    /// The request as the lines a client sends.
    pub fn to_lines(&self) -> Vec<String> {
        let owned = |parts: &[&str]| -> Vec<String> { parts.iter().map(ToString::to_string).collect() };
        match self {
            Request::Test => owned(&["TEST"]),
            Request::Pending(action) => {
                let action = match action {
                    PendingRequest::Increase => "INCREASE",
                    PendingRequest::Decrease => "DECREASE",
                    PendingRequest::Count => "COUNT",
                    PendingRequest::Reset => "RESET",
                };
                owned(&["PENDING", action])
            }
            Request::Session(request) => match request {
                SessionRequest::Increase(node) => {
                    owned(&["SESSION", "INCREASE", &node.to_string()])
                }
                SessionRequest::Decrease(node) => {
                    owned(&["SESSION", "DECREASE", &node.to_string()])
                }
                SessionRequest::Count(node) => owned(&["SESSION", "COUNT", &node.to_string()]),
                SessionRequest::ResetAll => owned(&["SESSION", "RESET", "ALL"]),
                SessionRequest::ResetNode(node) => {
                    owned(&["SESSION", "RESET", "NODE", &node.to_string()])
                }
                SessionRequest::List => owned(&["SESSION", "LIST"]),
            },
            Request::Nodes(request) => match request {
                NodesRequest::Add(address) => owned(&["NODES", "INCREASE", address]),
                NodesRequest::Remove(address) => owned(&["NODES", "DECREASE", address]),
                NodesRequest::List => owned(&["NODES", "LIST"]),
            },
        }
    }

    /// Wire encoding: every line newline-terminated.
    pub fn encode(&self) -> String {
        self.to_lines()
            .into_iter()
            .map(|line| line + "\n")
            .collect()
    }
}

/// Server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Success(String),
    Error(String),
}

impl Reply {
    pub fn is_success(&self) -> bool {
        matches!(self, Reply::Success(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Reply::Success(message) | Reply::Error(message) => message,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Reply::Success(message) => format!("{SUCCESS}\n{message}\n"),
            Reply::Error(message) => format!("{ERROR}\n{message}\n"),
        }
    }

    /// Parses the status line and the result line of a reply.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let mut lines = raw.lines();
        let status = lines.next().map(str::trim).unwrap_or_default();
        let message = lines.next().unwrap_or_default().trim_end().to_string();

        if status.eq_ignore_ascii_case(SUCCESS) {
            Ok(Reply::Success(message))
        } else if status.eq_ignore_ascii_case(ERROR) {
            Ok(Reply::Error(message))
        } else {
            Err(ProtocolError::MalformedReply {
                reply: raw.to_string(),
            })
        }
    }

    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.encode().as_bytes()).await?;
        writer.flush().await
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Success(message) => write!(f, "{SUCCESS} {message}"),
            Reply::Error(message) => write!(f, "{ERROR} {message}"),
        }
    }
}

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Unsupported command:  {line}")]
    UnsupportedCommand { line: String },

    #[error("Unsupported level 2 command for {command}:  {line}")]
    UnsupportedSubCommand { command: &'static str, line: String },

    #[error("Unsupported reset command:  {line}")]
    UnsupportedReset { line: String },

    #[error("Invalid node key:  {line}")]
    InvalidNodeKey { line: String },

    #[error("Connection closed before the request was complete")]
    ConnectionClosed,

    #[error("No request line received within {timeout_ms} ms")]
    ReadTimeout { timeout_ms: u128 },

    #[error("Malformed reply: {reply:?}")]
    MalformedReply { reply: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads one request, line by line, stopping as soon as the request is
/// complete or cannot be valid.
pub struct RequestReader<R> {
    reader: R,
    read_timeout: Option<Duration>,
    lines_read: usize,
}

impl<R: AsyncBufRead + Unpin> RequestReader<R> {
    pub fn new(reader: R, read_timeout: Option<Duration>) -> Self {
        Self {
            reader,
            read_timeout,
            lines_read: 0,
        }
    }

    pub fn lines_read(&self) -> usize {
        self.lines_read
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    pub async fn read_request(&mut self) -> Result<Request, ProtocolError> {
        let line = self.next_line().await?;
        match TopCommand::parse(&line) {
            TopCommand::Test => Ok(Request::Test),
            TopCommand::Pending => self.read_pending().await.map(Request::Pending),
            TopCommand::Session => self.read_session().await.map(Request::Session),
            TopCommand::Nodes => self.read_nodes().await.map(Request::Nodes),
            TopCommand::Unsupported => Err(ProtocolError::UnsupportedCommand { line }),
        }
    }

    async fn read_pending(&mut self) -> Result<PendingRequest, ProtocolError> {
        let line = self.next_line().await?;
        match SubCommand::parse(&line) {
            SubCommand::Increase => Ok(PendingRequest::Increase),
            SubCommand::Decrease => Ok(PendingRequest::Decrease),
            SubCommand::Count => Ok(PendingRequest::Count),
            SubCommand::Reset => Ok(PendingRequest::Reset),
            _ => Err(ProtocolError::UnsupportedSubCommand {
                command: "PENDING",
                line,
            }),
        }
    }

    async fn read_session(&mut self) -> Result<SessionRequest, ProtocolError> {
        let line = self.next_line().await?;
        match SubCommand::parse(&line) {
            SubCommand::Increase => Ok(SessionRequest::Increase(self.read_node_key().await?)),
            SubCommand::Decrease => Ok(SessionRequest::Decrease(self.read_node_key().await?)),
            SubCommand::Count => Ok(SessionRequest::Count(self.read_node_key().await?)),
            SubCommand::List => Ok(SessionRequest::List),
            SubCommand::Reset => {
                let scope = self.next_line().await?;
                match SubCommand::parse(&scope) {
                    SubCommand::All => Ok(SessionRequest::ResetAll),
                    SubCommand::Node => Ok(SessionRequest::ResetNode(self.read_node_key().await?)),
                    _ => Err(ProtocolError::UnsupportedReset { line: scope }),
                }
            }
            _ => Err(ProtocolError::UnsupportedSubCommand {
                command: "SESSION",
                line,
            }),
        }
    }

    async fn read_nodes(&mut self) -> Result<NodesRequest, ProtocolError> {
        let line = self.next_line().await?;
        match SubCommand::parse(&line) {
            SubCommand::Increase => Ok(NodesRequest::Add(self.next_line().await?)),
            SubCommand::Decrease => Ok(NodesRequest::Remove(self.next_line().await?)),
            SubCommand::List => Ok(NodesRequest::List),
            _ => Err(ProtocolError::UnsupportedSubCommand {
                command: "NODES",
                line,
            }),
        }
    }

    async fn read_node_key(&mut self) -> Result<NodeKey, ProtocolError> {
        let line = self.next_line().await?;
        line.parse()
            .map_err(|_| ProtocolError::InvalidNodeKey { line })
    }

    /// Next line without its terminator. End of stream is an error.
    async fn next_line(&mut self) -> Result<String, ProtocolError> {
        let mut line = String::new();
        let read = match self.read_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.reader.read_line(&mut line))
                .await
                .map_err(|_| ProtocolError::ReadTimeout {
                    timeout_ms: timeout.as_millis(),
                })??,
            None => self.reader.read_line(&mut line).await?,
        };

        if read == 0 {
            return Err(ProtocolError::ConnectionClosed);
        }

        self.lines_read += 1;
        let trimmed_len = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed_len);
        Ok(line)
    }
}

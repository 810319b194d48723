//! Crate-wide error type.
//!
//! Each component defines its own error enum next to the code that raises it;
//! `CoordinatorError` collects them for callers that drive several components.

use thiserror::Error;

use crate::client::ClientError;
use crate::config::ConfigurationError;
use crate::lock::LockError;
use crate::protocol::ProtocolError;
use crate::server::ServerError;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Server error: {0}")]
    Server(#[from] ServerError),
    #[error("Client error: {0}")]
    Client(#[from] ClientError),
    #[error("Invalid node: {0}")]
    InvalidNode(String),
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;

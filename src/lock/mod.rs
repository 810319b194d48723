//! # Cross-Process Lock
//!
//! Mutual exclusion backed by an operating-system resource instead of an
//! in-memory primitive, so the request handlers, the cleanup scheduler and, on
//! the same host, other processes all serialize against each other.
//!
//! Two interchangeable backends implement [`CrossProcessLock`]:
//!
//! - [`FileLock`]: an advisory exclusive lock on a well-known temp file,
//!   retried on a fixed poll interval.
//! - [`SocketLock`]: a loopback listener bound on a well-known port, retried
//!   after a random delay. Only processes on the same host are excluded.
//!
//! Acquisition is always bounded. A caller that runs out of time gets
//! [`LockError::Timeout`], never an indefinite wait.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use session_coordinator::lock::{CrossProcessLock, FileLock};
//!
//! # async fn example() -> Result<(), session_coordinator::lock::LockError> {
//! let lock = FileLock::in_temp_dir()?;
//! let token = lock.try_acquire(Duration::from_secs(5)).await?;
//! // ... exclusive work ...
//! token.release();
//! # Ok(())
//! # }
//! ```

pub mod file_lock;
pub mod socket_lock;

use std::fmt;
use std::fs::File;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub use file_lock::FileLock;
pub use socket_lock::SocketLock;

use crate::config::LockConfig;

/// Contract shared by both lock backends.
#[async_trait]
pub trait CrossProcessLock: Send + Sync + fmt::Debug {
    /// Retries until the lock is held or `timeout` elapses.
    async fn try_acquire(&self, timeout: Duration) -> Result<LockToken, LockError>;

    /// Human-readable name of the backing resource, for log lines.
    fn resource(&self) -> String;
}

/// Backing resource selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockBackend {
    #[default]
    File,
    Socket,
}

impl fmt::Display for LockBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockBackend::File => write!(f, "file"),
            LockBackend::Socket => write!(f, "socket"),
        }
    }
}

impl std::str::FromStr for LockBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "file" => Ok(LockBackend::File),
            "socket" => Ok(LockBackend::Socket),
            other => Err(format!("unknown lock backend '{other}' (expected file or socket)")),
        }
    }
}

/// Builds the lock selected by `config`. The file backend creates its lock
/// file here so a server can fail fast when the file cannot be created.
pub fn build_lock(config: &LockConfig) -> Result<Arc<dyn CrossProcessLock>, LockError> {
    let lock: Arc<dyn CrossProcessLock> = match config.backend {
        LockBackend::File => Arc::new(
            FileLock::new(config.resolved_file_path())?
                .with_poll_interval(config.file_poll_interval()),
        ),
        LockBackend::Socket => Arc::new(
            SocketLock::new(config.socket_port).with_max_jitter(config.socket_max_jitter()),
        ),
    };
    debug!(resource = %lock.resource(), "Cross-process lock configured");
    Ok(lock)
}

/// The OS resource a token keeps alive.
#[derive(Debug)]
pub(crate) enum HeldResource {
    File(File),
    Socket(TcpListener),
}

/// Exclusive ownership of a [`CrossProcessLock`].
///
/// Dropping the token releases the lock, so every exit path of the holder
/// gives it up. [`LockToken::release`] does the same explicitly; releasing
/// more than once is a no-op.
#[must_use = "the lock is released as soon as the token is dropped"]
pub struct LockToken {
    resource: String,
    held: Option<HeldResource>,
}

impl LockToken {
    pub(crate) fn new(resource: String, held: HeldResource) -> Self {
        Self {
            resource,
            held: Some(held),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn is_held(&self) -> bool {
        self.held.is_some()
    }

    pub fn release(mut self) {
        self.release_held();
    }

    fn release_held(&mut self) {
        let Some(held) = self.held.take() else {
            return;
        };
        match held {
            HeldResource::File(file) => {
                if let Err(e) = fs2::FileExt::unlock(&file) {
                    warn!(resource = %self.resource, error = %e, "Unlocking lock file failed, closing handle");
                }
                drop(file);
            }
            HeldResource::Socket(listener) => drop(listener),
        }
        debug!(resource = %self.resource, "Lock released");
    }
}

impl Drop for LockToken {
    fn drop(&mut self) {
        self.release_held();
    }
}

impl fmt::Debug for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockToken")
            .field("resource", &self.resource)
            .field("held", &self.held.is_some())
            .finish()
    }
}

/// Lock errors
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Could not get lock within timeout:  {waited_ms} ms ({resource})")]
    Timeout { resource: String, waited_ms: u128 },

    #[error("Lock file could not be created at {path}: {error}")]
    FileCreation { path: String, error: String },

    #[error("Lock resource {resource} failed: {error}")]
    Io { resource: String, error: String },
}

impl LockError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LockError::Timeout { .. })
    }
}

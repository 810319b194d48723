//! External cleanup step with a process watchdog.

use std::fmt;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::CleanupConfig;
use crate::registry::NodeIdentity;

/// How one cleanup invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    Succeeded,
    Failed { exit_code: Option<i32> },
    TimedOut { after: Duration },
    SpawnFailed { error: String },
}

impl CleanupOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CleanupOutcome::Succeeded)
    }
}

impl fmt::Display for CleanupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanupOutcome::Succeeded => write!(f, "succeeded"),
            CleanupOutcome::Failed {
                exit_code: Some(code),
            } => write!(f, "failed with exit code {code}"),
            CleanupOutcome::Failed { exit_code: None } => write!(f, "terminated by signal"),
            CleanupOutcome::TimedOut { after } => {
                write!(f, "killed by watchdog after {} ms", after.as_millis())
            }
            CleanupOutcome::SpawnFailed { error } => write!(f, "could not be started: {error}"),
        }
    }
}

/// Performs the cleanup step for one node. Never fails: every problem is
/// reported through the outcome.
#[async_trait]
pub trait CleanupRunner: Send + Sync + fmt::Debug {
    async fn run(&self, node: &NodeIdentity) -> CleanupOutcome;
}

/// Runs `<command> [args...] <host> <port>` and waits for it, killing the
/// process when the watchdog expires.
#[derive(Debug, Clone)]
pub struct ProcessCleanupRunner {
    command: String,
    args: Vec<String>,
    watchdog: Duration,
}

impl ProcessCleanupRunner {
    pub fn new(command: impl Into<String>, watchdog: Duration) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            watchdog,
        }
    }

    pub fn from_config(config: &CleanupConfig) -> Self {
        Self::new(config.command.clone(), config.watchdog_timeout()).with_args(config.args.clone())
    }

    /// Fixed arguments placed before host and port.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[async_trait]
impl CleanupRunner for ProcessCleanupRunner {
    async fn run(&self, node: &NodeIdentity) -> CleanupOutcome {
        let mut child = match Command::new(&self.command)
            .args(&self.args)
            .arg(node.host())
            .arg(node.port().to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return CleanupOutcome::SpawnFailed {
                    error: e.to_string(),
                }
            }
        };

        let started = Instant::now();
        match tokio::time::timeout(self.watchdog, child.wait()).await {
            Ok(Ok(status)) if status.success() => CleanupOutcome::Succeeded,
            Ok(Ok(status)) => CleanupOutcome::Failed {
                exit_code: status.code(),
            },
            Ok(Err(e)) => {
                warn!(node = %node, error = %e, "Waiting for cleanup process failed");
                CleanupOutcome::Failed { exit_code: None }
            }
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!(node = %node, error = %e, "Watchdog could not kill cleanup process");
                } else {
                    debug!(node = %node, "Watchdog killed cleanup process");
                }
                CleanupOutcome::TimedOut {
                    after: started.elapsed(),
                }
            }
        }
    }
}

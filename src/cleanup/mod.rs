//! # Cleanup Scheduler
//!
//! Periodically runs the external cleanup step against idle nodes.
//!
//! Each tick takes the cross-process lock with the same bounded wait as the
//! request handlers. Holding it, the tick reads the pending count; only when
//! it is zero does it walk the node directory in order, running cleanup for
//! every node whose active session count is zero. Nodes are cleaned one at a
//! time. The lock is released when the tick ends, whatever the outcome.
//!
//! Because request handlers only mutate the registry while holding the same
//! lock, the counts read during a tick cannot change until the tick is over.

pub mod runner;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub use runner::{CleanupOutcome, CleanupRunner, ProcessCleanupRunner};

use crate::constants::defaults;
use crate::lock::CrossProcessLock;
use crate::registry::SessionCoordinator;

/// Result of a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickReport {
    /// The lock was not acquired in time; nothing was inspected.
    LockUnavailable { reason: String },
    /// Tests are about to start; no node was touched.
    PendingSessions { pending: u32 },
    /// The directory was walked.
    Walked { nodes: Vec<NodeReport> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeReport {
    Cleaned { node: String, outcome: CleanupOutcome },
    Busy { node: String, sessions: u32 },
}

impl TickReport {
    /// Nodes the cleanup step ran against, in order.
    pub fn cleaned_nodes(&self) -> Vec<&str> {
        match self {
            TickReport::Walked { nodes } => nodes
                .iter()
                .filter_map(|report| match report {
                    NodeReport::Cleaned { node, .. } => Some(node.as_str()),
                    NodeReport::Busy { .. } => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CleanupScheduler {
    coordinator: Arc<SessionCoordinator>,
    lock: Arc<dyn CrossProcessLock>,
    runner: Arc<dyn CleanupRunner>,
    lock_timeout: Duration,
    interval: Duration,
}

impl CleanupScheduler {
    /// `interval` is raised to one minute if shorter.
    pub fn new(
        coordinator: Arc<SessionCoordinator>,
        lock: Arc<dyn CrossProcessLock>,
        runner: Arc<dyn CleanupRunner>,
        lock_timeout: Duration,
        interval: Duration,
    ) -> Self {
        let floor = Duration::from_secs(defaults::CLEANUP_POLL_INTERVAL_MINUTES * 60);
        Self {
            coordinator,
            lock,
            runner,
            lock_timeout,
            interval: interval.max(floor),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs ticks on a background task until `shutdown` fires. The first tick
    /// happens one full interval after the start.
    ///
    /// Shutdown also interrupts a tick in progress: the tick is dropped, which
    /// releases the lock token and kills a running cleanup process.
    pub fn spawn(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + self.interval;
            let mut ticker = tokio::time::interval_at(start, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                interval_seconds = self.interval.as_secs(),
                "Cleanup scheduler started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = self.tick() => {}
                            _ = shutdown.recv() => {
                                info!("Cleanup scheduler shutting down during a tick");
                                break;
                            }
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("Cleanup scheduler shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// One cleanup pass.
    pub async fn tick(&self) -> TickReport {
        let token = match self.lock.try_acquire(self.lock_timeout).await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Cleanup tick skipped");
                return TickReport::LockUnavailable {
                    reason: e.to_string(),
                };
            }
        };

        let report = self.walk().await;
        token.release();
        report
    }

    async fn walk(&self) -> TickReport {
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(
                registry = %serde_json::to_string(&self.coordinator.snapshot())
                    .unwrap_or_else(|_| "[serialization error]".to_string()),
                "Cleanup tick started"
            );
        }

        let pending = self.coordinator.pending_count();
        if pending != 0 {
            info!(pending, "Cleanup Task not started due to pending sessions");
            return TickReport::PendingSessions { pending };
        }

        let mut reports = Vec::new();
        for node in self.coordinator.nodes() {
            let name = node.to_string();
            let sessions = self.coordinator.session_count(&node.key());
            if sessions != 0 {
                info!(node = %name, sessions, "Cleanup Task NOT started due to existing sessions");
                reports.push(NodeReport::Busy {
                    node: name,
                    sessions,
                });
                continue;
            }

            info!(node = %name, "Cleanup Task started");
            let outcome = self.runner.run(&node).await;
            if outcome.is_success() {
                info!(node = %name, "Cleanup Task completed");
            } else {
                warn!(node = %name, outcome = %outcome, "Cleanup Task failed");
            }
            reports.push(NodeReport::Cleaned {
                node: name,
                outcome,
            });
        }

        debug!(nodes = reports.len(), "Cleanup tick finished");
        TickReport::Walked { nodes: reports }
    }
}

//! # Coordinator Bootstrap
//!
//! Wires the registry, the cross-process lock, the session server and the
//! cleanup scheduler together from a [`CoordinatorConfig`], and returns a
//! handle for lifecycle management.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cleanup::{CleanupRunner, CleanupScheduler, ProcessCleanupRunner};
use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, Result};
use crate::lock::{build_lock, CrossProcessLock};
use crate::protocol::ConnectionHandler;
use crate::registry::{NodeOutcome, SessionCoordinator};
use crate::server::{ServerStats, SessionServer};

/// Running coordinator
pub struct CoordinatorHandle {
    pub coordinator: Arc<SessionCoordinator>,
    pub server: SessionServer,
    pub scheduler: Arc<CleanupScheduler>,
    pub address: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    scheduler_task: Option<JoinHandle<()>>,
}

impl CoordinatorHandle {
    pub async fn stats(&self) -> ServerStats {
        self.server.stats().await
    }

    /// Stop the acceptor and the scheduler. Idempotent.
    pub async fn stop(&mut self) -> Result<()> {
        self.server.stop().await?;
        let _ = self.shutdown_tx.send(());
        if let Some(task) = self.scheduler_task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Cleanup scheduler task ended abnormally");
            }
        }
        info!("Coordinator stopped");
        Ok(())
    }
}

/// Adds every address to the directory, in order. Stops at the first address
/// that is not a valid node URL.
pub fn seed_nodes(coordinator: &SessionCoordinator, nodes: &[String]) -> Result<()> {
    for node in nodes {
        match coordinator.add_node(node) {
            NodeOutcome::Applied => info!(node = %node, "Added Node"),
            NodeOutcome::Unchanged => info!(node = %node, "Duplicate Node (not added)"),
            NodeOutcome::Invalid => return Err(CoordinatorError::InvalidNode(node.clone())),
        }
    }
    Ok(())
}

/// Start a coordinator running the configured cleanup command.
pub async fn bootstrap(config: &CoordinatorConfig) -> Result<CoordinatorHandle> {
    let runner = Arc::new(ProcessCleanupRunner::from_config(&config.cleanup));
    info!(command = %runner.command(), "Cleanup command configured");
    bootstrap_with_runner(config, runner).await
}

/// Start a coordinator with a caller-supplied cleanup step.
pub async fn bootstrap_with_runner(
    config: &CoordinatorConfig,
    runner: Arc<dyn CleanupRunner>,
) -> Result<CoordinatorHandle> {
    config.validate()?;

    let lock: Arc<dyn CrossProcessLock> = build_lock(&config.lock)?;
    let coordinator = Arc::new(SessionCoordinator::new());
    seed_nodes(&coordinator, &config.cleanup.nodes)?;

    let handler = ConnectionHandler::new(
        coordinator.clone(),
        lock.clone(),
        config.lock.acquire_timeout(),
    )
    .with_read_timeout(config.server.request_read_timeout());
    let server = SessionServer::new(config.server.clone(), handler);
    let address = server.start().await?;

    let scheduler = Arc::new(CleanupScheduler::new(
        coordinator.clone(),
        lock,
        runner,
        config.lock.acquire_timeout(),
        config.cleanup.poll_interval(),
    ));
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let scheduler_task = scheduler.clone().spawn(shutdown_rx);

    info!(
        address = %address,
        nodes = coordinator.list_nodes().len(),
        lock_backend = %config.lock.backend,
        "Coordinator started"
    );

    Ok(CoordinatorHandle {
        coordinator,
        server,
        scheduler,
        address,
        shutdown_tx,
        scheduler_task: Some(scheduler_task),
    })
}

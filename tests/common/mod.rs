//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use session_coordinator::cleanup::{CleanupOutcome, CleanupRunner};
use session_coordinator::config::CoordinatorConfig;
use session_coordinator::registry::{NodeIdentity, SessionCoordinator};
use session_coordinator::{bootstrap_with_runner, CoordinatorHandle, SessionClient};

/// Cleanup step that records each call and checks, at the moment it runs,
/// that the node is idle.
#[derive(Debug)]
pub struct SafetyCheckingRunner {
    coordinator: Mutex<Option<Arc<SessionCoordinator>>>,
    pub calls: Mutex<Vec<String>>,
    pub violations: Mutex<Vec<String>>,
    delay: Duration,
}

impl SafetyCheckingRunner {
    pub fn new(delay: Duration) -> Self {
        Self {
            coordinator: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            violations: Mutex::new(Vec::new()),
            delay,
        }
    }

    pub fn watch(&self, coordinator: Arc<SessionCoordinator>) {
        *self.coordinator.lock() = Some(coordinator);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl CleanupRunner for SafetyCheckingRunner {
    async fn run(&self, node: &NodeIdentity) -> CleanupOutcome {
        let coordinator = self.coordinator.lock().clone();
        if let Some(coordinator) = coordinator {
            let check = |when: &str| {
                let pending = coordinator.pending_count();
                let sessions = coordinator.session_count(&node.key());
                if pending != 0 || sessions != 0 {
                    self.violations.lock().push(format!(
                        "{node} {when}: pending={pending} sessions={sessions}"
                    ));
                }
            };
            check("at start");
            tokio::time::sleep(self.delay).await;
            check("at end");
        }
        self.calls.lock().push(node.to_string());
        CleanupOutcome::Succeeded
    }
}

pub struct TestServer {
    pub handle: CoordinatorHandle,
    pub client: SessionClient,
    pub runner: Arc<SafetyCheckingRunner>,
    _dir: tempfile::TempDir,
}

impl TestServer {
    pub async fn start(nodes: &[&str]) -> Self {
        Self::start_with(nodes, 0, Duration::ZERO).await
    }

    pub async fn start_with(nodes: &[&str], max_connections: usize, cleanup_delay: Duration) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CoordinatorConfig::default();
        config.server.bind_host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.server.max_connections = max_connections;
        config.lock.file_path = Some(dir.path().join("~lock.tmp"));
        config.lock.file_poll_interval_ms = 5;
        config.lock.acquire_timeout_seconds = 30;
        config.cleanup.nodes = nodes.iter().map(ToString::to_string).collect();

        let runner = Arc::new(SafetyCheckingRunner::new(cleanup_delay));
        let handle = bootstrap_with_runner(&config, runner.clone()).await.unwrap();
        runner.watch(handle.coordinator.clone());

        let client = SessionClient::new("127.0.0.1", handle.address.port())
            .with_timeout(Duration::from_secs(30));

        Self {
            handle,
            client,
            runner,
            _dir: dir,
        }
    }

    /// Sends raw protocol text and returns everything the server wrote.
    pub async fn raw(&self, request: &str) -> String {
        let mut stream = TcpStream::connect(self.handle.address).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut reply = Vec::new();
        let mut buffer = [0u8; 512];
        loop {
            match stream.read(&mut buffer).await {
                Ok(0) | Err(_) => break,
                Ok(read) => reply.extend_from_slice(&buffer[..read]),
            }
        }
        String::from_utf8(reply).unwrap()
    }
}

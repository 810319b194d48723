//! # Session Registry
//!
//! Process-wide bookkeeping shared by every connection handler and the cleanup
//! scheduler.
//!
//! ## Overview
//!
//! - **SessionCounts**: the global pending count and the per-node active
//!   session counts.
//! - **NodeDirectory**: the ordered list of nodes the cleanup scheduler walks.
//!
//! Both live behind a single mutex in [`SessionCoordinator`]. The coordinator
//! is created once at startup and handed out as an `Arc`; it is never a
//! global. State is in memory only, so a restart begins from zero.
//!
//! ## Usage
//!
//! ```rust
//! use session_coordinator::registry::{NodeOutcome, SessionCoordinator};
//!
//! let coordinator = SessionCoordinator::new();
//! assert_eq!(coordinator.add_pending(), 1);
//! assert_eq!(coordinator.add_node("http://10.0.0.5:4444"), NodeOutcome::Applied);
//! assert_eq!(coordinator.list_nodes(), vec!["10.0.0.5:4444".to_string()]);
//! ```

pub mod nodes;
pub mod sessions;

use parking_lot::Mutex;
use serde::Serialize;

pub use nodes::{NodeDirectory, NodeIdentity, NodeOutcome};
pub use sessions::{InvalidNodeKey, NodeKey, SessionCounts};

#[derive(Debug, Default)]
struct CoordinatorState {
    counts: SessionCounts,
    directory: NodeDirectory,
}

/// Counters and node directory behind one mutex.
///
/// Every method takes the mutex for the duration of a single operation and
/// never fails. Sequences of calls are only atomic for callers that also hold
/// the cross-process lock.
#[derive(Debug, Default)]
pub struct SessionCoordinator {
    state: Mutex<CoordinatorState>,
}

impl SessionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pending(&self) -> u32 {
        self.state.lock().counts.add_pending()
    }

    pub fn remove_pending(&self) -> u32 {
        self.state.lock().counts.remove_pending()
    }

    pub fn pending_count(&self) -> u32 {
        self.state.lock().counts.pending()
    }

    pub fn reset_pending(&self) {
        self.state.lock().counts.reset_pending();
    }

    pub fn add_session(&self, node: &NodeKey) -> u32 {
        self.state.lock().counts.add_session(node)
    }

    pub fn remove_session(&self, node: &NodeKey) -> u32 {
        self.state.lock().counts.remove_session(node)
    }

    pub fn session_count(&self, node: &NodeKey) -> u32 {
        self.state.lock().counts.session_count(node)
    }

    pub fn reset_sessions(&self, node: &NodeKey) {
        self.state.lock().counts.reset_sessions(node);
    }

    pub fn reset_all_sessions(&self) {
        self.state.lock().counts.reset_all_sessions();
    }

    /// Every node key the registry has seen, joined with `", "`. Callers must
    /// not rely on the order.
    pub fn known_hosts(&self) -> String {
        self.state.lock().counts.known_hosts_line()
    }

    pub fn add_node(&self, address: &str) -> NodeOutcome {
        self.state.lock().directory.add(address)
    }

    pub fn remove_node(&self, address: &str) -> NodeOutcome {
        self.state.lock().directory.remove(address)
    }

    /// Directory entries as `host:port`, in directory order.
    pub fn list_nodes(&self) -> Vec<String> {
        self.state.lock().directory.list()
    }

    /// Copy of the directory taken under the mutex, for callers that walk it
    /// while issuing other registry calls.
    pub fn nodes(&self) -> Vec<NodeIdentity> {
        self.state.lock().directory.iter().cloned().collect()
    }

    /// Point-in-time view of the whole registry.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.state.lock();
        RegistrySnapshot {
            pending: state.counts.pending(),
            sessions: state
                .counts
                .entries()
                .map(|(key, count)| (key.to_string(), count))
                .collect(),
            nodes: state.directory.list(),
        }
    }
}

/// Serializable view of the registry, used for debug logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrySnapshot {
    pub pending: u32,
    pub sessions: Vec<(String, u32)>,
    pub nodes: Vec<String>,
}

//! Pending and per-node active session counters.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::LIST_DELIMITER;
use crate::registry::nodes::NodeIdentity;

/// Registry key of a node: lower-cased host plus port, rendered `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    host: String,
    port: i32,
}

impl NodeKey {
    pub fn new(host: impl AsRef<str>, port: i32) -> Self {
        Self {
            host: host.as_ref().to_ascii_lowercase(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> i32 {
        self.port
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid node key:  {0}")]
pub struct InvalidNodeKey(pub String);

impl FromStr for NodeKey {
    type Err = InvalidNodeKey;

    /// Accepts `host:port` (IPv6 hosts in brackets) or a full node URL, in
    /// which case the key of the parsed identity is used.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let value = raw.trim();
        if value.contains("://") {
            return NodeIdentity::parse(value)
                .map(|identity| identity.key())
                .ok_or_else(|| InvalidNodeKey(raw.to_string()));
        }

        let (host, port) = value
            .rsplit_once(':')
            .ok_or_else(|| InvalidNodeKey(raw.to_string()))?;
        let port: i32 = port.parse().map_err(|_| InvalidNodeKey(raw.to_string()))?;
        if host.is_empty() || host.chars().any(char::is_whitespace) {
            return Err(InvalidNodeKey(raw.to_string()));
        }

        Ok(NodeKey::new(host, port))
    }
}

/// Pending count and active session counts. Not synchronized on its own; the
/// [`SessionCoordinator`](crate::registry::SessionCoordinator) owns it behind
/// its mutex.
#[derive(Debug, Default, Clone)]
pub struct SessionCounts {
    pending: u32,
    active: BTreeMap<NodeKey, u32>,
}

impl SessionCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pending(&mut self) -> u32 {
        self.pending = self.pending.saturating_add(1);
        self.pending
    }

    /// Decrements the pending count; at zero the call is absorbed.
    pub fn remove_pending(&mut self) -> u32 {
        self.pending = self.pending.saturating_sub(1);
        self.pending
    }

    pub fn pending(&self) -> u32 {
        self.pending
    }

    pub fn reset_pending(&mut self) {
        self.pending = 0;
    }

    pub fn add_session(&mut self, node: &NodeKey) -> u32 {
        let count = self.active.entry(node.clone()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Decrements the node's count, creating the entry at zero if unseen.
    pub fn remove_session(&mut self, node: &NodeKey) -> u32 {
        let count = self.active.entry(node.clone()).or_insert(0);
        *count = count.saturating_sub(1);
        *count
    }

    pub fn session_count(&self, node: &NodeKey) -> u32 {
        self.active.get(node).copied().unwrap_or(0)
    }

    pub fn reset_sessions(&mut self, node: &NodeKey) {
        self.active.insert(node.clone(), 0);
    }

    /// Zeroes every known entry. Keys are retained.
    pub fn reset_all_sessions(&mut self) {
        self.active.values_mut().for_each(|count| *count = 0);
    }

    pub fn known_hosts(&self) -> Vec<&NodeKey> {
        self.active.keys().collect()
    }

    /// Known hosts joined with `", "`.
    pub fn known_hosts_line(&self) -> String {
        self.active
            .keys()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(LIST_DELIMITER)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&NodeKey, u32)> {
        self.active.iter().map(|(key, count)| (key, *count))
    }
}

//! Directory of monitored nodes.

use std::fmt;

use serde::Serialize;
use url::Url;

use crate::constants::NO_PORT;
use crate::registry::sessions::NodeKey;

/// Result of a directory mutation.
///
/// Numeric codes are available through [`NodeOutcome::code`]:
/// `Invalid` is -1, `Unchanged` (duplicate on add, not found on remove) is 0,
/// `Applied` is 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOutcome {
    Invalid,
    Unchanged,
    Applied,
}

impl NodeOutcome {
    pub fn code(self) -> i8 {
        match self {
            NodeOutcome::Invalid => -1,
            NodeOutcome::Unchanged => 0,
            NodeOutcome::Applied => 1,
        }
    }
}

/// A monitored node as supplied by an operator, e.g. `http://10.0.0.5:4444`.
///
/// Identity is `(host ignoring ASCII case, port)`; scheme and path do not take
/// part in equality. A missing port is stored as `-1`.
#[derive(Debug, Clone, Serialize)]
pub struct NodeIdentity {
    scheme: String,
    host: String,
    port: i32,
}

impl NodeIdentity {
    /// Parses an absolute URL with a host. Returns `None` otherwise.
    pub fn parse(address: &str) -> Option<Self> {
        let url = Url::parse(address.trim()).ok()?;
        let host = url.host_str().filter(|host| !host.is_empty())?;

        Some(Self {
            scheme: url.scheme().to_string(),
            host: host.to_string(),
            port: url
                .port()
                .or_else(|| written_port(address))
                .map(i32::from)
                .unwrap_or(NO_PORT),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> i32 {
        self.port
    }

    /// Key under which the registry tracks sessions for this node.
    pub fn key(&self) -> NodeKey {
        NodeKey::new(&self.host, self.port)
    }
}

impl PartialEq for NodeIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.port == other.port && self.host.eq_ignore_ascii_case(&other.host)
    }
}

impl Eq for NodeIdentity {}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Port as written in the authority of `address`. `Url::port` hides a port
/// equal to the scheme default, and that port must still be kept: sessions
/// on `a.com:80` are recorded under port 80, not under [`NO_PORT`].
fn written_port(address: &str) -> Option<u16> {
    let (_, rest) = address.trim().split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority
        .rsplit_once('@')
        .map_or(authority, |(_, host_port)| host_port);
    let port = match host_port.rsplit_once(']') {
        Some((_, after)) => after.strip_prefix(':')?,
        None => host_port.rsplit_once(':')?.1,
    };
    port.parse().ok()
}

/// Ordered list of monitored nodes without duplicates.
#[derive(Debug, Default, Clone)]
pub struct NodeDirectory {
    nodes: Vec<NodeIdentity>,
}

impl NodeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, address: &str) -> NodeOutcome {
        match NodeIdentity::parse(address) {
            Some(identity) => self.add_identity(identity),
            None => NodeOutcome::Invalid,
        }
    }

    pub fn add_identity(&mut self, identity: NodeIdentity) -> NodeOutcome {
        if self.position(&identity).is_some() {
            return NodeOutcome::Unchanged;
        }
        self.nodes.push(identity);
        NodeOutcome::Applied
    }

    pub fn remove(&mut self, address: &str) -> NodeOutcome {
        let Some(identity) = NodeIdentity::parse(address) else {
            return NodeOutcome::Invalid;
        };
        match self.position(&identity) {
            Some(index) => {
                self.nodes.remove(index);
                NodeOutcome::Applied
            }
            None => NodeOutcome::Unchanged,
        }
    }

    /// Entries rendered `host:port`, in insertion order.
    pub fn list(&self) -> Vec<String> {
        self.nodes.iter().map(ToString::to_string).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeIdentity> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn position(&self, identity: &NodeIdentity) -> Option<usize> {
        self.nodes.iter().position(|node| node == identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_node_identity() {
        let node = NodeIdentity::parse("http://Grid-Node.example.com:4444/wd/hub").unwrap();
        assert_eq!(node.scheme(), "http");
        assert_eq!(node.host(), "grid-node.example.com");
        assert_eq!(node.port(), 4444);
        assert_eq!(node.to_string(), "grid-node.example.com:4444");

        let no_port = NodeIdentity::parse("http://127.0.0.1").unwrap();
        assert_eq!(no_port.port(), NO_PORT);
        assert_eq!(no_port.key().to_string(), "127.0.0.1:-1");
    }

    #[test]
    fn test_explicit_default_port_is_kept() {
        let explicit = NodeIdentity::parse("http://a.com:80").unwrap();
        let implicit = NodeIdentity::parse("http://a.com").unwrap();
        assert_eq!(explicit.port(), 80);
        assert_eq!(implicit.port(), NO_PORT);
        assert_ne!(explicit, implicit);
        assert_eq!(explicit.key().to_string(), "a.com:80");

        let https = NodeIdentity::parse("https://user@B.com:443/wd/hub?x=1").unwrap();
        assert_eq!(https.port(), 443);
        assert_ne!(https, NodeIdentity::parse("https://b.com").unwrap());

        let ipv6 = NodeIdentity::parse("http://[::1]:80").unwrap();
        assert_eq!(ipv6.port(), 80);
        assert_eq!(NodeIdentity::parse("http://[::1]").unwrap().port(), NO_PORT);
    }

    #[test]
    fn test_default_port_entries_are_distinct_in_directory() {
        let mut directory = NodeDirectory::new();
        assert_eq!(directory.add("http://a.com"), NodeOutcome::Applied);
        assert_eq!(directory.add("http://a.com:80"), NodeOutcome::Applied);
        assert_eq!(directory.add("https://a.com:443"), NodeOutcome::Applied);
        assert_eq!(directory.add("http://A.com:80/"), NodeOutcome::Unchanged);
        assert_eq!(directory.list(), vec!["a.com:-1", "a.com:80", "a.com:443"]);

        assert_eq!(directory.remove("http://a.com:80"), NodeOutcome::Applied);
        assert_eq!(directory.list(), vec!["a.com:-1", "a.com:443"]);
    }

    #[test]
    fn test_parse_rejects_addresses_without_host() {
        assert!(NodeIdentity::parse("a.com").is_none());
        assert!(NodeIdentity::parse("a.com:4444").is_none());
        assert!(NodeIdentity::parse("").is_none());
        assert!(NodeIdentity::parse("not a url").is_none());
    }

    #[test]
    fn test_identity_ignores_scheme_and_path() {
        let a = NodeIdentity::parse("http://a.com:4444/wd/hub").unwrap();
        let b = NodeIdentity::parse("https://A.COM:4444").unwrap();
        let c = NodeIdentity::parse("http://a.com:5555").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_add_then_duplicate() {
        let mut directory = NodeDirectory::new();
        assert_eq!(directory.add("http://a.com:4444"), NodeOutcome::Applied);
        assert_eq!(directory.add("http://a.com:4444"), NodeOutcome::Unchanged);
        assert_eq!(directory.add("http://A.com:4444/other"), NodeOutcome::Unchanged);
        assert_eq!(directory.add("garbage"), NodeOutcome::Invalid);
        assert_eq!(directory.len(), 1);
        assert_eq!(directory.list(), vec!["a.com:4444".to_string()]);
    }

    #[test]
    fn test_remove_missing_leaves_directory_unchanged() {
        let mut directory = NodeDirectory::new();
        directory.add("http://a.com:4444");
        directory.add("http://b.com:4444");

        assert_eq!(directory.remove("http://a.com:5555"), NodeOutcome::Unchanged);
        assert_eq!(directory.remove("::::"), NodeOutcome::Invalid);
        assert_eq!(directory.list(), vec!["a.com:4444", "b.com:4444"]);

        assert_eq!(directory.remove("http://A.COM:4444"), NodeOutcome::Applied);
        assert_eq!(directory.list(), vec!["b.com:4444"]);
    }

    #[test]
    fn test_outcome_codes() {
        assert_eq!(NodeOutcome::Invalid.code(), -1);
        assert_eq!(NodeOutcome::Unchanged.code(), 0);
        assert_eq!(NodeOutcome::Applied.code(), 1);
    }
}

//! # Protocol and Service Constants
//!
//! Literal tokens of the line protocol and the default values shared by the
//! server, the client and the configuration layer.

/// First response line of a request that was carried out.
pub const SUCCESS: &str = "SUCCESS";

/// First response line of a request that was refused.
pub const ERROR: &str = "ERROR";

/// Separator used when a reply carries a list of hosts or nodes.
pub const LIST_DELIMITER: &str = ", ";

/// Prefix of the `NODES LIST` result line.
pub const NODE_LIST_PREFIX: &str = "All Nodes:  ";

/// `NODES LIST` body when the directory is empty.
pub const EMPTY_NODE_LIST: &str = "NONE";

/// Result-line prefixes of the `NODES` sub-commands.
pub mod node_replies {
    pub const ADDED: &str = "Added Node:  ";
    pub const DUPLICATE: &str = "Duplicate Node:  ";
    pub const REMOVED: &str = "Removed Node:  ";
    pub const NOT_FOUND: &str = "Node Not Found:  ";
    pub const INVALID: &str = "Invalid Node:  ";
}

/// Port value a node identity carries when its address names none.
pub const NO_PORT: i32 = -1;

pub mod defaults {
    //! Defaults applied when neither the config file, the environment nor the
    //! command line provide a value.

    /// Port the session server listens on.
    pub const SERVER_PORT: u16 = 4000;

    /// Host the session server binds.
    pub const SERVER_BIND_HOST: &str = "0.0.0.0";

    /// Well-known loopback port used by the socket-backed lock.
    pub const LOCK_SOCKET_PORT: u16 = 6666;

    /// Name of the lock file created in the temp directory.
    pub const LOCK_FILE_NAME: &str = "~lock.tmp";

    /// Bounded wait for the cross-process lock (5 minutes).
    pub const LOCK_ACQUIRE_TIMEOUT_SECONDS: u64 = 5 * 60;

    /// Retry interval of the file-backed lock.
    pub const LOCK_FILE_POLL_INTERVAL_MS: u64 = 1000;

    /// Upper bound of the random retry delay of the socket-backed lock.
    pub const LOCK_SOCKET_MAX_JITTER_MS: u64 = 2000;

    /// External program run against an idle node.
    pub const CLEANUP_COMMAND: &str = "cleanup.cmd";

    /// Cleanup interval, and its floor.
    pub const CLEANUP_POLL_INTERVAL_MINUTES: u64 = 1;

    /// Watchdog applied to every cleanup process.
    pub const CLEANUP_WATCHDOG_SECONDS: u64 = 60;
}

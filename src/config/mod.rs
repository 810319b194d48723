//! # Coordinator Configuration
//!
//! Typed configuration for the session server, the lock, the cleanup
//! scheduler and logging.
//!
//! ## Sources
//!
//! Values are layered, later sources winning:
//!
//! 1. Built-in defaults (every section is `#[serde(default)]`)
//! 2. An optional TOML file
//! 3. Environment variables prefixed `SESSION_COORDINATOR__`, sections
//!    separated by `__` (e.g. `SESSION_COORDINATOR__SERVER__PORT=4100`)
//! 4. Command-line overrides applied by the binaries
//!
//! ## Usage
//!
//! ```rust,no_run
//! use session_coordinator::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new().with_file("coordinator.toml").load()?;
//! println!("listening on port {}", config.server.port);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

use crate::constants::defaults;
use crate::lock::LockBackend;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub server: ServerConfig,
    pub lock: LockConfig,
    pub cleanup: CleanupConfig,
    pub logging: LoggingConfig,
}

impl CoordinatorConfig {
    /// Pretty JSON rendering for the startup debug log.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "[serialization error]".to_string())
    }

    /// Validate configuration for consistency. The cleanup interval is
    /// clamped rather than rejected, see [`CleanupConfig::poll_interval`].
    pub fn validate(&self) -> ConfigResult<()> {
        if self.lock.acquire_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "lock.acquire_timeout_seconds",
                "0",
                "lock wait must be greater than 0",
            ));
        }

        if self.lock.backend == LockBackend::File && self.lock.file_poll_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "lock.file_poll_interval_ms",
                "0",
                "file lock poll interval must be greater than 0",
            ));
        }

        if self.cleanup.watchdog_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "cleanup.watchdog_timeout_seconds",
                "0",
                "cleanup watchdog must be greater than 0",
            ));
        }

        if self.cleanup.command.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "cleanup.command",
                "cleanup configuration",
            ));
        }

        if self.server.bind_host.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "server.bind_host",
                "server configuration",
            ));
        }

        Ok(())
    }
}

/// Connection acceptor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_host: String,
    pub port: u16,
    /// Live-connection ceiling; 0 means unlimited.
    pub max_connections: usize,
    /// Bound on each request line read. Unset means reads wait indefinitely.
    pub request_read_timeout_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: defaults::SERVER_BIND_HOST.to_string(),
            port: defaults::SERVER_PORT,
            max_connections: 0,
            request_read_timeout_ms: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    pub fn request_read_timeout(&self) -> Option<Duration> {
        self.request_read_timeout_ms.map(Duration::from_millis)
    }
}

/// Cross-process lock settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub backend: LockBackend,
    /// Lock file; defaults to `~lock.tmp` in the system temp directory.
    pub file_path: Option<PathBuf>,
    pub socket_port: u16,
    pub acquire_timeout_seconds: u64,
    pub file_poll_interval_ms: u64,
    pub socket_max_jitter_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            backend: LockBackend::File,
            file_path: None,
            socket_port: defaults::LOCK_SOCKET_PORT,
            acquire_timeout_seconds: defaults::LOCK_ACQUIRE_TIMEOUT_SECONDS,
            file_poll_interval_ms: defaults::LOCK_FILE_POLL_INTERVAL_MS,
            socket_max_jitter_ms: defaults::LOCK_SOCKET_MAX_JITTER_MS,
        }
    }
}

impl LockConfig {
    pub fn resolved_file_path(&self) -> PathBuf {
        self.file_path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(defaults::LOCK_FILE_NAME))
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }

    pub fn file_poll_interval(&self) -> Duration {
        Duration::from_millis(self.file_poll_interval_ms)
    }

    pub fn socket_max_jitter(&self) -> Duration {
        Duration::from_millis(self.socket_max_jitter_ms)
    }
}

/// Cleanup scheduler settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Program run as `<command> [args...] <host> <port>`.
    pub command: String,
    pub args: Vec<String>,
    pub poll_interval_minutes: u64,
    pub watchdog_timeout_seconds: u64,
    /// Node URLs placed in the directory at startup.
    pub nodes: Vec<String>,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            command: defaults::CLEANUP_COMMAND.to_string(),
            args: Vec::new(),
            poll_interval_minutes: defaults::CLEANUP_POLL_INTERVAL_MINUTES,
            watchdog_timeout_seconds: defaults::CLEANUP_WATCHDOG_SECONDS,
            nodes: Vec::new(),
        }
    }
}

impl CleanupConfig {
    /// Tick interval, never shorter than one minute.
    pub fn poll_interval(&self) -> Duration {
        let minutes = self
            .poll_interval_minutes
            .max(defaults::CLEANUP_POLL_INTERVAL_MINUTES);
        Duration::from_secs(minutes * 60)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_secs(self.watchdog_timeout_seconds)
    }
}

/// Logging settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; falls back to the environment mapping.
    pub level: Option<String>,
    pub json: bool,
}

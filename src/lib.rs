#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Session Coordinator
//!
//! Coordination service that lets many concurrently running test processes
//! share a pool of remote execution nodes.
//!
//! ## Overview
//!
//! Test processes announce that a test is about to start (a *pending*
//! session), report sessions attached to a node, and manage the list of
//! monitored nodes, all over a small line protocol. A background scheduler
//! runs a destructive cleanup step against a node only when it is provably
//! idle: no pending session anywhere and no active session on that node.
//!
//! ## Module Organization
//!
//! - [`registry`] - Pending/session counters and the node directory
//! - [`lock`] - File- and socket-backed cross-process locks
//! - [`protocol`] - Request parsing, replies and the connection handler
//! - [`server`] - TCP acceptor with admission control
//! - [`cleanup`] - Cleanup scheduler and the external process runner
//! - [`client`] - Client used by test processes
//! - [`bootstrap`] - Wiring of all of the above from configuration
//! - [`config`] - Layered configuration
//! - [`error`] - Crate-wide error type
//!
//! ## Safety Property
//!
//! Request handlers mutate the registry only while holding the cross-process
//! lock, and a cleanup tick holds the same lock from the moment it reads the
//! pending count until its last cleanup process has exited. Cleanup therefore
//! never runs for a node while a pending session exists or while that node
//! has active sessions.

pub mod bootstrap;
pub mod cleanup;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod lock;
pub mod logging;
pub mod protocol;
pub mod registry;
pub mod server;

pub use bootstrap::{bootstrap, bootstrap_with_runner, CoordinatorHandle};
pub use client::{ClientError, SessionClient};
pub use config::{ConfigLoader, CoordinatorConfig};
pub use error::{CoordinatorError, Result};
pub use lock::{CrossProcessLock, FileLock, LockBackend, LockToken, SocketLock};
pub use registry::{NodeIdentity, NodeKey, NodeOutcome, SessionCoordinator};
pub use server::{ServerStats, SessionServer};

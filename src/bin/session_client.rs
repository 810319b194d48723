//! Session Client Binary
//!
//! Command-line access to a running session server, plus a helper that holds
//! the server's cross-process lock for manual testing.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use session_coordinator::config::ConfigLoader;
use session_coordinator::lock::build_lock;
use session_coordinator::logging::init_structured_logging;
use session_coordinator::{CrossProcessLock, NodeOutcome, SessionClient};

#[derive(Debug, Parser)]
#[command(name = "session-client", version, about)]
struct Cli {
    /// Session server host
    #[arg(long, default_value = "127.0.0.1")]
    server: String,

    /// Session server port
    #[arg(long, default_value_t = 4000)]
    port: u16,

    /// Give up on an exchange after this many seconds
    #[arg(long)]
    timeout_seconds: Option<u64>,

    /// TOML configuration file (used by `hold-lock` and for logging)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: ClientCommand,
}

#[derive(Debug, Subcommand)]
enum ClientCommand {
    /// Check that the server accepts connections
    Test,
    /// Announce a test about to start
    AddPending,
    /// Withdraw a pending test
    RemovePending,
    PendingCount,
    ResetPending,
    /// Record a session on a node (`host:port`)
    AddSession { node: String },
    RemoveSession { node: String },
    SessionCount { node: String },
    ResetSessions { node: String },
    ResetAllSessions,
    /// Every node the server has counted sessions for
    ListHosts,
    /// Add a node URL to the cleanup directory
    AddNode { url: String },
    RemoveNode { url: String },
    ListNodes,
    /// Pending count and per-node session counts as JSON
    Summary,
    /// Acquire the configured lock locally and hold it
    HoldLock {
        #[arg(long, default_value_t = 1)]
        minutes: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    let config = loader.load().context("loading configuration")?;
    init_structured_logging(&config.logging);
    // Loading ran before the subscriber existed
    debug!("Configuration loaded successfully: {}", config.to_json_pretty());

    let mut client = SessionClient::new(cli.server.clone(), cli.port);
    if let Some(seconds) = cli.timeout_seconds {
        client = client.with_timeout(Duration::from_secs(seconds));
    }

    match cli.command {
        ClientCommand::Test => {
            client.test_connection().await?;
            println!("Connected to {}", client.address());
        }
        ClientCommand::AddPending => println!("{}", client.add_pending().await?),
        ClientCommand::RemovePending => println!("{}", client.remove_pending().await?),
        ClientCommand::PendingCount => println!("{}", client.pending_count().await?),
        ClientCommand::ResetPending => client.reset_pending().await?,
        ClientCommand::AddSession { node } => println!("{}", client.add_session(&node).await?),
        ClientCommand::RemoveSession { node } => {
            println!("{}", client.remove_session(&node).await?)
        }
        ClientCommand::SessionCount { node } => println!("{}", client.session_count(&node).await?),
        ClientCommand::ResetSessions { node } => client.reset_sessions(&node).await?,
        ClientCommand::ResetAllSessions => client.reset_all_sessions().await?,
        ClientCommand::ListHosts => {
            for host in client.list_hosts().await? {
                println!("{host}");
            }
        }
        ClientCommand::AddNode { url } => match client.add_node(&url).await? {
            NodeOutcome::Applied => println!("Added Node:  {url}"),
            _ => println!("Duplicate Node:  {url}"),
        },
        ClientCommand::RemoveNode { url } => match client.remove_node(&url).await? {
            NodeOutcome::Applied => println!("Removed Node:  {url}"),
            _ => println!("Node Not Found:  {url}"),
        },
        ClientCommand::ListNodes => {
            for node in client.list_nodes().await? {
                println!("{node}");
            }
        }
        ClientCommand::Summary => {
            let summary = client.summary().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        ClientCommand::HoldLock { minutes } => {
            let lock = build_lock(&config.lock)?;
            let token = lock
                .try_acquire(config.lock.acquire_timeout())
                .await
                .context("acquiring lock")?;
            info!(resource = %token.resource(), minutes, "Holding lock");
            tokio::time::sleep(Duration::from_secs(minutes * 60)).await;
            token.release();
            info!("Lock released");
        }
    }

    Ok(())
}

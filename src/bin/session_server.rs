//! Session Server Binary
//!
//! Runs the coordination service: accepts protocol connections and
//! periodically cleans idle nodes.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{debug, error, info};

use session_coordinator::config::ConfigLoader;
use session_coordinator::logging::init_structured_logging;
use session_coordinator::{bootstrap, CoordinatorError, LockBackend};

const NODE_EXAMPLES: &str = "Valid Node URL examples:
1)  http://127.0.0.1
2)  http://domain.com
3)  http://127.0.0.1:4444
4)  http://domain.com:4444";

const USAGE_EXAMPLES: &str = "Examples:
1)  Infinite connections allowed:  session-server --port 4000 http://127.0.0.1:4444
2)  Max 100 connections allowed:  session-server --port 4000 --max-connections 100 http://127.0.0.1:4444
3)  Multiple Nodes:  session-server --port 4000 http://127.0.0.1:4444 http://test.com
4)  Cleanup every 10m:  session-server --port 4000 --poll-minutes 10 http://127.0.0.1:4444";

#[derive(Debug, Parser)]
#[command(name = "session-server", version, about, after_help = USAGE_EXAMPLES)]
struct Cli {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Max connections to accept, 0 for unlimited
    #[arg(long)]
    max_connections: Option<usize>,

    /// Minutes between cleanup passes (minimum 1)
    #[arg(long)]
    poll_minutes: Option<u64>,

    /// Cross-process lock backend
    #[arg(long)]
    lock_backend: Option<LockBackend>,

    /// Program run as `<command> <host> <port>` against idle nodes
    #[arg(long)]
    cleanup_command: Option<String>,

    /// Nodes to perform cleanup on
    nodes: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(CoordinatorError::InvalidNode(node)) = e.downcast_ref::<CoordinatorError>() {
                eprintln!("Error: At least one of the node URLs was invalid:  {node}");
                eprintln!();
                eprintln!("{NODE_EXAMPLES}");
            } else {
                error!("{:#}", e);
                eprintln!("Error: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    let mut config = loader.load().context("loading configuration")?;

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(max_connections) = cli.max_connections {
        config.server.max_connections = max_connections;
    }
    if let Some(poll_minutes) = cli.poll_minutes {
        config.cleanup.poll_interval_minutes = poll_minutes;
    }
    if let Some(backend) = cli.lock_backend {
        config.lock.backend = backend;
    }
    if let Some(command) = cli.cleanup_command {
        config.cleanup.command = command;
    }
    config.cleanup.nodes.extend(cli.nodes);

    init_structured_logging(&config.logging);
    // Loading ran before the subscriber existed
    debug!("Configuration loaded successfully: {}", config.to_json_pretty());

    if config.cleanup.nodes.is_empty() {
        anyhow::bail!("at least one node must be specified\n\n{USAGE_EXAMPLES}");
    }

    let mut handle = bootstrap(&config).await?;
    info!(address = %handle.address, "Session server ready");

    signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("Shutdown signal received");

    handle.stop().await?;
    Ok(())
}

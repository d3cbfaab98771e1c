//! btclight node binary.
//!
//! Seeds or restores the header store, then serves the JSON-RPC interface
//! until interrupted.

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use btclight_core::constants::Network;
use btclight_node_lib::{LogFormat, Node, NodeConfig, start_rpc_server};
use tracing::{error, info};

/// Bitcoin header light client with SPV verification.
#[derive(Parser, Debug)]
#[command(
    name = "btclight-node",
    version,
    about = "Fork-aware Bitcoin header light client with a JSON-RPC server"
)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bitcoin network (mainnet, testnet3, simnet, signet, regressionnet)
    #[arg(long)]
    network: Option<Network>,

    /// Data directory; each network gets a subdirectory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Bootstrap JSON used when the database is empty
    #[arg(long)]
    bootstrap: Option<PathBuf>,

    /// RPC server bind address
    #[arg(long)]
    rpc_bind: Option<String>,

    /// RPC server port
    #[arg(long)]
    rpc_port: Option<u16>,

    /// Blocks the best fork must lead the checkpoint by before finalizing
    #[arg(long)]
    max_fork_age: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format ("text" or "json")
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Args {
    /// Layer CLI flags over the file and environment configuration.
    fn into_config(self) -> Result<NodeConfig> {
        let mut config =
            NodeConfig::load(self.config.as_deref()).context("failed to load configuration")?;

        if let Some(network) = self.network {
            config.network = network;
        }
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(path) = self.bootstrap {
            config.bootstrap_path = Some(path);
        }
        if let Some(bind) = self.rpc_bind {
            config.rpc_bind = bind;
        }
        if let Some(port) = self.rpc_port {
            config.rpc_port = port;
        }
        if let Some(age) = self.max_fork_age {
            config.max_fork_age = age;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    let config = match Args::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(2);
        }
    };

    init_logging(&config.log_level, config.log_format);

    info!("btclight node v{}", env!("CARGO_PKG_VERSION"));
    info!("network: {}", config.network);
    info!("data_dir: {:?}", config.network_dir());
    info!("rpc_addr: {}", config.rpc_addr());
    info!("max_fork_age: {}", config.max_fork_age);

    if let Err(e) = run(config).await {
        error!("{e:#}");
        process::exit(1);
    }
}

async fn run(config: NodeConfig) -> Result<()> {
    std::fs::create_dir_all(config.network_dir())
        .with_context(|| format!("failed to create {:?}", config.network_dir()))?;

    let node = Node::open(config.clone()).context("failed to start node")?;

    if let Some(cp) = node.checkpoint() {
        info!("chain_tip: height={} hash={}", cp.height, cp.hash());
    }

    let rpc_handle = start_rpc_server(&config.rpc_addr(), node.clone())
        .await
        .context("failed to start RPC server")?;
    info!("RPC server listening on {}", config.rpc_addr());
    info!("btclight node running (Ctrl+C to stop)");

    tokio::select! {
        _ = rpc_handle.clone().stopped() => {
            info!("RPC server exited");
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to install Ctrl+C handler")?;
            info!("received Ctrl+C, shutting down...");
        }
    }

    rpc_handle.stop().ok();
    info!("RPC server stopped");
    node.flush().context("failed to flush storage")?;
    info!("btclight node shutdown complete");
    Ok(())
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// `RUST_LOG` takes precedence over `level_str` when set.
fn init_logging(level_str: &str, format: LogFormat) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_str));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init(),
    }
}

//! replica-sync - Keep DNS filtering appliances in line with a primary
//!
//! This is the main entry point for the replica-sync application.

use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

use replica_sync::config::Config;
use replica_sync::logging::init_tracing;
use replica_sync::service::Service;

/// replica-sync - Keep DNS filtering appliances in line with a primary
#[derive(Parser, Debug)]
#[command(name = "replica-sync")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML configuration file; the environment is used otherwise
    #[arg(short, long, env = "REPLICA_SYNC_CONFIG")]
    config: Option<String>,

    /// Dotenv file loaded into the environment before configuration is read
    #[arg(long, value_name = "PATH")]
    env_file: Option<String>,

    /// Run a single sync and exit, even if a schedule is configured
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    let config = load_config(&args)?;

    // Initialize tracing/logging
    init_tracing(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting replica-sync"
    );
    info!(config = %config.summary(), "Configuration loaded");

    let service = Service::from_config(config)?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(());
    });

    service.run(args.once, shutdown_rx).await?;

    info!("replica-sync shutdown complete");

    Ok(())
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    if let Some(path) = &args.env_file {
        // Use eprintln! since tracing is not yet initialized
        eprintln!("Loading environment from file: {}", path);
        Config::load_env_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    }

    match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
        None => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from environment variables");
            Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
    }
}

/// Create a future that resolves when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

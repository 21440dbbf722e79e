//! mfd-manager: records "delete this directory" requests per disk.
//!
//! Listens on a Unix socket, routes each request path to its disk's segment
//! writer and relocates finished segments into the disk's final store.
//! SIGINT or SIGTERM stops the listener, drains every disk queue and exits.

use clap::Parser;
use mfdlog_core::{Error, ManagerConfig, Result};
use mfdlog_engine::DiskRegistry;
use mfdlog_server::Listener;
use std::io;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Per-disk delete-event log manager
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML); built-in defaults if omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Socket path, overrides the configuration
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Staging root, overrides the configuration
    #[arg(long)]
    staging_root: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run(args).await {
        error!(error = %e, "mfd-manager failed");
        eprintln!("mfd-manager: {}", e);
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => ManagerConfig::from_file(path)?,
        None => ManagerConfig::default(),
    };
    if let Some(socket) = args.socket {
        config.socket_path = socket;
    }
    if let Some(root) = args.staging_root {
        config.staging_root = root;
    }

    info!(version = env!("CARGO_PKG_VERSION"), "starting mfd-manager");
    let registry = Arc::new(DiskRegistry::from_config(&config)?);
    if !registry.failed_disks().is_empty() {
        warn!(failed = ?registry.failed_disks(), "some disks are unusable");
    }

    let listener = Listener::bind(&config.socket_path, config.socket_mode, Arc::clone(&registry))?;
    listener.run(shutdown_signal()).await?;

    let draining = Arc::clone(&registry);
    tokio::task::spawn_blocking(move || draining.shutdown())
        .await
        .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e)))?;
    info!("exiting");
    Ok(())
}

async fn shutdown_signal() {
    let mut term = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM, waiting for SIGINT only");
            if let Err(e) = signal::ctrl_c().await {
                error!(error = %e, "cannot listen for SIGINT");
            }
            return;
        }
    };
    tokio::select! {
        _ = signal::ctrl_c() => info!("received SIGINT"),
        _ = term.recv() => info!("received SIGTERM"),
    }
}

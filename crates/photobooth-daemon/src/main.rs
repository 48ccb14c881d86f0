//! Photobooth Daemon - background remote backup service
//!
//! This binary runs next to the capture application and handles:
//! - Pushing queued captures to the remote store
//! - Deleting obsolete local captures and backgrounds
//! - Pulling backgrounds added remotely
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The daemon loads the YAML configuration, takes the queue's worker lock
//! (one consumer per queue), wires the queue, the mounted-directory store and
//! the [`SyncWorker`] together, and runs the worker until a
//! `CancellationToken` is triggered by SIGTERM or SIGINT.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::Parser;
use photobooth_core::config::{expand_tilde, Config, LoggingConfig};
use photobooth_sync::{
    queue::OperationQueue,
    store::MountedDirStore,
    worker::{SyncWorker, WorkerSettings},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Photobooth remote backup daemon
#[derive(Parser, Debug)]
#[command(name = "photoboothd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

// ============================================================================
// DaemonService
// ============================================================================

/// Main daemon service that owns the configuration and the shutdown token
struct DaemonService {
    /// Application configuration loaded from YAML
    config: Config,
    /// Token for signalling graceful shutdown to the worker
    shutdown: CancellationToken,
}

impl DaemonService {
    fn new(config: Config, shutdown: CancellationToken) -> Self {
        Self { config, shutdown }
    }

    /// Runs the daemon until shutdown
    ///
    /// 1. Opens the queue and takes its worker lock
    /// 2. Idles if backups are disabled
    /// 3. Opens the store and runs the sync worker
    async fn run(&self) -> Result<()> {
        let backup = &self.config.backup;
        let queue_path = expand_tilde(&backup.queue_file);

        let queue = Arc::new(
            OperationQueue::open(&queue_path)
                .with_context(|| format!("Failed to open queue {}", queue_path.display()))?,
        );
        let _worker_lock = queue
            .try_lock_worker()
            .context("Another instance of photoboothd appears to be running")?;

        if !backup.enabled {
            info!("Remote backup is disabled in the configuration, idling until shutdown");
            self.shutdown.cancelled().await;
            info!("Shutdown signal received");
            return Ok(());
        }

        match queue.len() {
            Ok(pending) => info!(pending, queue = %queue_path.display(), "Opened operation queue"),
            Err(e) => warn!(error = %e, "Could not count pending operations"),
        }

        let store = Arc::new(MountedDirStore::from_config(backup));
        if let Err(e) = store.ensure_available().await {
            warn!(error = %e, "Remote store is not available yet; pushes will be retried");
        }

        let settings = WorkerSettings::from_config(backup).context("Invalid backup configuration")?;
        let worker = SyncWorker::new(queue, store, settings, self.shutdown.clone());
        worker.run().await;

        Ok(())
    }
}

// ============================================================================
// Configuration and logging
// ============================================================================

/// Load the configuration. An explicit path must exist; a missing file at
/// the default path means built-in defaults. Unparsable files are errors.
fn load_config(path: Option<&Path>) -> Result<(Config, PathBuf)> {
    let (config, path) = match path {
        Some(path) => (
            Config::load(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            path.to_path_buf(),
        ),
        None => {
            let path = Config::default_path();
            (Config::load_or_default(&path)?, path)
        }
    };

    let errors = config.validate();
    if !errors.is_empty() {
        let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
        anyhow::bail!("Invalid configuration: {}", details.join("; "));
    }

    Ok((config, path))
}

/// `RUST_LOG` overrides the configured level
fn init_tracing(logging: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Tracing is not up yet, so configuration errors go to stderr via anyhow
    let (config, config_path) = load_config(args.config.as_deref())?;
    init_tracing(&config.logging);

    info!(config_path = %config_path.display(), "Photobooth daemon starting (photoboothd)");

    let shutdown_token = CancellationToken::new();

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = DaemonService::new(config, shutdown_token);
    let result = service.run().await;

    match &result {
        Ok(()) => info!("Photobooth daemon shut down gracefully"),
        Err(e) => error!(error = %e, "Photobooth daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================

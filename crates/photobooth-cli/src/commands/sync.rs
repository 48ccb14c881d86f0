//! Sync command - run the sync worker in the foreground
//!
//! Provides the `photobooth sync` CLI command which:
//! 1. Loads and validates the configuration
//! 2. Opens the queue and takes its worker lock, so it never races a running
//!    `photoboothd`
//! 3. Wires the mounted-directory store into a `SyncWorker`
//! 4. Runs one cycle (`--once`) or loops until Ctrl+C
//!
//! With `--once` a failing queue head is retried at most `--max-attempts`
//! times before the cycle gives up, so scripted runs always terminate.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use photobooth_core::config::expand_tilde;
use photobooth_sync::{
    queue::OperationQueue,
    store::MountedDirStore,
    worker::{CycleReport, SyncWorker, WorkerSettings},
    SyncError,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{open_queue, CommandContext};
use crate::output::{plural, OutputFormatter};

/// Push queued files and reconcile directories
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Run a single drain + reconcile cycle and exit
    #[arg(long)]
    pub once: bool,

    /// With --once, consecutive failed attempts before giving up
    #[arg(
        long,
        default_value_t = 3,
        requires = "once",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub max_attempts: u32,
}

impl SyncCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config()?;
        let backup = &config.backup;

        if !backup.enabled {
            formatter.warn("Remote backup is disabled (backup.enabled = false)");
            return Ok(());
        }

        let queue: Arc<OperationQueue> = Arc::new(open_queue(&config)?);
        let _worker_lock = match queue.try_lock_worker() {
            Ok(lock) => lock,
            Err(SyncError::WorkerLocked(path)) => {
                formatter.error(&format!(
                    "The queue is already being processed, is photoboothd running? (lock: {})",
                    path.display()
                ));
                anyhow::bail!("Queue {} is locked by another worker", queue.path().display());
            }
            Err(e) => return Err(e).context("Failed to lock the queue"),
        };

        let store = Arc::new(MountedDirStore::from_config(backup));
        if let Err(e) = store.ensure_available().await {
            formatter.warn(&format!("{e:#}"));
        }
        let mut settings =
            WorkerSettings::from_config(backup).context("Invalid backup configuration")?;
        if self.once {
            settings.max_attempts = Some(self.max_attempts);
        }

        let cancel = CancellationToken::new();
        let ctrl_c_token = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping after the current step");
                ctrl_c_token.cancel();
            }
        });

        let worker = SyncWorker::new(queue, store.clone(), settings, cancel);

        if !self.once {
            formatter.info(&format!(
                "Syncing {} to {} (Ctrl+C to stop)",
                expand_tilde(&backup.local_root).display(),
                store.root().display()
            ));
            worker.run().await;
            formatter.success("Sync worker stopped");
            return Ok(());
        }

        formatter.info("Starting synchronization...");
        let report = worker.run_cycle().await;

        if ctx.is_json() {
            formatter.print_json(&report_json(&report));
        } else {
            print_report(formatter.as_ref(), &report);
        }

        if report.drain.gave_up {
            anyhow::bail!(
                "Gave up after {} failed attempt{}",
                report.drain.failed_attempts,
                plural(report.drain.failed_attempts as usize)
            );
        }
        Ok(())
    }
}

fn report_json(report: &CycleReport) -> serde_json::Value {
    let drain = &report.drain;
    serde_json::json!({
        "pushed": drain.pushed,
        "skipped": drain.skipped,
        "rejected": drain.rejected,
        "failed_attempts": drain.failed_attempts,
        "last_error": drain.last_error,
        "gave_up": drain.gave_up,
        "deleted": report.reconcile.as_ref().map_or(0, |r| r.deleted.len()),
        "downloaded": report.reconcile.as_ref().map_or(0, |r| r.downloaded.len()),
        "errors": report.reconcile.as_ref().map(|r| r.errors.clone()).unwrap_or_default(),
        "stopped": report.stopped(),
        "duration_ms": drain.duration_ms
            + report.reconcile.as_ref().map_or(0, |r| r.duration_ms),
    })
}

fn print_report(formatter: &dyn OutputFormatter, report: &CycleReport) {
    let drain = &report.drain;
    let (deleted, downloaded, errors, reconcile_ms) = match &report.reconcile {
        Some(r) => (r.deleted.len(), r.downloaded.len(), r.errors.as_slice(), r.duration_ms),
        None => (0, 0, &[][..], 0),
    };
    let duration = format_duration_ms(drain.duration_ms + reconcile_ms);

    if drain.gave_up {
        formatter.error(&format!(
            "Sync gave up after {duration}, reconciliation skipped"
        ));
    } else if report.stopped() {
        formatter.warn(&format!("Sync interrupted after {duration}"));
    } else if drain.pushed + drain.skipped + drain.rejected == 0
        && deleted + downloaded == 0
        && errors.is_empty()
    {
        formatter.success("Already up to date");
    } else {
        formatter.success(&format!("Sync completed in {duration}"));
    }

    let counts = [
        ("Uploaded:  ", drain.pushed as usize),
        ("Skipped:   ", drain.skipped as usize),
        ("Rejected:  ", drain.rejected as usize),
        ("Deleted:   ", deleted),
        ("Downloaded:", downloaded),
    ];
    for (label, count) in counts {
        if count > 0 {
            formatter.info(&format!("{label} {count} file{}", plural(count)));
        }
    }

    if drain.failed_attempts > 0 {
        formatter.warn(&format!(
            "{} failed attempt{} (last: {})",
            drain.failed_attempts,
            plural(drain.failed_attempts as usize),
            drain.last_error.as_deref().unwrap_or("unknown")
        ));
    }
    if !errors.is_empty() {
        formatter.error(&format!(
            "{} error{} occurred:",
            errors.len(),
            plural(errors.len())
        ));
        for error in errors {
            formatter.info(&format!("- {error}"));
        }
    }
}

/// `850ms`, `1.5s`
fn format_duration_ms(ms: u64) -> String {
    if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{ms}ms")
    }
}

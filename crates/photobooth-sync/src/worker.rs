//! Sync worker - drains the operation queue and reconciles directories
//!
//! The [`SyncWorker`] is the single consumer of the [`OperationQueue`]. Each
//! cycle it pushes queued files to the remote store in strict FIFO order,
//! then runs the reconciliation steps, then idles briefly.
//!
//! ## States
//!
//! ```text
//!            queue empty                 steps done
//! Draining ─────────────→ Reconciling ─────────────→ IdleWait ──┐
//!    ↑  │ push failed                                            │
//!    │  └──────────→ IdleWait (retry interval) ──┐               │
//!    └───────────────────────────────────────────┴───────────────┘
//!
//! any wait point + stop signal ──→ Stopped
//! ```
//!
//! A failed push keeps the operation at the head and is retried after
//! `retry_interval`, indefinitely unless `max_attempts` bounds the drain;
//! nothing behind it is processed meanwhile. An in-flight push is never
//! aborted by the stop signal.
//!
//! The worker never creates `remote_root` itself. A missing remote root means
//! the store is not the expected one, so pushes and reconciliation fail
//! instead.

use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use photobooth_core::{
    config::{expand_tilde, BackupConfig},
    domain::{Operation, RelativePath, RemotePath},
    ports::IRemoteStore,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::queue::OperationQueue;
use crate::reconcile::{self, ReconcileReport, StepReport};
use crate::SyncError;

// ============================================================================
// WorkerState
// ============================================================================

/// Observable state of the sync worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    /// Pushing queued operations
    Draining,
    /// Running obsolete-deletion and pull-missing
    Reconciling,
    /// Waiting before a retry or the next cycle
    IdleWait,
    /// Terminal; the stop signal was observed
    Stopped,
}

impl WorkerState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draining => "draining",
            Self::Reconciling => "reconciling",
            Self::IdleWait => "idle",
            Self::Stopped => "stopped",
        }
    }
}

impl Display for WorkerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// WorkerSettings
// ============================================================================

/// Runtime parameters of the sync worker
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Local directory that queued relative paths are resolved against
    pub local_root: PathBuf,
    /// Remote directory mirroring `local_root`
    pub remote_root: RemotePath,
    /// Captures directory (obsolete-deletion)
    pub captures_dir: RelativePath,
    /// Backgrounds directory (obsolete-deletion and pull)
    pub backgrounds_dir: RelativePath,
    /// Local file name never deleted by reconciliation
    pub placeholder: String,
    pub retry_interval: Duration,
    pub step_pause: Duration,
    pub cycle_pause: Duration,
    pub obsolete_grace: Duration,
    /// Consecutive failures after which a drain gives up; `None` retries
    /// forever
    pub max_attempts: Option<u32>,
}

impl WorkerSettings {
    /// Settings for the given roots with the default directory names and
    /// timings.
    ///
    /// # Errors
    /// Returns error if the default directory names fail validation.
    pub fn new(local_root: impl Into<PathBuf>, remote_root: RemotePath) -> anyhow::Result<Self> {
        let defaults = BackupConfig::default();
        Ok(Self {
            local_root: local_root.into(),
            remote_root,
            captures_dir: defaults.captures_path()?,
            backgrounds_dir: defaults.backgrounds_path()?,
            placeholder: defaults.placeholder.clone(),
            retry_interval: defaults.retry_interval(),
            step_pause: defaults.step_pause(),
            cycle_pause: defaults.cycle_pause(),
            obsolete_grace: defaults.obsolete_grace(),
            max_attempts: None,
        })
    }

    /// Build settings from the `backup` configuration section
    ///
    /// # Errors
    /// Returns error if the remote root or a directory name is invalid.
    pub fn from_config(config: &BackupConfig) -> anyhow::Result<Self> {
        Ok(Self {
            local_root: expand_tilde(&config.local_root),
            remote_root: config.remote_root_path()?,
            captures_dir: config.captures_path()?,
            backgrounds_dir: config.backgrounds_path()?,
            placeholder: config.placeholder.clone(),
            retry_interval: config.retry_interval(),
            step_pause: config.step_pause(),
            cycle_pause: config.cycle_pause(),
            obsolete_grace: config.obsolete_grace(),
            max_attempts: None,
        })
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Outcome of one drain pass
#[derive(Debug, Clone, Default)]
pub struct DrainReport {
    /// Operations pushed and removed from the queue
    pub pushed: u32,
    /// Operations dropped because the local file no longer exists
    pub skipped: u32,
    /// Unparsable lines moved to the rejected file
    pub rejected: u32,
    /// Failed push or queue attempts that led to a retry wait
    pub failed_attempts: u32,
    /// Most recent failure
    pub last_error: Option<String>,
    /// Whether the pass ended on the stop signal
    pub stopped: bool,
    /// Whether the pass ended after `max_attempts` consecutive failures
    pub gave_up: bool,
    pub duration_ms: u64,
}

/// Outcome of one drain + reconcile cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub drain: DrainReport,
    /// `None` if the drain gave up, or the worker stopped before
    /// reconciliation started
    pub reconcile: Option<ReconcileReport>,
}

impl CycleReport {
    /// Whether the cycle ended on the stop signal
    #[must_use]
    pub fn stopped(&self) -> bool {
        self.drain.stopped
            || self
                .reconcile
                .as_ref()
                .map_or(!self.drain.gave_up, |r| !r.completed)
    }
}

enum PushOutcome {
    Uploaded,
    LocalMissing,
}

#[derive(Clone, Copy)]
enum Step<'a> {
    RemoveObsolete(&'a RelativePath),
    PullMissing(&'a RelativePath),
}

impl Display for Step<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoveObsolete(dir) => write!(f, "obsolete-deletion in {dir}"),
            Self::PullMissing(dir) => write!(f, "pull-missing in {dir}"),
        }
    }
}

// ============================================================================
// SyncWorker
// ============================================================================

/// Single background consumer of the operation queue
pub struct SyncWorker {
    queue: Arc<OperationQueue>,
    store: Arc<dyn IRemoteStore>,
    settings: WorkerSettings,
    cancel: CancellationToken,
    state_tx: watch::Sender<WorkerState>,
}

impl SyncWorker {
    pub fn new(
        queue: Arc<OperationQueue>,
        store: Arc<dyn IRemoteStore>,
        settings: WorkerSettings,
        cancel: CancellationToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(WorkerState::Draining);
        Self {
            queue,
            store,
            settings,
            cancel,
            state_tx,
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> WorkerState {
        *self.state_tx.borrow()
    }

    /// Receiver that observes every state change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state_tx.subscribe()
    }

    #[must_use]
    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    /// Run cycles until the stop signal is observed.
    pub async fn run(&self) {
        info!(
            queue = %self.queue.path().display(),
            local_root = %self.settings.local_root.display(),
            remote_root = %self.settings.remote_root,
            "Sync worker starting"
        );

        loop {
            let report = self.run_cycle().await;
            if report.stopped() {
                break;
            }
            if !self.pause(self.settings.cycle_pause, WorkerState::IdleWait).await {
                break;
            }
        }

        self.set_state(WorkerState::Stopped);
        info!("Sync worker stopped");
    }

    /// One drain pass followed by one reconciliation pass.
    pub async fn run_cycle(&self) -> CycleReport {
        let drain = self.drain().await;
        if drain.gave_up {
            // Reconciling now could delete captures whose push is still queued
            warn!(
                failed_attempts = drain.failed_attempts,
                last_error = drain.last_error.as_deref().unwrap_or_default(),
                "Drain gave up, skipping reconciliation"
            );
        }
        if drain.stopped || drain.gave_up {
            return CycleReport {
                drain,
                reconcile: None,
            };
        }

        let reconcile = self.reconcile().await;
        info!(
            pushed = drain.pushed,
            skipped = drain.skipped,
            rejected = drain.rejected,
            failed_attempts = drain.failed_attempts,
            deleted = reconcile.deleted.len(),
            downloaded = reconcile.downloaded.len(),
            errors = reconcile.errors.len(),
            "Sync cycle completed"
        );

        CycleReport {
            drain,
            reconcile: Some(reconcile),
        }
    }

    /// Push queued operations until the queue is empty or the stop signal
    /// is observed.
    #[instrument(skip(self))]
    pub async fn drain(&self) -> DrainReport {
        let start = Instant::now();
        let mut report = DrainReport::default();
        let mut streak = 0;
        self.set_state(WorkerState::Draining);

        loop {
            if self.cancel.is_cancelled() {
                report.stopped = true;
                break;
            }

            let op = match self.with_queue(|q| q.peek_head()).await {
                Ok(Some(op)) => op,
                Ok(None) => break,
                Err(SyncError::MalformedEntry { line, source }) => {
                    error!(%line, error = %source, "Malformed queue head, moving it to the rejected file");
                    match self.with_queue(|q| q.reject_head()).await {
                        Ok(_) => report.rejected += 1,
                        Err(e) => {
                            error!(error = %e, "Failed to reject queue head");
                            if !self.retry_wait(&mut report, &mut streak, e.to_string()).await {
                                break;
                            }
                        }
                    }
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "Failed to read queue head");
                    if !self.retry_wait(&mut report, &mut streak, e.to_string()).await {
                        break;
                    }
                    continue;
                }
            };

            let outcome = match self.push(&op).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let msg = format!("Push of {} failed: {e:#}", op.path());
                    warn!(
                        %msg,
                        retry_in_secs = self.settings.retry_interval.as_secs(),
                        "Keeping operation at the head of the queue"
                    );
                    if !self.retry_wait(&mut report, &mut streak, msg).await {
                        break;
                    }
                    continue;
                }
            };

            if let Err(e) = self.with_queue(|q| q.remove_head()).await {
                error!(operation = %op, error = %e, "Failed to remove queue head");
                if !self.retry_wait(&mut report, &mut streak, e.to_string()).await {
                    break;
                }
                continue;
            }

            streak = 0;
            match outcome {
                PushOutcome::Uploaded => report.pushed += 1,
                PushOutcome::LocalMissing => {
                    warn!(operation = %op, "Local file no longer exists, dropping operation");
                    report.skipped += 1;
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        debug!(
            pushed = report.pushed,
            skipped = report.skipped,
            stopped = report.stopped,
            gave_up = report.gave_up,
            "Drain finished"
        );
        report
    }

    /// Run obsolete-deletion for the captures and backgrounds directories,
    /// then pull-missing for the backgrounds directory, pausing before each
    /// step.
    ///
    /// Step failures are logged and recorded; they never abort the pass.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> ReconcileReport {
        let start = Instant::now();
        let mut report = ReconcileReport::default();
        self.set_state(WorkerState::Reconciling);

        let steps = [
            Step::RemoveObsolete(&self.settings.captures_dir),
            Step::RemoveObsolete(&self.settings.backgrounds_dir),
            Step::PullMissing(&self.settings.backgrounds_dir),
        ];

        report.completed = true;
        for step in steps {
            if !self.pause(self.settings.step_pause, WorkerState::Reconciling).await {
                report.completed = false;
                break;
            }

            match self.run_step(step).await {
                Ok(step_report) => report.merge(step_report),
                Err(e) => {
                    let msg = format!("{step} failed: {e:#}");
                    warn!(%msg);
                    report.errors.push(msg);
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        report
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    #[instrument(skip(self, op), fields(operation = %op))]
    async fn push(&self, op: &Operation) -> anyhow::Result<PushOutcome> {
        let local = op.path().to_local(&self.settings.local_root);
        if !tokio::fs::try_exists(&local).await? {
            return Ok(PushOutcome::LocalMissing);
        }

        self.check_remote_root().await?;
        let remote = self.settings.remote_root.join_relative(op.path())?;
        if let Some(parent) = remote.parent() {
            reconcile::ensure_remote_dir(self.store.as_ref(), &parent).await?;
        }

        self.store.upload(&local, &remote).await?;
        debug!(remote = %remote, "push confirmed");
        Ok(PushOutcome::Uploaded)
    }

    async fn run_step(&self, step: Step<'_>) -> anyhow::Result<StepReport> {
        self.check_remote_root().await?;
        let store = self.store.as_ref();
        match step {
            Step::RemoveObsolete(dir) => {
                let remote = self.settings.remote_root.join_relative(dir)?;
                reconcile::remove_obsolete(
                    store,
                    &dir.to_local(&self.settings.local_root),
                    &remote,
                    &self.settings.placeholder,
                    self.settings.obsolete_grace,
                )
                .await
            }
            Step::PullMissing(dir) => {
                let remote = self.settings.remote_root.join_relative(dir)?;
                reconcile::pull_missing(
                    store,
                    &dir.to_local(&self.settings.local_root),
                    &remote,
                    &self.settings.placeholder,
                )
                .await
            }
        }
    }

    /// Fail unless `remote_root` already exists on the store
    async fn check_remote_root(&self) -> anyhow::Result<()> {
        let root = &self.settings.remote_root;
        if !root.is_root() && !self.store.exists(root).await? {
            anyhow::bail!("Remote root {root} does not exist on the store");
        }
        Ok(())
    }

    /// Run a blocking queue call off the async runtime
    async fn with_queue<T, F>(&self, f: F) -> Result<T, SyncError>
    where
        F: FnOnce(&OperationQueue) -> Result<T, SyncError> + Send + 'static,
        T: Send + 'static,
    {
        let queue = Arc::clone(&self.queue);
        tokio::task::spawn_blocking(move || f(queue.as_ref())).await?
    }

    /// Record a failure and wait `retry_interval`. Returns `false` if the
    /// drain must end: the stop signal ended the wait, or `streak` reached
    /// `max_attempts`.
    async fn retry_wait(&self, report: &mut DrainReport, streak: &mut u32, msg: String) -> bool {
        report.failed_attempts += 1;
        report.last_error = Some(msg);
        *streak += 1;

        if self.settings.max_attempts.is_some_and(|max| *streak >= max) {
            report.gave_up = true;
            return false;
        }

        if !self.pause(self.settings.retry_interval, WorkerState::IdleWait).await {
            report.stopped = true;
            return false;
        }
        self.set_state(WorkerState::Draining);
        true
    }

    /// Wait for `duration` in `state`. Returns `false` if the stop signal was
    /// observed before or during the wait.
    async fn pause(&self, duration: Duration, state: WorkerState) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.set_state(state);

        tokio::select! {
            _ = self.cancel.cancelled() => {
                debug!(%state, "Stop signal received while waiting");
                false
            }
            _ = tokio::time::sleep(duration) => true,
        }
    }

    fn set_state(&self, state: WorkerState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Worker state changed");
        }
    }
}

//! Directory reconciliation
//!
//! Two steps run by the worker after the queue is drained:
//!
//! - [`remove_obsolete`] deletes local files that no longer exist remotely
//!   once they are older than a grace period. Young files are kept because
//!   their push may still be queued.
//! - [`pull_missing`] downloads remote files that are absent locally.
//!
//! Neither step ever deletes remote files or overwrites an existing local
//! file. Per-file failures are collected in the [`StepReport`] and do not stop
//! the remaining files.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use photobooth_core::{domain::RemotePath, ports::IRemoteStore};
use tracing::{debug, info, warn};

// ============================================================================
// Reports
// ============================================================================

/// Outcome of a single reconciliation step
#[derive(Debug, Clone, Default)]
pub struct StepReport {
    /// Local files deleted as obsolete
    pub deleted: Vec<PathBuf>,
    /// Local files downloaded from the remote store
    pub downloaded: Vec<PathBuf>,
    /// Per-file errors
    pub errors: Vec<String>,
}

/// Outcome of a full reconciliation pass
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub deleted: Vec<PathBuf>,
    pub downloaded: Vec<PathBuf>,
    /// Step and per-file errors
    pub errors: Vec<String>,
    /// Whether every step ran (false when stopped part-way)
    pub completed: bool,
    pub duration_ms: u64,
}

impl ReconcileReport {
    /// Fold one step's outcome into this report
    pub fn merge(&mut self, step: StepReport) {
        self.deleted.extend(step.deleted);
        self.downloaded.extend(step.downloaded);
        self.errors.extend(step.errors);
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Make sure `dir` exists on the store, creating missing ancestors top-down.
///
/// Returns `true` if anything had to be created.
pub async fn ensure_remote_dir(store: &dyn IRemoteStore, dir: &RemotePath) -> anyhow::Result<bool> {
    let mut missing = Vec::new();
    let mut current = Some(dir.clone());

    while let Some(path) = current {
        if path.is_root() || store.exists(&path).await? {
            break;
        }
        current = path.parent();
        missing.push(path);
    }

    let created = !missing.is_empty();
    for path in missing.into_iter().rev() {
        debug!(path = %path, "creating remote directory");
        store.mkdir(&path).await?;
    }
    Ok(created)
}

/// Names of the remote entries in `dir`; empty base names are skipped
async fn remote_names(store: &dyn IRemoteStore, dir: &RemotePath) -> anyhow::Result<HashSet<String>> {
    Ok(store
        .list(dir)
        .await?
        .iter()
        .map(|entry| entry.base_name())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect())
}

// ============================================================================
// Obsolete deletion
// ============================================================================

/// Delete local files in `local_dir` that are absent from `remote_dir`.
///
/// A file is deleted only if it is a regular file, is not named
/// `placeholder`, and its modification time is more than `grace` in the past.
/// A missing local directory means there is nothing to delete.
///
/// # Errors
/// Fails if the remote directory cannot be created or listed, or the local
/// directory cannot be read. Per-file failures go to the report instead.
pub async fn remove_obsolete(
    store: &dyn IRemoteStore,
    local_dir: &Path,
    remote_dir: &RemotePath,
    placeholder: &str,
    grace: Duration,
) -> anyhow::Result<StepReport> {
    let mut report = StepReport::default();

    if ensure_remote_dir(store, remote_dir).await? {
        info!(remote = %remote_dir, "created missing remote directory");
    }
    let remote = remote_names(store, remote_dir).await?;

    let mut entries = match tokio::fs::read_dir(local_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(local = %local_dir.display(), "local directory missing, nothing to delete");
            return Ok(report);
        }
        Err(e) => return Err(e.into()),
    };

    let now = SystemTime::now();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();

        if name == placeholder || remote.contains(&*name) {
            continue;
        }

        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                report.errors.push(format!("{}: {e}", path.display()));
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }

        let age = match metadata.modified() {
            Ok(mtime) => now.duration_since(mtime).unwrap_or_default(),
            Err(e) => {
                report.errors.push(format!("{}: {e}", path.display()));
                continue;
            }
        };
        if age <= grace {
            debug!(path = %path.display(), age_secs = age.as_secs(), "keeping recent local file");
            continue;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(path = %path.display(), "deleted obsolete local file");
                report.deleted.push(path);
            }
            Err(e) => {
                let msg = format!("Failed to delete {}: {e}", path.display());
                warn!(%msg);
                report.errors.push(msg);
            }
        }
    }

    Ok(report)
}

// ============================================================================
// Pull missing
// ============================================================================

/// Download every file in `remote_dir` that is absent from `local_dir`.
///
/// If the remote directory does not exist it is created and nothing is
/// pulled. Remote subdirectories and a file named `placeholder` are skipped;
/// the local directory is created if missing.
///
/// # Errors
/// Fails if the remote directory cannot be checked, created or listed, or
/// the local directory cannot be read. Per-file download failures go to the
/// report instead.
pub async fn pull_missing(
    store: &dyn IRemoteStore,
    local_dir: &Path,
    remote_dir: &RemotePath,
    placeholder: &str,
) -> anyhow::Result<StepReport> {
    let mut report = StepReport::default();

    if ensure_remote_dir(store, remote_dir).await? {
        info!(remote = %remote_dir, "created missing remote directory, nothing to pull");
        return Ok(report);
    }

    let listing = store.list(remote_dir).await?;

    tokio::fs::create_dir_all(local_dir).await?;
    let mut local = HashSet::new();
    let mut entries = tokio::fs::read_dir(local_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        local.insert(entry.file_name().to_string_lossy().into_owned());
    }

    for entry in listing.iter().filter(|entry| !entry.is_directory) {
        let name = entry.base_name();
        if name.is_empty() || name == placeholder || local.contains(name) {
            continue;
        }

        let target = local_dir.join(name);
        let result = match remote_dir.join(name) {
            Ok(remote) => store.download(&remote, &target).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) => {
                info!(path = %target.display(), "pulled remote file");
                report.downloaded.push(target);
            }
            Err(e) => {
                let msg = format!("Failed to download {name}: {e}");
                warn!(%msg);
                report.errors.push(msg);
            }
        }
    }

    Ok(report)
}

//! Mounted-directory remote store (secondary/driven adapter)
//!
//! Implements [`IRemoteStore`] over a local directory, typically a network
//! share mounted on the appliance. Remote paths are resolved under the store
//! root.
//!
//! ## Design Decisions
//!
//! - **Availability check**: an unmounted share is just an empty local
//!   directory. Every call first verifies that the store root is really the
//!   share (a mount point, or a directory holding the configured marker file)
//!   and fails otherwise, so reconciliation never mistakes a missing share for
//!   an empty one.
//! - **Atomic copies**: uploads and downloads copy to a hidden `.<name>.tmp`
//!   sibling and rename. Leftover temporaries are not listed.
//! - **Single-level mkdir**: `mkdir` creates exactly one directory and fails
//!   if the parent is missing, like a collection create on a remote server.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use photobooth_core::{
    config::{expand_tilde, BackupConfig},
    domain::RemotePath,
    ports::{IRemoteStore, RemoteEntry},
};
use tracing::{debug, instrument};

const TMP_SUFFIX: &str = ".tmp";

/// How the store decides that its root is the mounted share
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCheck {
    /// The root must be a mount point
    MountPoint,
    /// The root must contain a file or directory with this name
    Marker(String),
}

/// Adapter that maps the [`IRemoteStore`] port onto a mounted directory.
#[derive(Debug, Clone)]
pub struct MountedDirStore {
    root: PathBuf,
    check: StoreCheck,
}

impl MountedDirStore {
    /// Create a store rooted at `root`, which must be a mount point.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            check: StoreCheck::MountPoint,
        }
    }

    /// Create a store rooted at `root`, available while `root/<marker>` exists.
    #[must_use]
    pub fn with_marker(root: impl Into<PathBuf>, marker: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            check: StoreCheck::Marker(marker.into()),
        }
    }

    /// Store described by the `backup` configuration section
    #[must_use]
    pub fn from_config(config: &BackupConfig) -> Self {
        let root = expand_tilde(&config.store_root);
        match &config.store_marker {
            Some(marker) => Self::with_marker(root, marker.clone()),
            None => Self::new(root),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn check(&self) -> &StoreCheck {
        &self.check
    }

    /// Local location of a remote path
    #[must_use]
    pub fn resolve(&self, remote: &RemotePath) -> PathBuf {
        remote
            .as_str()
            .split('/')
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |acc, part| acc.join(part))
    }

    /// Fail unless the store root is the mounted share.
    ///
    /// # Errors
    /// Returns error if the root is missing, is not a mount point, or lacks
    /// the marker, depending on [`StoreCheck`].
    pub async fn ensure_available(&self) -> anyhow::Result<()> {
        let metadata = tokio::fs::metadata(&self.root)
            .await
            .with_context(|| format!("Store root {} is not available", self.root.display()))?;
        if !metadata.is_dir() {
            anyhow::bail!("Store root {} is not a directory", self.root.display());
        }

        match &self.check {
            StoreCheck::MountPoint => {
                if !is_mount_point(&self.root).await? {
                    anyhow::bail!(
                        "Store root {} is not a mount point; is the share mounted?",
                        self.root.display()
                    );
                }
            }
            StoreCheck::Marker(marker) => {
                if !tokio::fs::try_exists(self.root.join(marker)).await? {
                    anyhow::bail!(
                        "Marker {marker} not found in store root {}; is the share mounted?",
                        self.root.display()
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
async fn is_mount_point(path: &Path) -> std::io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let path = tokio::fs::canonicalize(path).await?;
    let Some(parent) = path.parent() else {
        return Ok(true);
    };
    let own = tokio::fs::metadata(&path).await?;
    let above = tokio::fs::metadata(parent).await?;
    Ok(own.dev() != above.dev() || own.ino() == above.ino())
}

#[cfg(not(unix))]
async fn is_mount_point(_path: &Path) -> std::io::Result<bool> {
    // No portable way to tell; configure a marker instead
    Ok(false)
}

/// Hidden temporary sibling of `path`: `dir/.name.tmp`
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}{TMP_SUFFIX}"))
}

/// Whether `name` is a temporary left by an interrupted copy
fn is_temp_name(name: &str) -> bool {
    name.len() > 1 + TMP_SUFFIX.len() && name.starts_with('.') && name.ends_with(TMP_SUFFIX)
}

/// Copy `from` to `to` through a hidden temporary sibling of `to`.
async fn copy_atomic(from: &Path, to: &Path) -> std::io::Result<u64> {
    let tmp_path = temp_sibling(to);

    debug!(?tmp_path, "copying to temporary file");
    let bytes = match tokio::fs::copy(from, &tmp_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e);
        }
    };

    tokio::fs::rename(&tmp_path, to).await?;
    Ok(bytes)
}

#[async_trait::async_trait]
impl IRemoteStore for MountedDirStore {
    #[instrument(skip(self), fields(path = %path))]
    async fn exists(&self, path: &RemotePath) -> anyhow::Result<bool> {
        self.ensure_available().await?;
        let exists = tokio::fs::try_exists(self.resolve(path)).await?;
        debug!(exists, "existence checked");
        Ok(exists)
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn mkdir(&self, path: &RemotePath) -> anyhow::Result<()> {
        self.ensure_available().await?;
        match tokio::fs::create_dir(self.resolve(path)).await {
            Ok(()) => {
                debug!("directory created");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!("directory already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, local), fields(local = %local.display(), remote = %remote))]
    async fn upload(&self, local: &Path, remote: &RemotePath) -> anyhow::Result<()> {
        self.ensure_available().await?;
        let bytes = copy_atomic(local, &self.resolve(remote)).await?;
        debug!(bytes, "upload complete");
        Ok(())
    }

    #[instrument(skip(self, local), fields(remote = %remote, local = %local.display()))]
    async fn download(&self, remote: &RemotePath, local: &Path) -> anyhow::Result<()> {
        self.ensure_available().await?;
        let bytes = copy_atomic(&self.resolve(remote), local).await?;
        debug!(bytes, "download complete");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn list(&self, path: &RemotePath) -> anyhow::Result<Vec<RemoteEntry>> {
        self.ensure_available().await?;
        let mut dir = tokio::fs::read_dir(self.resolve(path)).await?;
        let mut entries = Vec::new();

        while let Some(entry) = dir.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                debug!(name = ?entry.file_name(), "skipping non UTF-8 entry");
                continue;
            };
            if is_temp_name(&name) {
                debug!(%name, "skipping leftover temporary file");
                continue;
            }
            let metadata = entry.metadata().await?;

            entries.push(RemoteEntry {
                name,
                is_directory: metadata.is_dir(),
                size: metadata.is_file().then(|| metadata.len()),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }

        debug!(count = entries.len(), "directory listed");
        Ok(entries)
    }
}

//! Remote store port (driven/secondary port)
//!
//! This module defines the capability surface the sync worker needs from the
//! remote backup target. The engine is agnostic to the transport behind it; an
//! adapter may talk to a network share, an object store or anything else that
//! can answer these five calls.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are adapter-specific
//!   and the worker only needs to know success or failure.
//! - Uses `#[async_trait]` for async trait methods.
//! - The store is driven by a single worker, so implementations need no
//!   locking of their own beyond `Send + Sync`.

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::domain::newtypes::RemotePath;

// ============================================================================
// RemoteEntry
// ============================================================================

/// A single entry returned by [`IRemoteStore::list`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Entry name as reported by the store. Adapters may return a bare name
    /// or a full path; use [`RemoteEntry::base_name`] for comparisons.
    pub name: String,
    /// Whether this entry is a directory
    pub is_directory: bool,
    /// Size in bytes, when the store reports it
    pub size: Option<u64>,
    /// Last modification time, when the store reports it
    pub modified: Option<DateTime<Utc>>,
}

impl RemoteEntry {
    /// Convenience constructor for a plain file entry
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: false,
            size: None,
            modified: None,
        }
    }

    /// Convenience constructor for a directory entry
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: true,
            size: None,
            modified: None,
        }
    }

    /// Last path component of [`name`](Self::name)
    ///
    /// Empty for entries that describe the listed directory itself
    /// (e.g. `"/photobooth/images/"`), which callers skip.
    pub fn base_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or_default()
    }
}

// ============================================================================
// IRemoteStore trait
// ============================================================================

/// Port trait for the remote backup target
#[async_trait::async_trait]
pub trait IRemoteStore: Send + Sync {
    /// Returns whether a file or directory exists at `path`
    async fn exists(&self, path: &RemotePath) -> anyhow::Result<bool>;

    /// Creates the directory at `path`
    async fn mkdir(&self, path: &RemotePath) -> anyhow::Result<()>;

    /// Uploads the local file `local` to `remote`, replacing any existing file
    async fn upload(&self, local: &Path, remote: &RemotePath) -> anyhow::Result<()>;

    /// Downloads `remote` into the local file `local`
    async fn download(&self, remote: &RemotePath, local: &Path) -> anyhow::Result<()>;

    /// Lists the entries of the directory at `path`
    async fn list(&self, path: &RemotePath) -> anyhow::Result<Vec<RemoteEntry>>;
}

//! Photobooth Sync - durable queue and remote backup worker
//!
//! Provides:
//! - A crash-tolerant, line-oriented operation queue shared by producers and
//!   the worker
//! - The background sync worker (drain, reconcile, idle)
//! - Obsolete-deletion and pull-missing reconciliation
//! - A remote store adapter over a mounted directory
//!
//! ## Modules
//!
//! - [`queue`] - Durable FIFO of pending operations
//! - [`worker`] - Sync worker state machine
//! - [`reconcile`] - Directory reconciliation steps
//! - [`store`] - Mounted-directory implementation of [`IRemoteStore`]
//!
//! [`IRemoteStore`]: photobooth_core::ports::IRemoteStore

pub mod queue;
pub mod reconcile;
pub mod store;
pub mod worker;

use std::path::PathBuf;

use photobooth_core::domain::errors::DomainError;
use thiserror::Error;

/// Errors that can occur during queue and synchronization operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error occurred on the queue file or a local directory
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The head of the queue is not a valid operation line
    #[error("Malformed queue entry '{line}': {source}")]
    MalformedEntry {
        line: String,
        #[source]
        source: DomainError,
    },

    /// Another process already consumes this queue
    #[error("Queue is already being processed (lock held on {})", .0.display())]
    WorkerLocked(PathBuf),

    /// A domain-level error propagated from photobooth-core
    #[error("Domain error: {0}")]
    DomainError(#[from] DomainError),

    /// A blocking queue task panicked or was cancelled
    #[error("Queue task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

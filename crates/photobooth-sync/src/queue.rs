//! Durable operation queue
//!
//! A FIFO of [`Operation`]s persisted as one `kind;path` line each in a plain
//! text file. Producers append with [`OperationQueue::enqueue`]; the sync
//! worker reads the head with [`OperationQueue::peek_head`] and drops it with
//! [`OperationQueue::remove_head`] once the remote side has confirmed it.
//!
//! ## Durability
//!
//! - Appends are flushed to disk before `enqueue` returns.
//! - Removal writes the remaining lines to `<file>.tmp`, syncs it and renames
//!   it over the queue file, so a crash leaves either the old or the new
//!   contents and never a torn line.
//!
//! ## Locking
//!
//! Every operation holds an in-process mutex plus an advisory exclusive lock
//! on `<file>.lock` for its whole read-modify-write span. The file lock
//! serializes a producer in another process (the CLI) with the daemon.
//!
//! A queue has at most one consumer. The consumer holds a [`WorkerLock`] on
//! `<file>.worker.lock` for as long as it runs.
//!
//! The API is blocking; async callers go through
//! [`tokio::task::spawn_blocking`].

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use fs2::FileExt;
use photobooth_core::domain::Operation;
use tracing::{debug, instrument, warn};

use crate::SyncError;

/// Append `suffix` to the final component of `path`.
pub(crate) fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Both locks held for the span of one queue operation.
///
/// The advisory lock is released when `_file` is closed on drop.
struct QueueLock<'a> {
    _guard: MutexGuard<'a, ()>,
    _file: File,
}

/// Exclusive right to consume a queue, released on drop.
///
/// The lock file holds the owner's process id.
#[derive(Debug)]
pub struct WorkerLock {
    path: PathBuf,
    _file: File,
}

impl WorkerLock {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Durable FIFO of pending operations backed by a line file.
#[derive(Debug)]
pub struct OperationQueue {
    path: PathBuf,
    lock_path: PathBuf,
    guard: Mutex<()>,
}

impl OperationQueue {
    /// Open the queue at `path`, creating the parent directory and an empty
    /// queue file if missing.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SyncError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        OpenOptions::new().create(true).append(true).open(&path)?;
        debug!("queue file ready");

        Ok(Self {
            lock_path: sibling_with_suffix(&path, ".lock"),
            path,
            guard: Mutex::new(()),
        })
    }

    /// Location of the queue file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Location of the file that receives rejected head lines
    #[must_use]
    pub fn rejected_path(&self) -> PathBuf {
        sibling_with_suffix(&self.path, ".rejected")
    }

    /// Location of the worker lock file
    #[must_use]
    pub fn worker_lock_path(&self) -> PathBuf {
        sibling_with_suffix(&self.path, ".worker.lock")
    }

    /// Try to become the single consumer of this queue.
    ///
    /// # Errors
    /// Returns [`SyncError::WorkerLocked`] if another worker holds the lock.
    pub fn try_lock_worker(&self) -> Result<WorkerLock, SyncError> {
        let path = self.worker_lock_path();
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        file.try_lock_exclusive()
            .map_err(|_| SyncError::WorkerLocked(path.clone()))?;

        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.sync_data()?;

        debug!(lock = %path.display(), "worker lock acquired");
        Ok(WorkerLock { path, _file: file })
    }

    /// Append an operation to the tail of the queue.
    ///
    /// Returns only after the line has been flushed to disk. Storage failures
    /// are returned to the caller and not retried.
    pub fn enqueue(&self, op: &Operation) -> Result<(), SyncError> {
        let _lock = self.lock()?;

        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(format!("{}\n", op.to_line()).as_bytes())?;
        file.sync_data()?;

        debug!(operation = %op, "operation enqueued");
        Ok(())
    }

    /// First pending operation, or `None` when the queue is empty.
    ///
    /// Whitespace-only lines are skipped.
    ///
    /// # Errors
    /// Returns [`SyncError::MalformedEntry`] if the head line cannot be
    /// parsed, or an I/O error if the queue file cannot be read.
    pub fn peek_head(&self) -> Result<Option<Operation>, SyncError> {
        let _lock = self.lock()?;
        let content = self.read()?;

        match content.lines().find(|line| !line.trim().is_empty()) {
            Some(line) => parse_entry(line).map(Some),
            None => Ok(None),
        }
    }

    /// Remove the head line. Returns `false` if the queue was already empty.
    pub fn remove_head(&self) -> Result<bool, SyncError> {
        let _lock = self.lock()?;
        let removed = self.take_head_locked()?;
        if let Some(line) = &removed {
            debug!(line = %line, "queue head removed");
        }
        Ok(removed.is_some())
    }

    /// Move an unparsable head line to [`rejected_path`](Self::rejected_path)
    /// and drop it from the queue. Returns the moved line.
    pub fn reject_head(&self) -> Result<Option<String>, SyncError> {
        let _lock = self.lock()?;
        let content = self.read()?;

        let Some(line) = content.lines().find(|line| !line.trim().is_empty()) else {
            return Ok(None);
        };

        let mut rejected = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.rejected_path())?;
        rejected.write_all(format!("{}\n", line.trim()).as_bytes())?;
        rejected.sync_data()?;

        let removed = self.take_head_locked()?;
        warn!(line = %line.trim(), "queue head moved to rejected file");
        Ok(removed)
    }

    /// All pending operations in queue order.
    ///
    /// # Errors
    /// Fails on the first line that cannot be parsed.
    pub fn pending(&self) -> Result<Vec<Operation>, SyncError> {
        let _lock = self.lock()?;
        let content = self.read()?;

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(parse_entry)
            .collect()
    }

    /// Lines previously moved aside by [`reject_head`](Self::reject_head),
    /// oldest first. Empty if nothing was ever rejected.
    pub fn rejected(&self) -> Result<Vec<String>, SyncError> {
        let _lock = self.lock()?;
        match fs::read_to_string(self.rejected_path()) {
            Ok(content) => Ok(content
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Number of pending lines
    pub fn len(&self) -> Result<usize, SyncError> {
        let _lock = self.lock()?;
        let content = self.read()?;
        Ok(content.lines().filter(|line| !line.trim().is_empty()).count())
    }

    /// Whether no operation is pending
    pub fn is_empty(&self) -> Result<bool, SyncError> {
        Ok(self.len()? == 0)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn lock(&self) -> Result<QueueLock<'_>, SyncError> {
        let guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.lock_path)?;
        file.lock_exclusive()?;

        Ok(QueueLock {
            _guard: guard,
            _file: file,
        })
    }

    fn read(&self) -> Result<String, SyncError> {
        fs::read_to_string(&self.path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                warn!(path = %self.path.display(), "queue file disappeared");
            }
            SyncError::IoError(e)
        })
    }

    /// Rewrite the queue without its head line. Caller holds the lock.
    fn take_head_locked(&self) -> Result<Option<String>, SyncError> {
        let content = self.read()?;
        let mut lines = content.lines().filter(|line| !line.trim().is_empty());

        let Some(head) = lines.next() else {
            return Ok(None);
        };

        let tmp_path = sibling_with_suffix(&self.path, ".tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            for line in lines {
                tmp.write_all(line.as_bytes())?;
                tmp.write_all(b"\n")?;
            }
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        Ok(Some(head.to_string()))
    }
}

fn parse_entry(line: &str) -> Result<Operation, SyncError> {
    Operation::parse_line(line).map_err(|source| SyncError::MalformedEntry {
        line: line.trim().to_string(),
        source,
    })
}

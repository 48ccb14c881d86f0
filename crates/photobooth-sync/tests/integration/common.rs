//! Shared test helpers for the sync integration tests
//!
//! Provides an in-memory [`IRemoteStore`] that behaves like a remote
//! collection server (listings return full paths, including the listed
//! directory itself with a trailing slash) and a harness wiring it to a real
//! queue file in a temporary directory.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use anyhow::bail;
use photobooth_core::{
    domain::{Operation, RelativePath, RemotePath},
    ports::{IRemoteStore, RemoteEntry},
};
use photobooth_sync::{
    queue::OperationQueue,
    worker::{SyncWorker, WorkerSettings},
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Remote root used by the harness
pub const REMOTE_ROOT: &str = "/booth";

// ----------------------------------------------------------------------------
// RecordingStore
// ----------------------------------------------------------------------------

/// One call to [`IRemoteStore::upload`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadAttempt {
    pub path: String,
    pub ok: bool,
}

impl UploadAttempt {
    pub fn ok(path: &str) -> Self {
        Self {
            path: path.to_string(),
            ok: true,
        }
    }

    pub fn failed(path: &str) -> Self {
        Self {
            path: path.to_string(),
            ok: false,
        }
    }
}

#[derive(Default)]
struct Inner {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
    upload_failures: HashMap<String, u32>,
    download_failures: HashSet<String>,
    fail_listing: bool,
    uploads: Vec<UploadAttempt>,
    downloads: Vec<String>,
}

/// In-memory remote store that records uploads and downloads
#[derive(Default)]
pub struct RecordingStore {
    inner: Mutex<Inner>,
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Create a directory and all its ancestors
    pub fn add_dir(&self, path: &str) {
        let mut inner = self.lock();
        let mut current = path.to_string();
        while current != "/" {
            let parent = parent_of(&current).to_string();
            inner.dirs.insert(current);
            current = parent;
        }
    }

    /// Create a file, creating its ancestors
    pub fn add_file(&self, path: &str, content: &[u8]) {
        self.add_dir(parent_of(path));
        self.lock().files.insert(path.to_string(), content.to_vec());
    }

    /// Fail the next `times` uploads to `path`
    pub fn fail_uploads(&self, path: &str, times: u32) {
        self.lock().upload_failures.insert(path.to_string(), times);
    }

    /// Fail every upload to `path`
    pub fn fail_uploads_forever(&self, path: &str) {
        self.fail_uploads(path, u32::MAX);
    }

    pub fn fail_downloads(&self, path: &str) {
        self.lock().download_failures.insert(path.to_string());
    }

    pub fn set_fail_listing(&self, fail: bool) {
        self.lock().fail_listing = fail;
    }

    pub fn uploads(&self) -> Vec<UploadAttempt> {
        self.lock().uploads.clone()
    }

    pub fn downloads(&self) -> Vec<String> {
        self.lock().downloads.clone()
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(path).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.lock().dirs.contains(path)
    }

    fn is_dir(inner: &Inner, path: &str) -> bool {
        path == "/" || inner.dirs.contains(path)
    }
}

#[async_trait::async_trait]
impl IRemoteStore for RecordingStore {
    async fn exists(&self, path: &RemotePath) -> anyhow::Result<bool> {
        let inner = self.lock();
        let path = path.as_str();
        Ok(Self::is_dir(&inner, path) || inner.files.contains_key(path))
    }

    async fn mkdir(&self, path: &RemotePath) -> anyhow::Result<()> {
        let mut inner = self.lock();
        let path = path.as_str();
        if !Self::is_dir(&inner, parent_of(path)) {
            bail!("409 Conflict: parent of {path} does not exist");
        }
        inner.dirs.insert(path.to_string());
        Ok(())
    }

    async fn upload(&self, local: &Path, remote: &RemotePath) -> anyhow::Result<()> {
        let path = remote.as_str().to_string();
        {
            let mut inner = self.lock();
            if let Some(remaining) = inner.upload_failures.get_mut(&path) {
                if *remaining > 0 {
                    if *remaining != u32::MAX {
                        *remaining -= 1;
                    }
                    inner.uploads.push(UploadAttempt::failed(&path));
                    bail!("503 Service Unavailable: {path}");
                }
            }
        }

        let content = tokio::fs::read(local).await?;

        let mut inner = self.lock();
        if !Self::is_dir(&inner, parent_of(&path)) {
            inner.uploads.push(UploadAttempt::failed(&path));
            bail!("409 Conflict: parent of {path} does not exist");
        }
        inner.files.insert(path.clone(), content);
        inner.uploads.push(UploadAttempt::ok(&path));
        Ok(())
    }

    async fn download(&self, remote: &RemotePath, local: &Path) -> anyhow::Result<()> {
        let path = remote.as_str().to_string();
        let content = {
            let mut inner = self.lock();
            inner.downloads.push(path.clone());
            if inner.download_failures.contains(&path) {
                bail!("500 Internal Server Error: {path}");
            }
            match inner.files.get(&path) {
                Some(content) => content.clone(),
                None => bail!("404 Not Found: {path}"),
            }
        };

        tokio::fs::write(local, content).await?;
        Ok(())
    }

    async fn list(&self, path: &RemotePath) -> anyhow::Result<Vec<RemoteEntry>> {
        let inner = self.lock();
        let path = path.as_str();
        if inner.fail_listing {
            bail!("500 Internal Server Error: listing {path}");
        }
        if !Self::is_dir(&inner, path) {
            bail!("404 Not Found: {path}");
        }

        // The listed collection itself comes first, as on a real server
        let own = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        let mut entries = vec![RemoteEntry::directory(own)];

        entries.extend(
            inner
                .dirs
                .iter()
                .filter(|d| parent_of(d) == path && d.as_str() != path)
                .map(|d| RemoteEntry::directory(format!("{d}/"))),
        );
        entries.extend(
            inner
                .files
                .keys()
                .filter(|f| parent_of(f) == path)
                .map(|f| RemoteEntry::file(f.clone())),
        );
        Ok(entries)
    }
}

// ----------------------------------------------------------------------------
// Harness
// ----------------------------------------------------------------------------

/// A queue in a temp directory, a local root and a recording store
pub struct Harness {
    pub local: TempDir,
    pub queue: Arc<OperationQueue>,
    pub store: Arc<RecordingStore>,
}

impl Harness {
    /// Harness whose store already holds [`REMOTE_ROOT`]
    pub fn new() -> Self {
        let h = Self::without_remote_root();
        h.store.add_dir(REMOTE_ROOT);
        h
    }

    /// Harness over an empty store, as if the wrong share were mounted
    pub fn without_remote_root() -> Self {
        let local = TempDir::new().unwrap();
        let queue = Arc::new(OperationQueue::open(local.path().join("sync-queue")).unwrap());
        Self {
            local,
            queue,
            store: Arc::new(RecordingStore::new()),
        }
    }

    /// Millisecond timings so tests run in real time
    pub fn settings(&self) -> WorkerSettings {
        let mut settings =
            WorkerSettings::new(self.local.path(), remote(REMOTE_ROOT)).unwrap();
        settings.retry_interval = Duration::from_millis(10);
        settings.step_pause = Duration::from_millis(1);
        settings.cycle_pause = Duration::from_millis(5);
        settings
    }

    pub fn worker(&self, cancel: CancellationToken) -> SyncWorker {
        self.worker_with(self.settings(), cancel)
    }

    pub fn worker_with(&self, settings: WorkerSettings, cancel: CancellationToken) -> SyncWorker {
        SyncWorker::new(
            Arc::clone(&self.queue),
            self.store.clone(),
            settings,
            cancel,
        )
    }

    /// Write a local file under the root, creating parent directories
    pub fn write_local(&self, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.local.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Write a local file and enqueue a push for it
    pub fn capture(&self, relative: &str) -> PathBuf {
        let path = self.write_local(relative, relative.as_bytes());
        self.queue.enqueue(&push(relative)).unwrap();
        path
    }

    pub fn local_path(&self, relative: &str) -> PathBuf {
        self.local.path().join(relative)
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

pub fn rel(s: &str) -> RelativePath {
    RelativePath::new(s.to_string()).unwrap()
}

pub fn remote(s: &str) -> RemotePath {
    RemotePath::new(s.to_string()).unwrap()
}

pub fn push(s: &str) -> Operation {
    Operation::push(rel(s))
}

/// Remote location of a local relative path under [`REMOTE_ROOT`]
pub fn remote_of(relative: &str) -> String {
    format!("{REMOTE_ROOT}/{relative}")
}

/// Backdate a file's modification time by `age`
pub fn set_age(path: &Path, age: Duration) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
}

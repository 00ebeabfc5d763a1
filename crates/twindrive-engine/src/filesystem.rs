//! Tokio-based local filesystem adapter
//!
//! Implements the `ILocalFileSystem` port with `tokio::fs`, SHA-256
//! hashing via the `sha2` crate, and notify-backed directory watching.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::DateTime;
use notify::{RecursiveMode, Watcher};
use sha2::{Digest, Sha256};

use twindrive_core::domain::newtypes::{ContentHash, SyncPath};
use twindrive_core::ports::{FileSystemState, IFileObserver, ILocalFileSystem, WatchHandle};

use crate::watcher::{map_notify_event, ChangeEvent};

/// Local filesystem adapter backed by tokio and notify
///
/// Writes are atomic: data lands in a sibling `.tmp` file which is then
/// renamed over the destination, so watchers and readers never observe a
/// half-written file.
///
/// An observer must be registered with [`with_observer`](Self::with_observer)
/// before [`watch`](ILocalFileSystem::watch) can be used.
pub struct TokioFileSystem {
    hash_timeout: Duration,
    observer: Option<Arc<dyn IFileObserver>>,
}

impl TokioFileSystem {
    /// Creates an adapter with the given hash read timeout
    pub fn new(hash_timeout: Duration) -> Self {
        Self {
            hash_timeout,
            observer: None,
        }
    }

    /// Registers the observer that receives watch events
    pub fn with_observer(mut self, observer: Arc<dyn IFileObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}

#[async_trait::async_trait]
impl ILocalFileSystem for TokioFileSystem {
    async fn read_file(&self, path: &SyncPath) -> anyhow::Result<Vec<u8>> {
        tokio::fs::read(path.as_path())
            .await
            .with_context(|| format!("Failed to read {}", path))
    }

    async fn write_file(&self, path: &SyncPath, data: &[u8]) -> anyhow::Result<()> {
        let mut tmp_os = path.as_path().clone().into_os_string();
        tmp_os.push(".tmp");
        let tmp_path = std::path::PathBuf::from(tmp_os);

        tokio::fs::write(&tmp_path, data)
            .await
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, path.as_path())
            .await
            .with_context(|| format!("Failed to move temporary file into {}", path))?;

        tracing::debug!(path = %path, bytes = data.len(), "File written");
        Ok(())
    }

    async fn delete_file(&self, path: &SyncPath) -> anyhow::Result<()> {
        let metadata = tokio::fs::metadata(path.as_path())
            .await
            .with_context(|| format!("Failed to stat {} for deletion", path))?;

        if metadata.is_dir() {
            tokio::fs::remove_dir_all(path.as_path())
                .await
                .with_context(|| format!("Failed to remove directory {}", path))?;
        } else {
            tokio::fs::remove_file(path.as_path())
                .await
                .with_context(|| format!("Failed to remove {}", path))?;
        }

        tracing::debug!(path = %path, "Path deleted");
        Ok(())
    }

    async fn get_state(&self, path: &SyncPath) -> anyhow::Result<FileSystemState> {
        match tokio::fs::metadata(path.as_path()).await {
            Ok(metadata) => {
                let modified = metadata
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .and_then(|d| DateTime::from_timestamp(d.as_secs() as i64, d.subsec_nanos()));

                Ok(FileSystemState {
                    exists: true,
                    is_file: metadata.is_file(),
                    size: if metadata.is_file() { metadata.len() } else { 0 },
                    modified,
                })
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(FileSystemState::not_found())
            }
            Err(err) => Err(err).with_context(|| format!("Failed to stat {}", path)),
        }
    }

    async fn compute_hash(&self, path: &SyncPath) -> anyhow::Result<ContentHash> {
        let data = tokio::time::timeout(self.hash_timeout, tokio::fs::read(path.as_path()))
            .await
            .with_context(|| format!("Timed out reading {} for hashing", path))?
            .with_context(|| format!("Failed to read {} for hashing", path))?;

        let mut hasher = Sha256::new();
        hasher.update(&data);
        let digest: [u8; 32] = hasher.finalize().into();
        Ok(ContentHash::from_digest(&digest))
    }

    async fn create_directory(&self, path: &SyncPath) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(path.as_path())
            .await
            .with_context(|| format!("Failed to create directory {}", path))
    }

    async fn list_directory(&self, path: &SyncPath) -> anyhow::Result<Vec<SyncPath>> {
        let mut reader = tokio::fs::read_dir(path.as_path())
            .await
            .with_context(|| format!("Failed to list {}", path))?;

        let mut children = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .with_context(|| format!("Failed to read an entry of {}", path))?
        {
            match SyncPath::new(entry.path()) {
                Ok(child) => children.push(child),
                Err(err) => {
                    tracing::warn!(path = %entry.path().display(), error = %err,
                        "Skipping unrepresentable directory entry");
                }
            }
        }
        Ok(children)
    }

    async fn watch(&self, path: &SyncPath) -> anyhow::Result<WatchHandle> {
        let observer = self
            .observer
            .clone()
            .context("No file observer registered; call with_observer() before watching")?;

        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                match res {
                    Ok(event) => {
                        if let Some(change) = map_notify_event(&event) {
                            dispatch(observer.as_ref(), change);
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "Filesystem watcher error");
                    }
                }
            })
            .context("Failed to create filesystem watcher")?;

        watcher
            .watch(path.as_path(), RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", path))?;

        tracing::info!(path = %path, "Filesystem watch started");

        Ok(WatchHandle::new(move || {
            drop(watcher);
        }))
    }
}

fn dispatch(observer: &dyn IFileObserver, change: ChangeEvent) {
    match change {
        ChangeEvent::Created(path) => observer.on_created(path),
        ChangeEvent::Modified(path) => observer.on_modified(path),
        ChangeEvent::Deleted(path) => observer.on_deleted(path),
        ChangeEvent::Renamed { old, new } => observer.on_renamed(old, new),
    }
}

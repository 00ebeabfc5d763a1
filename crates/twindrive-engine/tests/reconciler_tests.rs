//! Integration tests for the reconciler
//!
//! The remote side is a small in-memory fake: a tree of listing entries
//! plus a blob map keyed by remote id. Everything else is the real
//! stack, in-memory SQLite and a temp-dir filesystem.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tempfile::TempDir;

use twindrive_core::domain::mapping::DriveMapping;
use twindrive_core::domain::metadata::SyncStatus;
use twindrive_core::domain::newtypes::{RemoteId, SyncPath};
use twindrive_core::domain::version::UploadMethod;
use twindrive_core::ports::{
    ILocalFileSystem, IRemoteStorage, IStateStore, RemoteEntry, RemoteUploadReceipt,
};
use twindrive_engine::filesystem::TokioFileSystem;
use twindrive_engine::reconciler::{EchoGuard, Reconciler};
use twindrive_store::{DatabasePool, SqliteStateStore};

const ROOT_ID: &str = "root-folder";

#[derive(Default)]
struct FakeRemote {
    children: HashMap<String, Vec<RemoteEntry>>,
    blobs: HashMap<String, Vec<u8>>,
    broken: HashSet<String>,
}

impl FakeRemote {
    fn add_folder(&mut self, parent: &str, id: &str, name: &str) {
        self.children.entry(parent.to_string()).or_default().push(RemoteEntry {
            id: id.to_string(),
            name: name.to_string(),
            parent_id: Some(parent.to_string()),
            is_folder: true,
            size: None,
            content_hash: None,
        });
    }

    fn add_file(&mut self, parent: &str, id: &str, name: &str, data: &[u8]) {
        self.add_file_with_hash(parent, id, name, data, Some(hex_sha256(data)));
    }

    fn add_file_with_hash(
        &mut self,
        parent: &str,
        id: &str,
        name: &str,
        data: &[u8],
        content_hash: Option<String>,
    ) {
        self.children.entry(parent.to_string()).or_default().push(RemoteEntry {
            id: id.to_string(),
            name: name.to_string(),
            parent_id: Some(parent.to_string()),
            is_folder: false,
            size: Some(data.len() as u64),
            content_hash,
        });
        self.blobs.insert(id.to_string(), data.to_vec());
    }

    fn break_download(&mut self, id: &str) {
        self.broken.insert(id.to_string());
    }
}

#[async_trait::async_trait]
impl IRemoteStorage for FakeRemote {
    async fn list_folder(&self, folder_id: &RemoteId) -> anyhow::Result<Vec<RemoteEntry>> {
        Ok(self
            .children
            .get(folder_id.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn create_folder(
        &self,
        _parent_id: &RemoteId,
        _name: &str,
    ) -> anyhow::Result<RemoteEntry> {
        anyhow::bail!("folder creation is not exercised here")
    }

    async fn upload_file(
        &self,
        _parent_id: &RemoteId,
        _name: &str,
        _data: &[u8],
        _method: UploadMethod,
        _progress: Option<Box<dyn Fn(u64, u64) + Send>>,
    ) -> anyhow::Result<RemoteUploadReceipt> {
        anyhow::bail!("uploads are not exercised here")
    }

    async fn download_file(&self, file_id: &RemoteId) -> anyhow::Result<Vec<u8>> {
        if self.broken.contains(file_id.as_str()) {
            anyhow::bail!("simulated transfer failure");
        }
        self.blobs
            .get(file_id.as_str())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown remote file {}", file_id))
    }
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

struct Harness {
    _dir: TempDir,
    root: SyncPath,
    store: Arc<dyn IStateStore>,
    echo: Arc<EchoGuard>,
    reconciler: Reconciler,
    mapping: DriveMapping,
}

async fn harness(remote: FakeRemote) -> Harness {
    let dir = TempDir::new().unwrap();
    let root = SyncPath::new(dir.path().to_path_buf()).unwrap();

    let pool = DatabasePool::in_memory().await.unwrap();
    let store: Arc<dyn IStateStore> = Arc::new(SqliteStateStore::new(pool.pool().clone()));
    let filesystem: Arc<dyn ILocalFileSystem> =
        Arc::new(TokioFileSystem::new(Duration::from_secs(5)));
    let echo = Arc::new(EchoGuard::new(Duration::from_secs(30)));

    let mapping = DriveMapping::new(
        RemoteId::new("drive-1".to_string()).unwrap(),
        root.clone(),
        RemoteId::new(ROOT_ID.to_string()).unwrap(),
    );
    store.save_mapping(&mapping).await.unwrap();

    let reconciler = Reconciler::new(
        store.clone(),
        Arc::new(remote),
        filesystem,
        echo.clone(),
    );

    Harness {
        _dir: dir,
        root,
        store,
        echo,
        reconciler,
        mapping,
    }
}

fn local(root: &SyncPath, rel: &str) -> SyncPath {
    SyncPath::new(root.as_path().join(rel)).unwrap()
}

// ---------------------------------------------------------------------------
// Full pass
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_pass_materializes_the_remote_tree() {
    let mut remote = FakeRemote::default();
    remote.add_folder(ROOT_ID, "f-docs", "docs");
    remote.add_file(ROOT_ID, "d-readme", "readme.txt", b"welcome");
    remote.add_file("f-docs", "d-notes", "notes.txt", b"meeting notes");

    let h = harness(remote).await;
    let outcome = h.reconciler.reconcile(&h.mapping).await.unwrap();

    assert_eq!(outcome.entries_listed, 3);
    assert_eq!(outcome.folders_ensured, 1);
    assert_eq!(outcome.files_downloaded, 2);
    assert_eq!(outcome.failures, 0);

    assert_eq!(
        std::fs::read(local(&h.root, "readme.txt").as_path()).unwrap(),
        b"welcome"
    );
    assert_eq!(
        std::fs::read(local(&h.root, "docs/notes.txt").as_path()).unwrap(),
        b"meeting notes"
    );

    let rows = h.store.list_metadata(h.mapping.id()).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.sync_status() == SyncStatus::Synced));
}

#[tokio::test]
async fn downloads_land_in_the_processed_ledger() {
    let mut remote = FakeRemote::default();
    remote.add_file(ROOT_ID, "d-1", "payload.bin", b"bytes to fetch");

    let h = harness(remote).await;
    h.reconciler.reconcile(&h.mapping).await.unwrap();

    let hash = twindrive_core::domain::newtypes::ContentHash::new(hex_sha256(b"bytes to fetch"))
        .unwrap();
    assert!(h.store.is_processed(h.mapping.id(), &hash).await.unwrap());
}

#[tokio::test]
async fn second_pass_downloads_nothing() {
    let mut remote = FakeRemote::default();
    remote.add_file(ROOT_ID, "d-1", "stable.txt", b"unchanging");

    let h = harness(remote).await;
    let first = h.reconciler.reconcile(&h.mapping).await.unwrap();
    assert_eq!(first.files_downloaded, 1);

    let second = h.reconciler.reconcile(&h.mapping).await.unwrap();
    assert_eq!(second.files_downloaded, 0);
    assert_eq!(second.failures, 0);
}

// ---------------------------------------------------------------------------
// Pre-existing local files
// ---------------------------------------------------------------------------

#[tokio::test]
async fn a_file_already_on_disk_is_tagged_synced_without_a_download() {
    let mut remote = FakeRemote::default();
    remote.add_file(ROOT_ID, "d-1", "existing.txt", b"remote copy");

    let h = harness(remote).await;
    std::fs::write(local(&h.root, "existing.txt").as_path(), b"local copy").unwrap();

    let outcome = h.reconciler.reconcile(&h.mapping).await.unwrap();
    assert_eq!(outcome.files_downloaded, 0);

    // The local copy was not overwritten.
    assert_eq!(
        std::fs::read(local(&h.root, "existing.txt").as_path()).unwrap(),
        b"local copy"
    );

    let rows = h.store.list_metadata(h.mapping.id()).await.unwrap();
    assert_eq!(rows[0].sync_status(), SyncStatus::Synced);
}

// ---------------------------------------------------------------------------
// Failure isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn a_failed_download_marks_its_row_and_the_pass_continues() {
    let mut remote = FakeRemote::default();
    remote.add_file(ROOT_ID, "d-good", "good.txt", b"fetchable");
    remote.add_file(ROOT_ID, "d-bad", "bad.txt", b"never served");
    remote.break_download("d-bad");

    let h = harness(remote).await;
    let outcome = h.reconciler.reconcile(&h.mapping).await.unwrap();

    assert_eq!(outcome.files_downloaded, 1);
    assert_eq!(outcome.failures, 1);

    assert!(local(&h.root, "good.txt").as_path().exists());
    assert!(!local(&h.root, "bad.txt").as_path().exists());

    let rows = h.store.list_metadata(h.mapping.id()).await.unwrap();
    let good = rows.iter().find(|r| r.name() == "good.txt").unwrap();
    let bad = rows.iter().find(|r| r.name() == "bad.txt").unwrap();
    assert_eq!(good.sync_status(), SyncStatus::Synced);
    assert_eq!(bad.sync_status(), SyncStatus::Error);
}

#[tokio::test]
async fn a_listing_failure_aborts_the_pass() {
    // Root listing works but names a folder whose id the backend then
    // rejects: deeper listings return empty rather than erroring in the
    // fake, so break the pass with an invalid remote id instead.
    let mut remote = FakeRemote::default();
    remote.children.entry(ROOT_ID.to_string()).or_default().push(RemoteEntry {
        id: "bad id with spaces".to_string(),
        name: "folder".to_string(),
        parent_id: Some(ROOT_ID.to_string()),
        is_folder: true,
        size: None,
        content_hash: None,
    });

    let h = harness(remote).await;
    let result = h.reconciler.reconcile(&h.mapping).await;
    assert!(result.is_err());

    // Nothing was cached.
    let rows = h.store.list_metadata(h.mapping.id()).await.unwrap();
    assert!(rows.is_empty());
}

// ---------------------------------------------------------------------------
// Snapshot semantics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn the_snapshot_replaces_stale_rows_wholesale() {
    let mut before = FakeRemote::default();
    before.add_file(ROOT_ID, "d-1", "keep.txt", b"kept");
    before.add_file(ROOT_ID, "d-2", "gone.txt", b"removed remotely");

    let h = harness(before).await;
    h.reconciler.reconcile(&h.mapping).await.unwrap();
    assert_eq!(h.store.list_metadata(h.mapping.id()).await.unwrap().len(), 2);

    // The remote now only has one of the two files.
    let mut after = FakeRemote::default();
    after.add_file(ROOT_ID, "d-1", "keep.txt", b"kept");
    let shrunk = Reconciler::new(
        h.store.clone(),
        Arc::new(after),
        Arc::new(TokioFileSystem::new(Duration::from_secs(5))),
        h.echo.clone(),
    );
    shrunk.reconcile(&h.mapping).await.unwrap();

    let rows = h.store.list_metadata(h.mapping.id()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name(), "keep.txt");
}

// ---------------------------------------------------------------------------
// Name normalization
// ---------------------------------------------------------------------------

#[tokio::test]
async fn drive_name_prefixes_are_flattened() {
    let mut remote = FakeRemote::default();
    remote.add_file(ROOT_ID, "d-1", "MyDrive/report.txt", b"prefixed name");

    let h = harness(remote).await;
    let outcome = h.reconciler.reconcile(&h.mapping).await.unwrap();
    assert_eq!(outcome.files_downloaded, 1);

    // The file lands at the root, not under a phantom MyDrive folder.
    assert!(local(&h.root, "report.txt").as_path().exists());
    assert!(!h.root.as_path().join("MyDrive").exists());
}

#[tokio::test]
async fn a_malformed_remote_hash_does_not_block_the_download() {
    let mut remote = FakeRemote::default();
    remote.add_file_with_hash(
        ROOT_ID,
        "d-1",
        "odd.txt",
        b"content",
        Some("not-a-sha256".to_string()),
    );

    let h = harness(remote).await;
    let outcome = h.reconciler.reconcile(&h.mapping).await.unwrap();

    assert_eq!(outcome.files_downloaded, 1);
    let rows = h.store.list_metadata(h.mapping.id()).await.unwrap();
    assert!(rows[0].content_hash().is_none());
}

// ---------------------------------------------------------------------------
// Echo suppression
// ---------------------------------------------------------------------------

#[tokio::test]
async fn written_paths_are_marked_as_echoes() {
    let mut remote = FakeRemote::default();
    remote.add_file(ROOT_ID, "d-1", "echoed.txt", b"written by the engine");

    let h = harness(remote).await;
    h.reconciler.reconcile(&h.mapping).await.unwrap();

    assert!(h.echo.is_echo(&local(&h.root, "echoed.txt")));
    assert!(!h.echo.is_echo(&local(&h.root, "unrelated.txt")));
}

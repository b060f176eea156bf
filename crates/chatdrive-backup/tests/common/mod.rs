//! Shared test harness: in-memory mock collaborators and helpers.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use tokio::sync::watch;

use chatdrive_backup::BackupService;
use chatdrive_core::config::scheduler::SchedulerConfig;
use chatdrive_core::error::AppError;
use chatdrive_core::model::{BackupTask, CompressionFormat, TransferEndpoint};
use chatdrive_core::result::AppResult;
use chatdrive_core::traits::{
    BlobStore, ByteStream, Compressor, Encryptor, RemoteEntry, StoredArchive, TaskStore,
    TransferClient, TransferSession,
};
use chatdrive_core::types::{ArchiveId, TaskId};

static TRACING: std::sync::Once = std::sync::Once::new();

/// Install a test log subscriber once. Level is taken from `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Drain a byte stream into memory.
pub async fn collect(mut stream: ByteStream) -> Bytes {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.try_next().await.expect("stream chunk") {
        buf.extend_from_slice(&chunk);
    }
    buf.freeze()
}

fn bytes_stream(data: Bytes) -> ByteStream {
    Box::pin(futures::stream::once(async move { Ok(data) }))
}

/// Fast-retry configuration so failure tests finish quickly.
pub fn test_config() -> SchedulerConfig {
    SchedulerConfig {
        max_reconnect_attempts: 2,
        reconnect_base_delay_ms: 1,
        shutdown_grace_seconds: 5,
    }
}

/// Build a task definition with sensible test defaults.
pub fn make_task(name: &str) -> BackupTask {
    BackupTask {
        id: TaskId::new(),
        name: name.to_string(),
        cron: "0 0 3 * * *".to_string(),
        enabled: true,
        priority: 0,
        endpoint: TransferEndpoint {
            host: "files.example.com".to_string(),
            port: 22,
            root_path: "/data".to_string(),
            username: "backup".to_string(),
            password: Some("secret".to_string()),
            private_key: None,
        },
        destination: format!("backups/{name}"),
        compression: CompressionFormat::TarGz,
        retention: 0,
        encrypt: false,
        scan_before_run: true,
    }
}

/// Poll `cond` until it holds or a 5 second deadline passes.
pub async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(deadline.is_ok(), "timed out waiting for {what}");
}

// ---------------------------------------------------------------------------
// Task store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RecordedRun {
    pub task_id: TaskId,
    pub started_at: DateTime<Utc>,
    pub runtime: Duration,
    pub success: bool,
}

#[derive(Debug, Default)]
pub struct MockTaskStore {
    tasks: Mutex<HashMap<TaskId, BackupTask>>,
    runs: Mutex<Vec<RecordedRun>>,
}

impl MockTaskStore {
    pub fn insert(&self, task: BackupTask) {
        self.tasks.lock().unwrap().insert(task.id, task);
    }

    pub fn remove(&self, id: TaskId) {
        self.tasks.lock().unwrap().remove(&id);
    }

    pub fn recorded(&self) -> Vec<RecordedRun> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskStore for MockTaskStore {
    async fn task_by_id(&self, id: TaskId) -> AppResult<Option<BackupTask>> {
        Ok(self.tasks.lock().unwrap().get(&id).cloned())
    }

    async fn record_run(
        &self,
        id: TaskId,
        started_at: DateTime<Utc>,
        runtime: Duration,
        success: bool,
    ) -> AppResult<()> {
        self.runs.lock().unwrap().push(RecordedRun {
            task_id: id,
            started_at,
            runtime,
            success,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Transfer client
// ---------------------------------------------------------------------------

/// In-memory remote tree served by the mock transfer client.
#[derive(Debug, Default)]
pub struct RemoteFs {
    dirs: HashMap<String, Vec<RemoteEntry>>,
    files: HashMap<String, Bytes>,
}

impl RemoteFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, dir: &str, name: &str, data: &[u8]) {
        let path = format!("{}/{}", dir.trim_end_matches('/'), name);
        self.dirs
            .entry(dir.to_string())
            .or_default()
            .push(RemoteEntry {
                path: path.clone(),
                size_bytes: data.len() as u64,
                is_directory: false,
            });
        self.files.insert(path, Bytes::copy_from_slice(data));
    }

    pub fn add_dir(&mut self, parent: &str, name: &str) -> String {
        let path = format!("{}/{}", parent.trim_end_matches('/'), name);
        self.dirs
            .entry(parent.to_string())
            .or_default()
            .push(RemoteEntry {
                path: path.clone(),
                size_bytes: 0,
                is_directory: true,
            });
        self.dirs.entry(path.clone()).or_default();
        path
    }
}

#[derive(Debug, Default)]
struct TransferInner {
    fs: RemoteFs,
    connect_failures: Mutex<VecDeque<AppError>>,
    read_failures: Mutex<HashMap<String, VecDeque<AppError>>>,
    read_gate: Mutex<Option<watch::Receiver<bool>>>,
    connects: AtomicU32,
}

/// Scriptable mock transfer client. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockTransferClient {
    inner: Arc<TransferInner>,
}

impl MockTransferClient {
    pub fn new(fs: RemoteFs) -> Self {
        Self {
            inner: Arc::new(TransferInner {
                fs,
                ..Default::default()
            }),
        }
    }

    /// Fail the next connect attempts with the given errors, in order.
    pub fn fail_next_connects(&self, errors: Vec<AppError>) {
        self.inner.connect_failures.lock().unwrap().extend(errors);
    }

    /// Fail the next reads of `path` with the given errors, in order.
    pub fn fail_reads(&self, path: &str, errors: Vec<AppError>) {
        self.inner
            .read_failures
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .extend(errors);
    }

    /// Block every read until the returned sender publishes `true`.
    pub fn gate_reads(&self) -> watch::Sender<bool> {
        let (tx, rx) = watch::channel(false);
        *self.inner.read_gate.lock().unwrap() = Some(rx);
        tx
    }

    pub fn connect_count(&self) -> u32 {
        self.inner.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransferClient for MockTransferClient {
    async fn connect(&self, _endpoint: &TransferEndpoint) -> AppResult<Box<dyn TransferSession>> {
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.inner.connect_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(Box::new(MockSession {
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct MockSession {
    inner: Arc<TransferInner>,
}

#[async_trait]
impl TransferSession for MockSession {
    async fn list_entries(&self, path: &str) -> AppResult<Vec<RemoteEntry>> {
        Ok(self.inner.fs.dirs.get(path).cloned().unwrap_or_default())
    }

    async fn read_entry(&self, path: &str) -> AppResult<ByteStream> {
        let gate = self.inner.read_gate.lock().unwrap().clone();
        if let Some(mut rx) = gate {
            while !*rx.borrow() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }
        if let Some(queue) = self.inner.read_failures.lock().unwrap().get_mut(path) {
            if let Some(err) = queue.pop_front() {
                return Err(err);
            }
        }
        match self.inner.fs.files.get(path) {
            Some(data) => Ok(bytes_stream(data.clone())),
            None => Err(AppError::not_found(format!("no such remote file: {path}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Compressor / encryptor
// ---------------------------------------------------------------------------

/// Concatenates entry names and contents into one pseudo-archive.
#[derive(Debug, Default)]
pub struct MockCompressor;

#[async_trait]
impl Compressor for MockCompressor {
    async fn compress(
        &self,
        format: CompressionFormat,
        entries: Vec<(String, ByteStream)>,
    ) -> AppResult<ByteStream> {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(format.as_str().as_bytes());
        buf.extend_from_slice(b"|");
        for (name, stream) in entries {
            let data = collect(stream).await;
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(b"=");
            buf.extend_from_slice(&data);
            buf.extend_from_slice(b";");
        }
        Ok(bytes_stream(buf.freeze()))
    }
}

/// Prefixes the payload so tests can assert encryption was applied.
#[derive(Debug, Default)]
pub struct MockEncryptor;

pub const ENC_PREFIX: &[u8] = b"enc:";

#[async_trait]
impl Encryptor for MockEncryptor {
    async fn encrypt(&self, _task_id: TaskId, data: ByteStream) -> AppResult<ByteStream> {
        let payload = collect(data).await;
        let mut buf = BytesMut::with_capacity(ENC_PREFIX.len() + payload.len());
        buf.extend_from_slice(ENC_PREFIX);
        buf.extend_from_slice(&payload);
        Ok(bytes_stream(buf.freeze()))
    }
}

// ---------------------------------------------------------------------------
// Blob store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MockBlobStore {
    // Newest first, matching the list_stored contract.
    archives: Mutex<Vec<(StoredArchive, Bytes)>>,
}

impl MockBlobStore {
    pub fn archives_for(&self, task_id: TaskId) -> Vec<StoredArchive> {
        self.archives
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, _)| a.task_id == task_id)
            .map(|(a, _)| a.clone())
            .collect()
    }

    pub fn payload(&self, id: ArchiveId) -> Option<Bytes> {
        self.archives
            .lock()
            .unwrap()
            .iter()
            .find(|(a, _)| a.id == id)
            .map(|(_, data)| data.clone())
    }

    pub fn total_stored(&self) -> usize {
        self.archives.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn store(
        &self,
        task_id: TaskId,
        name: &str,
        data: ByteStream,
    ) -> AppResult<StoredArchive> {
        let payload = collect(data).await;
        let archive = StoredArchive {
            id: ArchiveId::new(),
            task_id,
            name: name.to_string(),
            size_bytes: payload.len() as u64,
            stored_at: Utc::now(),
        };
        self.archives
            .lock()
            .unwrap()
            .insert(0, (archive.clone(), payload));
        Ok(archive)
    }

    async fn list_stored(&self, task_id: TaskId) -> AppResult<Vec<StoredArchive>> {
        Ok(self.archives_for(task_id))
    }

    async fn delete(&self, archive: &StoredArchive) -> AppResult<()> {
        self.archives.lock().unwrap().retain(|(a, _)| a.id != archive.id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Service harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub service: Arc<BackupService>,
    pub store: Arc<MockTaskStore>,
    pub transfer: MockTransferClient,
    pub blobs: Arc<MockBlobStore>,
}

/// Build and start a service wired to mocks, with the given tasks known
/// to the store (but not cron-scheduled).
pub async fn start_service(tasks: Vec<BackupTask>, transfer: MockTransferClient) -> Harness {
    init_tracing();
    let store = Arc::new(MockTaskStore::default());
    for task in tasks {
        store.insert(task);
    }
    let blobs = Arc::new(MockBlobStore::default());

    let service = BackupService::new(
        Arc::clone(&store) as Arc<dyn TaskStore>,
        Arc::new(transfer.clone()),
        Arc::new(MockCompressor),
        Arc::new(MockEncryptor),
        Arc::clone(&blobs) as Arc<dyn BlobStore>,
        test_config(),
    )
    .await
    .expect("build service");
    service.start().await.expect("start service");

    Harness {
        service: Arc::new(service),
        store,
        transfer,
        blobs,
    }
}

/// A simple remote tree with three files across two directories.
pub fn default_fs() -> RemoteFs {
    let mut fs = RemoteFs::new();
    fs.add_file("/data", "a.txt", b"alpha");
    fs.add_file("/data", "b.txt", b"bravo-bravo");
    let sub = fs.add_dir("/data", "nested");
    fs.add_file(&sub, "c.bin", b"charlie!");
    fs
}

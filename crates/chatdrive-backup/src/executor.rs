//! Task run executor — performs one backup's lifecycle.
//!
//! Phases advance strictly forward: scanning (optional), downloading,
//! archiving (unless compression is off), uploading. Transient transfer
//! failures are retried on a fresh connection with exponential backoff;
//! fatal failures end the run immediately and are never retried within
//! the run. Cancellation is cooperative and observed at checkpoints: the
//! executor checks its token before each file transfer and before the
//! archive/upload phase, never mid-unit, so a partial archive is never
//! handed to the blob store.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;
use tokio_util::sync::CancellationToken;

use chatdrive_core::config::scheduler::SchedulerConfig;
use chatdrive_core::error::AppError;
use chatdrive_core::model::{BackupPhase, BackupTask, CompressionFormat};
use chatdrive_core::result::AppResult;
use chatdrive_core::traits::{
    BlobStore, ByteStream, Compressor, Encryptor, RemoteEntry, TransferClient, TransferSession,
};

use crate::error::ExecutionError;
use crate::progress::ProgressTracker;

/// Executes one backup run end to end against the external collaborators.
#[derive(Debug)]
pub struct BackupExecutor {
    transfer: Arc<dyn TransferClient>,
    compressor: Arc<dyn Compressor>,
    encryptor: Arc<dyn Encryptor>,
    blobs: Arc<dyn BlobStore>,
    tracker: Arc<ProgressTracker>,
    config: SchedulerConfig,
}

impl BackupExecutor {
    pub fn new(
        transfer: Arc<dyn TransferClient>,
        compressor: Arc<dyn Compressor>,
        encryptor: Arc<dyn Encryptor>,
        blobs: Arc<dyn BlobStore>,
        tracker: Arc<ProgressTracker>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            transfer,
            compressor,
            encryptor,
            blobs,
            tracker,
            config,
        }
    }

    /// Run the task to a terminal outcome.
    pub async fn execute(
        &self,
        task: &BackupTask,
        cancel: &CancellationToken,
    ) -> Result<(), ExecutionError> {
        let mut session = self.connect_with_backoff(task).await?;

        if task.scan_before_run {
            self.scan_phase(task, &mut session, cancel).await?;
        }

        let files = self.download_phase(task, &mut session, cancel).await?;

        // Checkpoint before the archive/upload phase begins.
        self.checkpoint(cancel)?;
        self.upload_phase(task, files, cancel).await?;

        self.enforce_retention(task).await;
        Ok(())
    }

    /// Open a session, retrying transient connect failures with backoff.
    async fn connect_with_backoff(
        &self,
        task: &BackupTask,
    ) -> Result<Box<dyn TransferSession>, ExecutionError> {
        let mut attempt = 0u32;
        loop {
            match self.transfer.connect(&task.endpoint).await {
                Ok(session) => return Ok(session),
                Err(e) if e.is_transient() && attempt < self.config.max_reconnect_attempts => {
                    attempt += 1;
                    let delay = self.backoff_delay(attempt);
                    tracing::warn!(
                        task = %task.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transient connect failure, retrying: {e}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(ExecutionError::Failed(e)),
            }
        }
    }

    /// Walk the source tree to count the work ahead.
    async fn scan_phase(
        &self,
        task: &BackupTask,
        session: &mut Box<dyn TransferSession>,
        cancel: &CancellationToken,
    ) -> Result<(), ExecutionError> {
        let root = task.endpoint.root_path.clone();
        self.tracker.update(task.id, move |s| {
            s.phase = BackupPhase::Scanning;
            s.current_item = root;
        });

        let mut attempt = 0u32;
        loop {
            self.checkpoint(cancel)?;
            match self.walk_source(task, session.as_ref()).await {
                Ok(files) => {
                    let total_files = files.len() as u64;
                    tracing::info!(task = %task.id, files = total_files, "Source scan complete");
                    self.tracker
                        .update(task.id, move |s| s.total_files = total_files);
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt < self.config.max_reconnect_attempts => {
                    attempt += 1;
                    *session = self.resume_session(task, attempt, &e).await?;
                }
                Err(e) => return Err(ExecutionError::Failed(e)),
            }
        }
    }

    /// Fetch every source file, resuming across reconnects.
    ///
    /// A reconnect restarts enumeration from the top; files fetched before
    /// the failure are kept and skipped, so progress counters only move
    /// forward. The retry budget counts consecutive failures and resets
    /// after any fully successful pass.
    async fn download_phase(
        &self,
        task: &BackupTask,
        session: &mut Box<dyn TransferSession>,
        cancel: &CancellationToken,
    ) -> Result<Vec<(String, Bytes)>, ExecutionError> {
        self.tracker
            .update(task.id, |s| s.phase = BackupPhase::Downloading);

        let mut collected: Vec<(String, Bytes)> = Vec::new();
        let mut have: HashSet<String> = HashSet::new();
        let mut attempt = 0u32;
        loop {
            match self
                .try_download(task, session.as_ref(), cancel, &mut collected, &mut have)
                .await
            {
                Ok(()) => return Ok(collected),
                Err(ExecutionError::Failed(e))
                    if e.is_transient() && attempt < self.config.max_reconnect_attempts =>
                {
                    attempt += 1;
                    *session = self.resume_session(task, attempt, &e).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One enumeration-and-fetch pass over the source tree.
    async fn try_download(
        &self,
        task: &BackupTask,
        session: &dyn TransferSession,
        cancel: &CancellationToken,
        collected: &mut Vec<(String, Bytes)>,
        have: &mut HashSet<String>,
    ) -> Result<(), ExecutionError> {
        let files = self.walk_source(task, session).await?;
        for file in files {
            if have.contains(&file.path) {
                continue;
            }
            // Checkpoint before each file transfer.
            self.checkpoint(cancel)?;

            let label = file.path.clone();
            self.tracker.update(task.id, move |s| s.current_item = label);

            let stream = session.read_entry(&file.path).await?;
            let data = collect_stream(stream).await?;
            let size = data.len() as u64;

            have.insert(file.path.clone());
            collected.push((file.path.clone(), data));
            self.tracker.update(task.id, move |s| {
                s.files_processed += 1;
                s.total_bytes += size;
            });
        }
        Ok(())
    }

    /// List every file under the task's root path.
    async fn walk_source(
        &self,
        task: &BackupTask,
        session: &dyn TransferSession,
    ) -> AppResult<Vec<RemoteEntry>> {
        let mut files = Vec::new();
        let mut dirs = vec![task.endpoint.root_path.clone()];
        while let Some(dir) = dirs.pop() {
            let label = dir.clone();
            self.tracker.update(task.id, move |s| s.current_item = label);
            for entry in session.list_entries(&dir).await? {
                if entry.is_directory {
                    dirs.push(entry.path);
                } else {
                    files.push(entry);
                }
            }
        }
        Ok(files)
    }

    /// Archive (unless compression is off), encrypt when flagged, store.
    async fn upload_phase(
        &self,
        task: &BackupTask,
        files: Vec<(String, Bytes)>,
        cancel: &CancellationToken,
    ) -> Result<(), ExecutionError> {
        match task.compression {
            CompressionFormat::None => {
                // Passthrough: each file is stored individually. A stop
                // request is honored between units, never mid-file.
                self.tracker
                    .update(task.id, |s| s.phase = BackupPhase::Uploading);
                for (path, data) in files {
                    self.checkpoint(cancel)?;
                    let label = path.clone();
                    self.tracker.update(task.id, move |s| s.current_item = label);

                    let mut stream = bytes_stream(data);
                    if task.encrypt {
                        stream = self.encryptor.encrypt(task.id, stream).await?;
                    }
                    self.blobs.store(task.id, &path, stream).await?;
                }
            }
            format => {
                self.tracker
                    .update(task.id, |s| s.phase = BackupPhase::Archiving);
                let entries = files
                    .into_iter()
                    .map(|(path, data)| (path, bytes_stream(data)))
                    .collect();
                let archive = self.compressor.compress(format, entries).await?;

                self.checkpoint(cancel)?;
                let name = format!(
                    "{}-{}.{}",
                    task.name,
                    chrono::Utc::now().format("%Y%m%d%H%M%S"),
                    format.extension()
                );
                let label = name.clone();
                self.tracker.update(task.id, move |s| {
                    s.phase = BackupPhase::Uploading;
                    s.current_item = label;
                });

                let mut stream = archive;
                if task.encrypt {
                    stream = self.encryptor.encrypt(task.id, stream).await?;
                }
                let stored = self.blobs.store(task.id, &name, stream).await?;
                tracing::info!(
                    task = %task.id,
                    archive = %stored.id,
                    size = stored.size_bytes,
                    "Archive stored"
                );
            }
        }
        Ok(())
    }

    /// Delete stored archives beyond the task's retention count.
    ///
    /// Retention failures are logged but never flip an otherwise
    /// successful run to failed.
    async fn enforce_retention(&self, task: &BackupTask) {
        if task.retention == 0 {
            return;
        }
        let archives = match self.blobs.list_stored(task.id).await {
            Ok(archives) => archives,
            Err(e) => {
                tracing::warn!(task = %task.id, "Retention listing failed: {e}");
                return;
            }
        };
        // list_stored returns newest first.
        for old in archives.iter().skip(task.retention as usize) {
            match self.blobs.delete(old).await {
                Ok(()) => {
                    tracing::debug!(task = %task.id, archive = %old.id, "Deleted archive beyond retention")
                }
                Err(e) => {
                    tracing::warn!(task = %task.id, archive = %old.id, "Retention delete failed: {e}")
                }
            }
        }
    }

    /// Sleep with backoff, then open a replacement session.
    async fn resume_session(
        &self,
        task: &BackupTask,
        attempt: u32,
        cause: &AppError,
    ) -> Result<Box<dyn TransferSession>, ExecutionError> {
        let delay = self.backoff_delay(attempt);
        tracing::warn!(
            task = %task.id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Transient transfer failure, reconnecting: {cause}"
        );
        tokio::time::sleep(delay).await;
        let session = self.connect_with_backoff(task).await?;
        self.tracker.update(task.id, |s| s.reconnects += 1);
        Ok(session)
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.config.reconnect_base_delay_ms.saturating_mul(factor))
    }

    fn checkpoint(&self, cancel: &CancellationToken) -> Result<(), ExecutionError> {
        if cancel.is_cancelled() {
            Err(ExecutionError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Wrap an in-memory buffer as a single-chunk byte stream.
fn bytes_stream(data: Bytes) -> ByteStream {
    Box::pin(futures::stream::once(async move { Ok(data) }))
}

/// Drain a byte stream into memory.
///
/// A mid-stream failure is a transfer-layer condition and is surfaced as
/// a network error so the caller's reconnect logic can classify it.
async fn collect_stream(mut stream: ByteStream) -> AppResult<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream
        .try_next()
        .await
        .map_err(|e| AppError::network(format!("Transfer stream failed: {e}")))?
    {
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

//! Chunked blob-storage contract for persisted archives.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::result::AppResult;
use crate::traits::ByteStream;
use crate::types::{ArchiveId, TaskId};

/// Reference to an archive persisted in the blob store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredArchive {
    /// Opaque storage identifier.
    pub id: ArchiveId,
    /// Task the archive belongs to.
    pub task_id: TaskId,
    /// Archive file name.
    pub name: String,
    /// Stored size in bytes.
    pub size_bytes: u64,
    /// When the archive was stored.
    pub stored_at: DateTime<Utc>,
}

/// Storage backend that persists backup archives.
#[async_trait]
pub trait BlobStore: Send + Sync + std::fmt::Debug {
    /// Persist `data` under the task's destination and return a reference.
    async fn store(&self, task_id: TaskId, name: &str, data: ByteStream)
        -> AppResult<StoredArchive>;

    /// List archives stored for a task, newest first.
    async fn list_stored(&self, task_id: TaskId) -> AppResult<Vec<StoredArchive>>;

    /// Delete a stored archive. Used by retention enforcement.
    async fn delete(&self, archive: &StoredArchive) -> AppResult<()>;
}

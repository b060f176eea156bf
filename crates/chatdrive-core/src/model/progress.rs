//! Live progress reporting for an in-flight backup run.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::TaskId;

/// Phase of a backup run.
///
/// Phases advance strictly forward; `Failed` is reachable from any
/// non-terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupPhase {
    /// Walking the source tree to gather totals.
    Scanning,
    /// Fetching files from the remote source.
    Downloading,
    /// Building the archive from downloaded files.
    Archiving,
    /// Persisting the archive (or individual files) to the blob store.
    Uploading,
    /// The run finished successfully.
    Complete,
    /// The run ended in failure.
    Failed,
}

impl BackupPhase {
    /// Check whether the phase is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Return the phase as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scanning => "scanning",
            Self::Downloading => "downloading",
            Self::Archiving => "archiving",
            Self::Uploading => "uploading",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for BackupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Point-in-time view of a running backup.
///
/// A snapshot exists exactly while its run is executing; a task with no
/// snapshot is not currently running. `files_processed` and `total_bytes`
/// never decrease within a run, and `reconnects` only increments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Task this run belongs to.
    pub task_id: TaskId,
    /// Current phase.
    pub phase: BackupPhase,
    /// Files fetched so far.
    pub files_processed: u64,
    /// Total files discovered by the scan; 0 when scanning was skipped
    /// and the total is unknown.
    pub total_files: u64,
    /// Bytes transferred so far.
    pub total_bytes: u64,
    /// Directory or file currently being processed.
    pub current_item: String,
    /// Transfer-layer reconnections performed during this run.
    pub reconnects: u32,
    /// Milliseconds elapsed since the run started.
    pub elapsed_ms: u64,
}

impl ProgressSnapshot {
    /// Create the initial snapshot for a run of `task_id`.
    pub fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            phase: BackupPhase::Scanning,
            files_processed: 0,
            total_files: 0,
            total_bytes: 0,
            current_item: String::new(),
            reconnects: 0,
            elapsed_ms: 0,
        }
    }
}

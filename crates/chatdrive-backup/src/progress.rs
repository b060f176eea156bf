//! Live progress tracking for in-flight backup runs.

use std::time::Instant;

use dashmap::DashMap;

use chatdrive_core::model::ProgressSnapshot;
use chatdrive_core::types::TaskId;

/// Per-run bookkeeping kept alongside the published snapshot.
#[derive(Debug)]
struct ActiveRun {
    snapshot: ProgressSnapshot,
    started: Instant,
}

/// In-memory map from task id to the live progress of its current run.
///
/// A task has an entry exactly while it is running. Updates replace the
/// whole snapshot under the map's shard lock, so concurrent readers always
/// observe a consistent snapshot, never a partially applied update.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    runs: DashMap<TaskId, ActiveRun>,
}

impl ProgressTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the initial snapshot for a starting run.
    pub(crate) fn start(&self, task_id: TaskId) {
        self.runs.insert(
            task_id,
            ActiveRun {
                snapshot: ProgressSnapshot::new(task_id),
                started: Instant::now(),
            },
        );
    }

    /// Apply `f` to a copy of the current snapshot and publish the result
    /// as a single replacement. No-op if the run has already finished.
    pub(crate) fn update(&self, task_id: TaskId, f: impl FnOnce(&mut ProgressSnapshot)) {
        if let Some(mut run) = self.runs.get_mut(&task_id) {
            let mut snapshot = run.snapshot.clone();
            f(&mut snapshot);
            run.snapshot = snapshot;
        }
    }

    /// Remove the snapshot for a finished run.
    pub(crate) fn clear(&self, task_id: TaskId) {
        self.runs.remove(&task_id);
    }

    /// Current snapshot for a task, or `None` when it is not running.
    pub fn get(&self, task_id: TaskId) -> Option<ProgressSnapshot> {
        self.runs.get(&task_id).map(|run| {
            let mut snapshot = run.snapshot.clone();
            snapshot.elapsed_ms = run.started.elapsed().as_millis() as u64;
            snapshot
        })
    }

    /// Snapshots of every run currently in flight.
    pub fn all(&self) -> Vec<ProgressSnapshot> {
        self.runs
            .iter()
            .map(|entry| {
                let mut snapshot = entry.snapshot.clone();
                snapshot.elapsed_ms = entry.started.elapsed().as_millis() as u64;
                snapshot
            })
            .collect()
    }
}

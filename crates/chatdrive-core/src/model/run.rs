//! Outcome of a completed backup run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::TaskId;

/// Terminal outcome of an executed run.
///
/// Cancellation is deliberately distinct from failure so callers can tell
/// user intent apart from error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "status", content = "detail")]
pub enum RunOutcome {
    /// The run completed all phases.
    Success,
    /// The run failed with the given error detail.
    Failed(String),
    /// The run was stopped cooperatively.
    Cancelled,
}

impl RunOutcome {
    /// Whether the run completed successfully.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Result of one execution attempt of a task, delivered to every waiter
/// attached to the run's queue entry and recorded via the task store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Task that was executed.
    pub task_id: TaskId,
    /// When execution started.
    pub started_at: DateTime<Utc>,
    /// Wall-clock runtime in milliseconds.
    pub duration_ms: u64,
    /// Terminal outcome.
    pub outcome: RunOutcome,
}

//! Persistence contract for task definitions and run history.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::BackupTask;
use crate::result::AppResult;
use crate::types::TaskId;

/// Read access to task definitions and write access to run history.
///
/// The scheduler core only ever looks tasks up by id; enumerating tasks
/// and reacting to definition changes is the CRUD layer's job, which calls
/// the scheduler's schedule/reschedule/unschedule operations synchronously
/// with every create, update, and delete.
#[async_trait]
pub trait TaskStore: Send + Sync + std::fmt::Debug {
    /// Fetch a task definition by id.
    async fn task_by_id(&self, id: TaskId) -> AppResult<Option<BackupTask>>;

    /// Record the outcome of an executed run (last-run timestamp and
    /// runtime). Called for every executed run, successful or not.
    async fn record_run(
        &self,
        id: TaskId,
        started_at: DateTime<Utc>,
        runtime: Duration,
        success: bool,
    ) -> AppResult<()>;
}

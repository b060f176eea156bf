//! Cron registry: one schedule trigger per enabled task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use uuid::Uuid;

use chatdrive_core::error::AppError;
use chatdrive_core::result::AppResult;
use chatdrive_core::types::TaskId;

use crate::queue::ExecutionQueue;

/// Cron-based trigger registry for backup tasks.
///
/// Each registered task holds exactly one trigger. On a matching tick the
/// trigger issues an admission request to the execution queue and never
/// waits on the run; a tick for a task that is still queued or running is
/// absorbed by the queue's duplicate rejection.
pub struct CronScheduler {
    /// The underlying job scheduler.
    scheduler: JobScheduler,
    /// Queue that receives admission requests.
    queue: Arc<ExecutionQueue>,
    /// Trigger guid per registered task.
    jobs: Mutex<HashMap<TaskId, Uuid>>,
}

impl std::fmt::Debug for CronScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronScheduler").finish()
    }
}

impl CronScheduler {
    /// Create a new cron registry feeding `queue`.
    pub async fn new(queue: Arc<ExecutionQueue>) -> AppResult<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {e}")))?;

        Ok(Self {
            scheduler,
            queue,
            jobs: Mutex::new(HashMap::new()),
        })
    }

    /// Start firing registered triggers.
    pub async fn start(&self) -> AppResult<()> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {e}")))?;

        tracing::info!("Cron scheduler started");
        Ok(())
    }

    /// Shut the underlying scheduler down. No further ticks fire.
    pub async fn shutdown(&self) -> AppResult<()> {
        let mut scheduler = self.scheduler.clone();
        scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {e}")))?;

        tracing::info!("Cron scheduler shut down");
        Ok(())
    }

    /// Install (or replace) the trigger for a task.
    ///
    /// A malformed cron expression is rejected synchronously as a
    /// validation error and never reaches the queue. When a trigger
    /// already exists the replacement is added before the old one is
    /// removed, so an expression that still matches "now" loses no tick.
    pub async fn schedule(&self, task_id: TaskId, cron: &str) -> AppResult<()> {
        let queue = Arc::clone(&self.queue);
        let job = CronJob::new_async(cron, move |_uuid, _lock| {
            let queue = Arc::clone(&queue);
            Box::pin(async move {
                queue.admit_from_schedule(task_id);
            })
        })
        .map_err(|e| AppError::validation(format!("Invalid cron expression '{cron}': {e}")))?;

        let guid = self
            .scheduler
            .add(job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add schedule: {e}")))?;

        let previous = {
            let mut jobs = self.jobs.lock().expect("cron job map poisoned");
            jobs.insert(task_id, guid)
        };
        if let Some(old) = previous {
            if let Err(e) = self.scheduler.remove(&old).await {
                tracing::warn!(task = %task_id, "Failed to remove replaced trigger: {e}");
            }
            tracing::info!(task = %task_id, cron, "Rescheduled task");
        } else {
            tracing::info!(task = %task_id, cron, "Scheduled task");
        }
        Ok(())
    }

    /// Replace a task's trigger in place.
    pub async fn reschedule(&self, task_id: TaskId, cron: &str) -> AppResult<()> {
        self.schedule(task_id, cron).await
    }

    /// Remove a task's trigger. Idempotent: unscheduling an unknown task
    /// is a no-op, not an error.
    pub async fn unschedule(&self, task_id: TaskId) -> AppResult<()> {
        let guid = {
            let mut jobs = self.jobs.lock().expect("cron job map poisoned");
            jobs.remove(&task_id)
        };
        if let Some(guid) = guid {
            self.scheduler
                .remove(&guid)
                .await
                .map_err(|e| AppError::internal(format!("Failed to remove schedule: {e}")))?;
            tracing::info!(task = %task_id, "Unscheduled task");
        }
        Ok(())
    }

    /// Whether a trigger is currently registered for the task.
    pub fn is_scheduled(&self, task_id: TaskId) -> bool {
        self.jobs
            .lock()
            .expect("cron job map poisoned")
            .contains_key(&task_id)
    }
}

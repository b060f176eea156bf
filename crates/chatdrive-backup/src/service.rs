//! Control surface exposed to the CRUD/HTTP layer.
//!
//! `BackupService` is an explicitly constructed, explicitly owned object:
//! the caller builds it from collaborator handles and configuration,
//! starts it, hands it to whatever exposes the HTTP surface, and shuts it
//! down with an explicit policy for the in-flight run.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use chatdrive_core::config::scheduler::SchedulerConfig;
use chatdrive_core::error::AppError;
use chatdrive_core::model::{BackupTask, ProgressSnapshot, RunResult};
use chatdrive_core::result::AppResult;
use chatdrive_core::traits::{BlobStore, Compressor, Encryptor, TaskStore, TransferClient};
use chatdrive_core::types::TaskId;

use crate::error::SchedulerError;
use crate::executor::BackupExecutor;
use crate::progress::ProgressTracker;
use crate::queue::{ExecutionQueue, QueueStatus};
use crate::runner::RunnerSupervisor;
use crate::scheduler::CronScheduler;

/// What to do with an in-flight run at shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Wait for the active run to finish, bounded by the configured
    /// grace period.
    AwaitActive,
    /// Abort the supervisor immediately, abandoning the active run.
    Abandon,
}

/// Outcome of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The running task was asked to stop; it winds down at its next
    /// cancellation checkpoint.
    Stopped,
    /// The task was not running. Distinct from success by design.
    NotRunning,
}

/// The backup scheduler's public face.
#[derive(Debug)]
pub struct BackupService {
    store: Arc<dyn TaskStore>,
    queue: Arc<ExecutionQueue>,
    tracker: Arc<ProgressTracker>,
    cron: CronScheduler,
    runner: Arc<RunnerSupervisor>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
    config: SchedulerConfig,
}

impl BackupService {
    /// Assemble a service from its collaborators. Nothing runs until
    /// [`start`](Self::start) is called.
    pub async fn new(
        store: Arc<dyn TaskStore>,
        transfer: Arc<dyn TransferClient>,
        compressor: Arc<dyn Compressor>,
        encryptor: Arc<dyn Encryptor>,
        blobs: Arc<dyn BlobStore>,
        config: SchedulerConfig,
    ) -> AppResult<Self> {
        let tracker = Arc::new(ProgressTracker::new());
        let queue = Arc::new(ExecutionQueue::new());
        let executor = Arc::new(BackupExecutor::new(
            transfer,
            compressor,
            encryptor,
            blobs,
            Arc::clone(&tracker),
            config.clone(),
        ));
        let shutdown = CancellationToken::new();
        let runner = Arc::new(RunnerSupervisor::new(
            Arc::clone(&queue),
            Arc::clone(&tracker),
            executor,
            Arc::clone(&store),
            shutdown.clone(),
        ));
        let cron = CronScheduler::new(Arc::clone(&queue)).await?;

        Ok(Self {
            store,
            queue,
            tracker,
            cron,
            runner,
            supervisor: Mutex::new(None),
            shutdown,
            config,
        })
    }

    /// Spawn the run supervisor and start firing cron triggers.
    pub async fn start(&self) -> AppResult<()> {
        let runner = Arc::clone(&self.runner);
        let handle = tokio::spawn(async move { runner.run_loop().await });
        *self.supervisor.lock().expect("supervisor handle poisoned") = Some(handle);

        self.cron.start().await?;
        tracing::info!("Backup service started");
        Ok(())
    }

    /// Start the service and install triggers for the given definitions.
    ///
    /// The caller supplies the definitions; the core never enumerates
    /// persistence itself. Disabled tasks are skipped, and an invalid
    /// definition is logged and skipped rather than blocking startup.
    pub async fn start_with_tasks(&self, tasks: &[BackupTask]) -> AppResult<()> {
        self.start().await?;
        for task in tasks.iter().filter(|t| t.enabled) {
            let installed = match task.validate() {
                Ok(()) => self.cron.schedule(task.id, &task.cron).await,
                Err(e) => Err(e),
            };
            if let Err(e) = installed {
                tracing::warn!(
                    task = %task.id,
                    name = %task.name,
                    "Skipping task with invalid definition: {e}"
                );
            }
        }
        Ok(())
    }

    /// Install the cron trigger for a task.
    ///
    /// Validation failures (disabled task, missing credentials, malformed
    /// cron expression) are rejected here and never reach the queue.
    pub async fn schedule_task(&self, id: TaskId) -> Result<(), SchedulerError> {
        let task = self.require_task(id).await?;
        if !task.enabled {
            return Err(SchedulerError::Core(AppError::validation(format!(
                "task '{}' is disabled and cannot be scheduled",
                task.name
            ))));
        }
        task.validate().map_err(SchedulerError::Core)?;
        self.cron
            .schedule(id, &task.cron)
            .await
            .map_err(SchedulerError::Core)
    }

    /// Replace a task's trigger after its definition changed.
    pub async fn reschedule_task(&self, id: TaskId) -> Result<(), SchedulerError> {
        let task = self.require_task(id).await?;
        if !task.enabled {
            // An update that disables the task removes its trigger.
            return self.unschedule_task(id).await;
        }
        task.validate().map_err(SchedulerError::Core)?;
        self.cron
            .reschedule(id, &task.cron)
            .await
            .map_err(SchedulerError::Core)
    }

    /// Remove a task's trigger. Idempotent, and valid for ids whose
    /// definition no longer exists (the usual case on delete).
    pub async fn unschedule_task(&self, id: TaskId) -> Result<(), SchedulerError> {
        self.cron.unschedule(id).await.map_err(SchedulerError::Core)
    }

    /// Admit an immediate run and wait for its result.
    ///
    /// Manual runs deliberately bypass the `enabled` flag; only cron
    /// scheduling is gated on it. If a run for the task is already queued
    /// the caller shares that pending execution instead of erroring; if
    /// one is already executing this fails fast with `AlreadyRunning`.
    pub async fn run_now(&self, id: TaskId) -> Result<RunResult, SchedulerError> {
        self.require_task(id).await?;
        let handle = self.queue.enqueue(id)?;
        handle.wait().await
    }

    /// Ask the running task to stop at its next checkpoint.
    pub fn stop_task(&self, id: TaskId) -> StopOutcome {
        if self.queue.request_stop(id) {
            StopOutcome::Stopped
        } else {
            StopOutcome::NotRunning
        }
    }

    /// Remove a not-yet-started entry from the queue.
    pub fn dequeue_task(&self, id: TaskId) -> bool {
        self.queue.dequeue(id)
    }

    /// Queued task ids in FIFO order plus the currently running id.
    pub fn queue_status(&self) -> QueueStatus {
        self.queue.status()
    }

    /// Live progress of a task's current run, if it is running.
    pub fn progress(&self, id: TaskId) -> Option<ProgressSnapshot> {
        self.tracker.get(id)
    }

    /// Live progress of every in-flight run. Ownership filtering is the
    /// HTTP layer's concern.
    pub fn all_progress(&self) -> Vec<ProgressSnapshot> {
        self.tracker.all()
    }

    /// Stop firing triggers, reject new admissions, and wind down.
    pub async fn shutdown(&self, mode: ShutdownMode) -> AppResult<()> {
        tracing::info!(?mode, "Backup service shutting down");
        self.cron.shutdown().await?;
        self.queue.close();
        self.shutdown.cancel();

        let handle = self
            .supervisor
            .lock()
            .expect("supervisor handle poisoned")
            .take();
        if let Some(handle) = handle {
            match mode {
                ShutdownMode::AwaitActive => {
                    let grace = Duration::from_secs(self.config.shutdown_grace_seconds);
                    if tokio::time::timeout(grace, handle).await.is_err() {
                        tracing::warn!(
                            "In-flight run did not finish within the grace period, abandoning it"
                        );
                    }
                }
                ShutdownMode::Abandon => {
                    handle.abort();
                }
            }
        }

        tracing::info!("Backup service shut down");
        Ok(())
    }

    async fn require_task(&self, id: TaskId) -> Result<BackupTask, SchedulerError> {
        self.store
            .task_by_id(id)
            .await
            .map_err(SchedulerError::Core)?
            .ok_or(SchedulerError::NotFound(id))
    }
}

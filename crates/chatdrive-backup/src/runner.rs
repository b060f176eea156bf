//! Run supervisor — owns the single active execution slot.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use chatdrive_core::model::{RunOutcome, RunResult};
use chatdrive_core::traits::TaskStore;

use crate::error::{ExecutionError, SchedulerError};
use crate::executor::BackupExecutor;
use crate::progress::ProgressTracker;
use crate::queue::{ExecutionQueue, QueueEntry};

/// Drains the execution queue one entry at a time.
///
/// Exactly one run is ever in flight: the supervisor takes the head entry
/// only when the run slot is free, executes it to a terminal outcome,
/// resolves every attached waiter, and only then frees the slot and picks
/// up the next entry. Executor failures never escape into the loop or the
/// next run's state.
#[derive(Debug)]
pub(crate) struct RunnerSupervisor {
    /// Queue being drained.
    queue: Arc<ExecutionQueue>,
    /// Live progress map.
    tracker: Arc<ProgressTracker>,
    /// Executor performing the actual backup work.
    executor: Arc<BackupExecutor>,
    /// Task definitions and run history.
    store: Arc<dyn TaskStore>,
    /// Service-wide shutdown signal; observed between runs only.
    shutdown: CancellationToken,
}

impl RunnerSupervisor {
    pub(crate) fn new(
        queue: Arc<ExecutionQueue>,
        tracker: Arc<ProgressTracker>,
        executor: Arc<BackupExecutor>,
        store: Arc<dyn TaskStore>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            tracker,
            executor,
            store,
            shutdown,
        }
    }

    /// Main loop: drain the queue, then sleep until new work arrives.
    pub(crate) async fn run_loop(&self) {
        tracing::info!("Run supervisor started");

        'outer: loop {
            while let Some((entry, cancel)) = self.queue.take_next() {
                let task_id = entry.task_id;
                self.run_entry(entry, cancel).await;
                self.queue.finish_running(task_id);
                if self.shutdown.is_cancelled() {
                    break 'outer;
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = self.queue.notified() => {}
            }
        }

        tracing::info!("Run supervisor stopped");
    }

    /// Execute one entry to a terminal outcome and resolve its waiters.
    async fn run_entry(&self, entry: QueueEntry, cancel: CancellationToken) {
        let task_id = entry.task_id;
        let waited_ms = (Utc::now() - entry.enqueued_at).num_milliseconds();

        let task = match self.store.task_by_id(task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                // Definition deleted between admission and pickup.
                tracing::warn!(task = %task_id, "Task vanished before its run started");
                for waiter in entry.waiters {
                    let _ = waiter.send(Err(SchedulerError::NotFound(task_id)));
                }
                return;
            }
            Err(e) => {
                tracing::error!(task = %task_id, "Failed to load task definition: {e}");
                for waiter in entry.waiters {
                    let _ = waiter.send(Err(SchedulerError::Core(e.clone())));
                }
                return;
            }
        };

        tracing::info!(task = %task_id, name = %task.name, waited_ms, "Starting backup run");
        let started_at = Utc::now();
        let started = Instant::now();
        self.tracker.start(task_id);

        let outcome = match self.executor.execute(&task, &cancel).await {
            Ok(()) => RunOutcome::Success,
            Err(ExecutionError::Cancelled) => RunOutcome::Cancelled,
            Err(ExecutionError::Failed(e)) => RunOutcome::Failed(e.to_string()),
        };
        let duration = started.elapsed();

        // Cleanup happens on every outcome, before any waiter can observe
        // the result and immediately request another run.
        self.tracker.clear(task_id);

        if let Err(e) = self
            .store
            .record_run(task_id, started_at, duration, outcome.is_success())
            .await
        {
            tracing::warn!(task = %task_id, "Failed to record run result: {e}");
        }

        let duration_ms = duration.as_millis() as u64;
        match &outcome {
            RunOutcome::Success => {
                tracing::info!(task = %task_id, duration_ms, "Backup run completed")
            }
            RunOutcome::Failed(detail) => {
                tracing::warn!(task = %task_id, duration_ms, "Backup run failed: {detail}")
            }
            RunOutcome::Cancelled => {
                tracing::info!(task = %task_id, duration_ms, "Backup run cancelled")
            }
        }

        let result = RunResult {
            task_id,
            started_at,
            duration_ms,
            outcome,
        };
        for waiter in entry.waiters {
            let _ = waiter.send(Ok(result.clone()));
        }
    }
}

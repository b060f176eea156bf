//! Scheduler-facing error types.
//!
//! Each admission and control outcome that a caller must distinguish gets
//! its own variant, so the layer above can map every case to an
//! unambiguous response without string matching.

use thiserror::Error;

use chatdrive_core::error::AppError;
use chatdrive_core::types::TaskId;

/// Errors returned by the queue and control surface.
#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    /// No task definition exists for the given id.
    #[error("task {0} not found")]
    NotFound(TaskId),

    /// The task is already executing; runs are not composable, so a
    /// second run cannot be queued behind an active one.
    #[error("task {0} is already running")]
    AlreadyRunning(TaskId),

    /// The queue entry was removed before it started running.
    #[error("task {0} was removed from the queue before it started")]
    Dequeued(TaskId),

    /// The scheduler is shutting down and no longer admits runs.
    #[error("scheduler is shutting down")]
    ShuttingDown,

    /// An underlying collaborator failed.
    #[error(transparent)]
    Core(#[from] AppError),
}

/// Terminal error of a single run, produced by the executor.
///
/// Transient transfer failures are retried inside the executor and never
/// surface here; only exhaustion or a fatal condition does.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The run observed its cancellation token at a checkpoint.
    #[error("run cancelled")]
    Cancelled,

    /// The run failed and will not be retried until the next admission.
    #[error(transparent)]
    Failed(#[from] AppError),
}

//! Scheduled backup engine for Chatdrive.
//!
//! This crate provides:
//! - A cron registry that fires admission requests on task schedules
//! - A serialized execution queue with at most one run in flight
//! - A run supervisor that executes backups and resolves waiters
//! - A per-phase task executor with reconnect/backoff and retention
//! - A live progress tracker queried by the control surface

pub mod error;
pub mod executor;
pub mod progress;
pub mod queue;
pub mod runner;
pub mod scheduler;
pub mod service;

pub use error::SchedulerError;
pub use progress::ProgressTracker;
pub use queue::{ExecutionQueue, QueueStatus, WaitHandle};
pub use scheduler::CronScheduler;
pub use service::{BackupService, ShutdownMode, StopOutcome};

//! Backup domain model.

pub mod progress;
pub mod run;
pub mod task;

pub use progress::{BackupPhase, ProgressSnapshot};
pub use run::{RunOutcome, RunResult};
pub use task::{BackupTask, CompressionFormat, TransferEndpoint};

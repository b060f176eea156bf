//! Shared primitive types.

pub mod id;

pub use id::{ArchiveId, RunId, TaskId};

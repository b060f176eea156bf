//! Backup task definition.
//!
//! Task definitions are owned by the persistence layer and read by the
//! scheduler core through [`crate::traits::TaskStore`]. The core never
//! schedules a task it has not been explicitly told about.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::result::AppResult;
use crate::types::TaskId;

/// Connection parameters for the remote source of a backup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferEndpoint {
    /// Remote host name or address.
    pub host: String,
    /// Remote port.
    pub port: u16,
    /// Root path on the remote to back up.
    pub root_path: String,
    /// Login user name.
    pub username: String,
    /// Password credential, if configured.
    pub password: Option<String>,
    /// Private-key credential, if configured.
    pub private_key: Option<String>,
}

impl TransferEndpoint {
    /// Whether at least one authentication method carries credentials.
    pub fn has_credentials(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
            || self.private_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// Archive format applied to a run's downloaded files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionFormat {
    /// No archiving; each file is stored individually.
    None,
    /// Single ZIP archive.
    Zip,
    /// Single gzip-compressed tarball.
    TarGz,
}

impl CompressionFormat {
    /// File extension for archives of this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Zip => "zip",
            Self::TarGz => "tar.gz",
        }
    }

    /// Return the format as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Zip => "zip",
            Self::TarGz => "tar_gz",
        }
    }
}

impl fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user-defined recurring backup job definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupTask {
    /// Unique identifier.
    pub id: TaskId,
    /// Human-readable task name.
    pub name: String,
    /// Cron expression controlling when the task fires.
    pub cron: String,
    /// Whether cron scheduling is active for this task. Manual runs are
    /// permitted regardless of this flag.
    pub enabled: bool,
    /// Scheduling order hint; lower values are scheduled first when the
    /// upstream list view reorders tasks. Never reorders an admitted run.
    pub priority: i32,
    /// Remote source connection parameters.
    pub endpoint: TransferEndpoint,
    /// Destination location reference in the blob store.
    pub destination: String,
    /// Archive format for this task's runs.
    pub compression: CompressionFormat,
    /// Number of most-recent archives to keep; 0 keeps all.
    pub retention: u32,
    /// Whether the outbound stream is encrypted before storage.
    pub encrypt: bool,
    /// Whether a run scans the source tree up front to obtain totals.
    /// When skipped, total counts stay 0 and must be read as "unknown".
    pub scan_before_run: bool,
}

impl BackupTask {
    /// Validate the parts of a definition the scheduler depends on.
    ///
    /// Cron syntax is validated separately when the trigger is installed.
    pub fn validate(&self) -> AppResult<()> {
        if !self.endpoint.has_credentials() {
            return Err(AppError::validation(format!(
                "task '{}' has neither a password nor a private key configured",
                self.name
            )));
        }
        if self.destination.is_empty() {
            return Err(AppError::validation(format!(
                "task '{}' has no destination configured",
                self.name
            )));
        }
        Ok(())
    }
}

//! Backup scheduler configuration.

use serde::{Deserialize, Serialize};

/// Backup scheduler and executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of consecutive reconnect attempts before a run fails.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Base delay in milliseconds before the first reconnect attempt.
    /// Doubled on each subsequent attempt.
    #[serde(default = "default_reconnect_base_delay")]
    pub reconnect_base_delay_ms: u64,
    /// How long shutdown waits for an in-flight run before giving up.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay(),
            shutdown_grace_seconds: default_shutdown_grace(),
        }
    }
}

fn default_max_reconnect_attempts() -> u32 {
    3
}

fn default_reconnect_base_delay() -> u64 {
    500
}

fn default_shutdown_grace() -> u64 {
    30
}

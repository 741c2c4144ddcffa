//! Worker pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent workers.
    #[serde(default = "default_count")]
    pub count: usize,

    /// Upper bound on one transform, in seconds (0 = no limit).
    /// A timed-out task is left uncommitted and will be redelivered.
    /// The blocking transform itself keeps running to completion.
    #[serde(default)]
    pub task_timeout_secs: u64,

    /// Deliveries allowed per task before it is moved to `failed`
    /// and its message committed (0 = retry forever).
    #[serde(default)]
    pub max_deliveries: u32,

    /// Capacity of the channel between the poll loop and the workers.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Pause before a failed message is handed back to the broker for
    /// another attempt, in milliseconds.
    #[serde(default = "default_redelivery_delay_ms")]
    pub redelivery_delay_ms: u64,
}

fn default_count() -> usize {
    4
}

fn default_channel_capacity() -> usize {
    64
}

fn default_redelivery_delay_ms() -> u64 {
    1000
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: default_count(),
            task_timeout_secs: 0,
            max_deliveries: 0,
            channel_capacity: default_channel_capacity(),
            redelivery_delay_ms: default_redelivery_delay_ms(),
        }
    }
}

impl WorkerConfig {
    pub fn task_timeout(&self) -> Option<Duration> {
        (self.task_timeout_secs > 0).then(|| Duration::from_secs(self.task_timeout_secs))
    }

    pub fn redelivery_delay(&self) -> Duration {
        Duration::from_millis(self.redelivery_delay_ms)
    }
}

//! Backlog recovery configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the backlog sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Seconds between sweeps after the startup sweep (0 = startup only).
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

fn default_interval() -> u64 {
    60
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
        }
    }
}

impl RecoveryConfig {
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RecoveryConfig::default();
        assert_eq!(config.interval(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_zero_means_startup_only() {
        let config: RecoveryConfig = toml::from_str("interval_secs = 0").unwrap();
        assert_eq!(config.interval(), None);
    }
}

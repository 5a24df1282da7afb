//! Watchdog liveness detector configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Controls the SIGALRM-driven liveness check.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct WatchdogConfig {
    /// Whether the watchdog alarm is installed at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Alarm period. A packet still in flight across two consecutive
    /// ticks is treated as a wedged process.
    #[serde(default = "default_interval")]
    #[validate(range(min = 1, max = 3600))]
    pub interval_secs: u32,
}

fn default_true() -> bool {
    true
}

fn default_interval() -> u32 {
    10
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            interval_secs: default_interval(),
        }
    }
}

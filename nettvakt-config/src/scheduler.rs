//! Scheduler configuration: per-packet timer budget, load sampling and the
//! loop exit policy.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Parameters of the packet-driven run loop.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct SchedulerConfig {
    /// Upper bound on timers charged to a single packet dispatch.
    #[serde(default = "default_max_timer_expires")]
    #[validate(range(min = 1, max = 100_000))]
    pub max_timer_expires: u32,

    /// One in `load_sample_freq` dispatches is profiled; 0 disables sampling.
    #[serde(default = "default_load_sample_freq")]
    pub load_sample_freq: u32,

    /// Keep the loop alive until explicitly terminated, even with no sources.
    #[serde(default)]
    pub exit_only_after_terminate: bool,
}

fn default_max_timer_expires() -> u32 {
    300
}

fn default_load_sample_freq() -> u32 {
    20
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_timer_expires: default_max_timer_expires(),
            load_sample_freq: default_load_sample_freq(),
            exit_only_after_terminate: false,
        }
    }
}

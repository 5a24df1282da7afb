//! Packet capture configuration (live devices and trace replay).

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Parameters shared by live capture and trace replay.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct CaptureConfig {
    /// Capture snapshot length in bytes.
    #[serde(default = "default_snaplen")]
    #[validate(range(min = 64, max = 262_144))]
    pub snaplen: u32,

    /// Put live devices into promiscuous mode.
    #[serde(default = "default_true")]
    pub promiscuous: bool,

    /// Kernel capture buffer size in bytes for live devices.
    #[serde(default = "default_buffer_size")]
    #[validate(range(min = 65_536, max = 1_073_741_824))]
    pub buffer_size: u32,

    /// Trace pacing factor. 0 replays as fast as possible; a positive
    /// value stretches replay toward wall-clock cadence (2.0 = twice
    /// as fast as the recorded gaps).
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub pseudo_realtime: f64,
}

fn default_snaplen() -> u32 {
    65_535
}

fn default_true() -> bool {
    true
}

fn default_buffer_size() -> u32 {
    2 * 1024 * 1024
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            snaplen: default_snaplen(),
            promiscuous: default_true(),
            buffer_size: default_buffer_size(),
            pseudo_realtime: 0.0,
        }
    }
}

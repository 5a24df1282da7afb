//! # nettvakt configuration
//!
//! Hierarchical configuration for the nettvakt monitor.
//!
//! ## Features
//! - **Unified configuration**: single source of truth across all components
//! - **Validation**: runtime validation of critical scheduler parameters
//! - **Environment awareness**: `NETTVAKT_*` variables override file values

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod capture;
mod error;
mod scheduler;
mod telemetry;
mod watchdog;

pub use capture::CaptureConfig;
pub use error::ConfigError;
pub use scheduler::SchedulerConfig;
pub use telemetry::TelemetryConfig;
pub use watchdog::WatchdogConfig;

/// Top-level configuration container for all nettvakt components.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct NettvaktConfig {
    /// Scheduler parameters (timer budget, load sampling, exit policy).
    #[validate(nested)]
    pub scheduler: SchedulerConfig,

    /// Watchdog liveness detector parameters.
    #[validate(nested)]
    pub watchdog: WatchdogConfig,

    /// Packet capture parameters (live and trace modes).
    #[validate(nested)]
    pub capture: CaptureConfig,

    /// Telemetry and observability configuration.
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

impl NettvaktConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default values
    /// 2. `config/nettvakt.yaml` - base settings. If missing, defaults are used.
    /// 3. `NETTVAKT_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(NettvaktConfig::default()));

        if Path::new("config/nettvakt.yaml").exists() {
            figment = figment.merge(Yaml::file("config/nettvakt.yaml"));
        }

        figment
            .merge(Env::prefixed("NETTVAKT_").split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }

    /// Load configuration from a specific path for testing/validation.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(
                path.to_string_lossy().to_string(),
            )));
        }

        Figment::from(Serialized::defaults(NettvaktConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("NETTVAKT_").split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn full_config_validation() {
        let config = NettvaktConfig::default();
        config.validate().expect("default config should validate");
    }

    #[test]
    fn file_override() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        writeln!(file, "scheduler:\n  max_timer_expires: 64").unwrap();

        let config = NettvaktConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.scheduler.max_timer_expires, 64);
        // Untouched sections keep their defaults.
        assert_eq!(config.watchdog.interval_secs, 10);
    }

    #[test]
    fn missing_file_is_reported() {
        let err = NettvaktConfig::load_from_path("config/no-such-file.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn rejects_invalid_scheduler_budget() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        writeln!(file, "scheduler:\n  max_timer_expires: 0").unwrap();

        let err = NettvaktConfig::load_from_path(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}

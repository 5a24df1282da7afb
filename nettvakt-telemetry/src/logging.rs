//! Structured logging setup for nettvakt.
//!
//! All components log through `tracing` macros; this module owns the one
//! place the subscriber is installed. Reporter-style notices (suspend /
//! resume, final statistics) are plain `info!` events so they interleave
//! with the rest of the log stream.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber with the default `info` filter.
    pub fn init() {
        Self::init_with_level("info");
    }

    /// Installs the global subscriber honoring `RUST_LOG` when set,
    /// falling back to the given level otherwise.
    pub fn init_with_level(level: &str) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_thread_names(true)
            .init();

        tracing::debug!("logging initialized");
    }
}

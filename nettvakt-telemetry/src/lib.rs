//! # nettvakt-telemetry
//!
//! Observability layer for the nettvakt monitor: structured logging via
//! `tracing` and Prometheus metrics for the packet execution core.
//!
//! ### Components:
//! - `logging`: subscriber setup and the reporter-style notice helpers
//! - `metrics`: Prometheus registry with dispatch counters and histograms

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::MetricsRecorder;

//! Prometheus metrics for the packet execution core.

use prometheus::{Counter, Histogram, HistogramOpts, Registry};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub packets_dispatched: Counter,
    pub timers_expired: Counter,
    pub events_drained: Counter,
    pub dispatch_latency: Histogram,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        let registry = Registry::new();

        let packets_dispatched = Counter::new(
            "nettvakt_packets_dispatched_total",
            "Packets handed to the session layer",
        )
        .unwrap();

        let timers_expired = Counter::new(
            "nettvakt_timers_expired_total",
            "Timers fired by the scheduler",
        )
        .unwrap();

        let events_drained = Counter::new(
            "nettvakt_events_drained_total",
            "Events run to completion by the queue",
        )
        .unwrap();

        let dispatch_latency = Histogram::with_opts(
            HistogramOpts::new(
                "nettvakt_dispatch_latency_ns",
                "Wall-clock time spent on a single packet dispatch",
            )
            .buckets(vec![10_000.0, 100_000.0, 1_000_000.0, 10_000_000.0, 100_000_000.0]),
        )
        .unwrap();

        registry.register(Box::new(packets_dispatched.clone())).unwrap();
        registry.register(Box::new(timers_expired.clone())).unwrap();
        registry.register(Box::new(events_drained.clone())).unwrap();
        registry.register(Box::new(dispatch_latency.clone())).unwrap();

        Self {
            registry,
            packets_dispatched,
            timers_expired,
            events_drained,
            dispatch_latency,
        }
    }

    /// Renders the registry in the Prometheus text exposition format.
    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer).unwrap())
    }
}

//! The packet-driven run loop.
//!
//! The [`Runtime`] owns the clock and run flags, the I/O source
//! registry, the timer manager, the event queue and the session layer,
//! and threads them through one explicit context instead of
//! free-standing globals. Scheduling is single-threaded cooperative:
//! the time axis is defined by the packets, timers due at or before a
//! packet's timestamp fire before that packet's events, and every
//! event cascade settles before the next packet is read.

use std::rc::Rc;
use std::time::Instant;

use rand::Rng;
use tracing::{debug, info, info_span, warn};

use nettvakt_capture::source::{PollContext, Recv, SourceOptions};
use nettvakt_capture::{IoSourceRegistry, Packet, PacketDumper};
use nettvakt_config::NettvaktConfig;
use nettvakt_core::events::{EventHandler, EventManager};
use nettvakt_core::script::{GlobalScope, Value};
use nettvakt_core::time::{wall_clock_ns, RunState, SuspendTransition, NS_PER_SEC};
use nettvakt_core::timers::TimerManager;
use nettvakt_telemetry::MetricsRecorder;

use crate::error::EngineError;
use crate::sessions::SessionLayer;
use crate::{signal, watchdog};

/// DLT_EN10MB, used when no packet source tells us better.
const DEFAULT_LINK_TYPE: u32 = 1;

/// Status of an external communication endpoint (broker). The loop
/// keeps advancing the clock during idle lulls while one is active.
pub trait CommStatus {
    fn active(&self) -> bool;
}

/// Wall-clock profiler for sampled dispatches.
struct LoadSampler {
    started: Instant,
    _span: tracing::span::EnteredSpan,
}

impl LoadSampler {
    fn begin() -> Self {
        Self {
            started: Instant::now(),
            _span: info_span!("load_sample").entered(),
        }
    }

    fn finish(self, metrics: &MetricsRecorder) {
        metrics
            .dispatch_latency
            .observe(self.started.elapsed().as_nanos() as f64);
    }
}

/// The execution core. Create, [`Runtime::init_run`], then
/// [`Runtime::run_loop`] until termination, then
/// [`Runtime::finish_run`].
pub struct Runtime {
    pub state: RunState,
    pub registry: IoSourceRegistry,
    pub timers: TimerManager,
    pub events: EventManager,
    pub globals: GlobalScope,

    config: NettvaktConfig,
    sessions: Box<dyn SessionLayer>,
    comm: Option<Box<dyn CommStatus>>,
    metrics: MetricsRecorder,
    dumper: Option<PacketDumper>,

    network_time_init: Rc<EventHandler>,

    /// RNG threshold for load sampling; `None` disables sampling.
    load_threshold: Option<u32>,

    exit_only_after_terminate: bool,
    current_iosrc: Option<usize>,
    watchdog_armed: bool,
    final_stats_done: bool,
}

impl Runtime {
    pub fn new(
        config: NettvaktConfig,
        sessions: Box<dyn SessionLayer>,
        metrics: MetricsRecorder,
    ) -> Self {
        let mut state = RunState::new();
        state.pseudo_realtime = config.capture.pseudo_realtime;

        let load_threshold = match config.scheduler.load_sample_freq {
            0 => None,
            freq => Some(u32::MAX / freq),
        };

        Self {
            state,
            registry: IoSourceRegistry::new(),
            timers: TimerManager::new(),
            events: EventManager::new(),
            globals: GlobalScope::new(),
            exit_only_after_terminate: config.scheduler.exit_only_after_terminate,
            config,
            sessions,
            comm: None,
            metrics,
            dumper: None,
            network_time_init: EventHandler::new("network_time_init"),
            load_threshold,
            current_iosrc: None,
            watchdog_armed: false,
            final_stats_done: false,
        }
    }

    /// The one-shot event fired when the first packet defines the
    /// network time origin.
    pub fn network_time_init_handler(&self) -> Rc<EventHandler> {
        Rc::clone(&self.network_time_init)
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    /// Attaches a communication endpoint whose liveness keeps the idle
    /// loop advancing timers.
    pub fn set_comm(&mut self, comm: Box<dyn CommStatus>) {
        self.comm = Some(comm);
    }

    pub fn trace_output_path(&self) -> Option<&str> {
        self.dumper.as_ref().map(|d| d.path())
    }

    /// Whether final statistics have been captured.
    pub fn final_stats_taken(&self) -> bool {
        self.final_stats_done
    }

    /// Index of the source currently being serviced; `None` when idle.
    pub fn current_iosrc(&self) -> Option<usize> {
        self.current_iosrc
    }

    /// Opens the configured input and output, initializes the mode
    /// flags and optionally arms the watchdog.
    ///
    /// At most one of `interface` and `pcap_input` may be given; both
    /// absent selects timer-only mode.
    pub fn init_run(
        &mut self,
        interface: Option<&str>,
        pcap_input: Option<&str>,
        pcap_output: Option<&str>,
        do_watchdog: bool,
    ) -> Result<(), EngineError> {
        if interface.is_some() && pcap_input.is_some() {
            return Err(EngineError::Init(
                "both a capture interface and a trace input were given".into(),
            ));
        }

        let opts = SourceOptions {
            snaplen: self.config.capture.snaplen,
            promiscuous: self.config.capture.promiscuous,
            buffer_size: self.config.capture.buffer_size,
            ..SourceOptions::default()
        };

        if let Some(path) = pcap_input {
            self.state.reading_traces = true;
            self.state.reading_live = self.state.pseudo_realtime > 0.0;
            self.registry.open_packet_source(path, false, &opts)?;
        } else if let Some(iface) = interface {
            self.state.reading_live = true;
            self.state.reading_traces = false;
            self.registry.open_packet_source(iface, true, &opts)?;
        } else {
            // Timer-only mode. Whether timers actually become pending
            // depends on what init handlers schedule, so
            // have_pending_timers is left for the loop to discover.
            self.state.reading_live = false;
            self.state.reading_traces = false;
        }

        if let Some(path) = pcap_output {
            let link_type = self
                .registry
                .get_packet_source()
                .map(|ps| ps.link_type())
                .unwrap_or(DEFAULT_LINK_TYPE);
            let dumper = self.registry.open_packet_dumper(path, link_type, false)?;
            self.globals
                .set("trace_output_file", Value::str(dumper.path()));
            self.dumper = Some(dumper);
        }

        if do_watchdog && self.config.watchdog.enabled {
            watchdog::install(self.config.watchdog.interval_secs)?;
            self.watchdog_armed = true;
        }

        self.publish_globals();
        Ok(())
    }

    /// Fires due timers against the remaining per-packet budget.
    fn expire_timers(&mut self) {
        let budget = self
            .config
            .scheduler
            .max_timer_expires
            .saturating_sub(self.state.current_dispatched);

        let fired = self
            .timers
            .advance(self.state.clock.now_ns(), budget, &mut self.events);

        self.state.current_dispatched += fired;
        watchdog::note_dispatched(self.state.current_dispatched);
        self.metrics.timers_expired.inc_by(fired as f64);
    }

    /// Runs the event queue to quiescence, charging the drained work
    /// to the current packet.
    fn drain_events(&mut self) {
        let drained = self.events.drain();
        self.metrics.events_drained.inc_by(drained as f64);
        self.state.current_dispatched = self
            .state
            .current_dispatched
            .saturating_add(drained.min(u32::MAX as u64) as u32);
        watchdog::note_dispatched(self.state.current_dispatched);
    }

    /// Dispatches one packet: advances the clock, expires due timers,
    /// hands the packet to the session layer and drains the resulting
    /// event cascade.
    pub fn dispatch_packet(&mut self, pkt: &Packet, src: Option<usize>) {
        let t_ns = pkt.ts_ns;

        if self.state.clock.mark_first_packet(t_ns) {
            self.events.enqueue(
                Rc::clone(&self.network_time_init),
                vec![Value::Double(t_ns as f64 / NS_PER_SEC as f64)],
            );
        }

        // network_time never goes back, even when the timer manager
        // has run ahead during an idle lull.
        let now_ns = t_ns.max(self.timers.time_ns());
        self.state.clock.update_network_time(now_ns);

        self.current_iosrc = src;
        self.state.current_timestamp_ns = t_ns;
        self.state.clock.set_processing_start(t_ns);
        // SAFETY: end_dispatch runs before this function returns, so
        // the pointer never outlives the borrow.
        unsafe {
            watchdog::begin_dispatch(t_ns, pkt);
        }

        // If this very dispatch wedges, the abort report can only
        // carry what was published before it.
        if let Some(ps) = self.registry.get_packet_source() {
            let stats = ps.statistics();
            watchdog::publish_stats(stats.received, stats.dropped);
        }

        self.expire_timers();

        let mut sampler = None;
        if let Some(threshold) = self.load_threshold {
            if rand::rng().random::<u32>() < threshold {
                // Drain the queued timer events first so they're not
                // charged against this sample.
                self.drain_events();
                sampler = Some(LoadSampler::begin());
            }
        }

        if let Some(dumper) = self.dumper.as_mut() {
            dumper.dump(pkt);
        }

        self.sessions.next_packet(t_ns, pkt, &mut self.events);
        self.drain_events();

        if let Some(sampler) = sampler {
            sampler.finish(&self.metrics);
        }

        self.state.clock.clear_processing_start();
        self.state.current_dispatched = 0;
        self.state.current_timestamp_ns = 0;
        self.current_iosrc = None;
        watchdog::end_dispatch();
        self.metrics.packets_dispatched.inc();
    }

    /// Services one ready source: packet sources feed
    /// [`Runtime::dispatch_packet`], everything else enqueues events
    /// directly.
    fn service_source(&mut self, idx: usize) {
        let received = {
            let Some(source) = self.registry.source_mut(idx) else {
                return;
            };

            if !source.is_packet_source() {
                if let Err(e) = source.process(&mut self.events) {
                    warn!(tag = source.tag(), error = %e, "I/O source failed");
                }
                return;
            }

            match source.as_packet_source().map(|ps| ps.recv()) {
                Some(Ok(Recv::Packet(pkt))) => Some(pkt),
                Some(Ok(Recv::Timeout)) => None,
                Some(Ok(Recv::Eof)) => {
                    debug!("packet source exhausted");
                    None
                }
                Some(Err(e)) => {
                    warn!(error = %e, "packet source read failed");
                    None
                }
                None => None,
            }
        };

        if let Some(pkt) = received {
            self.dispatch_packet(&pkt, Some(idx));
        }
    }

    /// The main loop: multiplex sources, keep timers and events
    /// current, honor termination.
    pub fn run_loop(&mut self) {
        info!("run loop starting");

        while self.registry.size() > 0
            || (self.exit_only_after_terminate && !self.state.terminating)
        {
            let ctx = PollContext {
                now_wall_ns: wall_clock_ns(),
                pseudo_realtime: self.state.pseudo_realtime,
                suspended: self.state.is_processing_suspended(),
            };
            let ready = self.registry.find_ready(ctx);
            let communication_active = self.comm.as_ref().is_some_and(|c| c.active());

            if !ready.is_empty() {
                for idx in ready {
                    self.current_iosrc = Some(idx);
                    self.service_source(idx);
                }
            } else if (self.state.have_pending_timers
                || communication_active
                || self.exit_only_after_terminate)
                && self.state.pseudo_realtime == 0.0
            {
                // Take advantage of the lull to get up to date on
                // timers and events. This is the only place network
                // time advances without a packet.
                let now_ns = wall_clock_ns().max(self.state.clock.now_ns());
                self.state.clock.update_network_time(now_ns);
                self.expire_timers();
            }

            self.drain_events();

            // Not processing anymore.
            self.state.clock.clear_processing_start();
            self.state.current_dispatched = 0;
            self.state.current_timestamp_ns = 0;
            self.current_iosrc = None;
            watchdog::end_dispatch();

            self.sync_script_globals();

            if signal::termination_requested() {
                self.terminate_loop("received termination signal");
            }

            if self.state.terminating {
                break;
            }

            if !self.state.reading_traces {
                // Check whether timers scheduled for the future need
                // the idle path to keep running.
                self.state.have_pending_timers = self.timers.size() > 0;
            }

            if self.state.pseudo_realtime > 0.0 && !self.registry.has_open_packet_source() {
                debug!("no open packet source remains, disabling pseudo-realtime pacing");
                self.state.pseudo_realtime = 0.0;
            }

            self.publish_globals();
        }

        // Capture the final statistics now rather than in
        // finish_run(): pending timers may keep expiring for a while
        // yet, and packets dropped past this point shouldn't count.
        self.get_final_stats();
    }

    /// Marks the loop for termination at the next check.
    pub fn terminate_loop(&mut self, reason: &str) {
        if !self.state.terminating {
            info!(reason, "terminating run loop");
            self.state.terminating = true;
            self.globals.set("terminating", Value::Bool(true));
        }
    }

    /// Reports live-source statistics once.
    pub fn get_final_stats(&mut self) {
        if self.final_stats_done {
            return;
        }
        self.final_stats_done = true;

        if let Some(ps) = self.registry.get_packet_source() {
            if ps.is_live() {
                let stats = ps.statistics();
                let total = stats.received + stats.dropped;
                let dropped_pct = if stats.dropped > 0 && total > 0 {
                    stats.dropped as f64 / total as f64 * 100.0
                } else {
                    0.0
                };
                info!(
                    received = stats.received,
                    path = ps.path(),
                    dropped = stats.dropped,
                    dropped_pct,
                    "final packet statistics"
                );
                watchdog::publish_stats(stats.received, stats.dropped);
            }
        }
    }

    /// Final shutdown: optionally drains sessions and events, then
    /// disarms the watchdog and flushes the dump file.
    pub fn finish_run(&mut self, drain_events: bool) {
        info!("finishing run");

        if drain_events {
            self.sessions.drain(&mut self.events);
            self.drain_events();
            self.sessions.done();
        }

        if self.watchdog_armed {
            watchdog::disarm();
            self.watchdog_armed = false;
        }

        if let Some(dumper) = self.dumper.as_mut() {
            if let Err(e) = dumper.flush() {
                warn!(error = %e, "failed to flush packet dumper");
            }
        }
    }

    /// Suspends packet processing; nests.
    pub fn suspend_processing(&mut self) {
        if self.state.suspend_processing() == SuspendTransition::Edge {
            info!("processing suspended");
        }
    }

    /// Lifts one suspension; the final resume pokes the packet source.
    pub fn continue_processing(&mut self) {
        if self.state.continue_processing() == SuspendTransition::Edge {
            info!("processing continued");
            if let Some(ps) = self.registry.get_packet_source() {
                ps.continue_after_suspend();
            }
        }
    }

    /// Applies the script-assignable globals back onto the run state.
    fn sync_script_globals(&mut self) {
        if let Some(Value::Bool(true)) = self.globals.get("terminating") {
            if !self.state.terminating {
                self.terminate_loop("script requested termination");
            }
        }
        if let Some(Value::Double(factor)) = self.globals.get("pseudo_realtime") {
            if factor >= 0.0 {
                self.state.pseudo_realtime = factor;
            }
        }
    }

    /// Mirrors the run state into the script-visible globals.
    pub(crate) fn publish_globals(&self) {
        let clock = &self.state.clock;
        self.globals.set(
            "network_time",
            Value::Double(clock.now_ns() as f64 / NS_PER_SEC as f64),
        );
        self.globals.set(
            "processing_start_time",
            Value::Double(clock.processing_start_ns() as f64 / NS_PER_SEC as f64),
        );
        self.globals
            .set("reading_live", Value::Bool(self.state.reading_live));
        self.globals
            .set("reading_traces", Value::Bool(self.state.reading_traces));
        self.globals.set(
            "pseudo_realtime",
            Value::Double(self.state.pseudo_realtime),
        );
        self.globals
            .set("terminating", Value::Bool(self.state.terminating));
        self.globals
            .set("is_parsing", Value::Bool(self.state.is_parsing));
    }
}

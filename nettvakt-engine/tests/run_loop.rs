//! End-to-end scenarios for the run loop: trace replay monotonicity,
//! timer ordering, clean termination and suspension bookkeeping.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use bytes::Bytes;

use nettvakt_capture::source::{IoSource, PacketSource, PollContext, Recv, SourceStats};
use nettvakt_capture::{CaptureError, Packet};
use nettvakt_config::NettvaktConfig;
use nettvakt_core::events::{EventHandler, EventManager};
use nettvakt_core::script::Value;
use nettvakt_core::time::NS_PER_SEC;
use nettvakt_core::timers::CallbackTimer;
use nettvakt_engine::{PacketEventSessions, Runtime};
use nettvakt_telemetry::MetricsRecorder;

fn secs(s: f64) -> u64 {
    (s * NS_PER_SEC as f64) as u64
}

fn packet(ts_secs: f64) -> Packet {
    Packet::new(secs(ts_secs), 1, Bytes::from_static(b"payload"))
}

fn test_runtime() -> Runtime {
    Runtime::new(
        NettvaktConfig::default(),
        Box::new(PacketEventSessions::new()),
        MetricsRecorder::new(),
    )
}

/// Packet source replaying a fixed list of timestamps, one per poll.
struct ScriptedSource {
    packets: VecDeque<Packet>,
    open: bool,
    resumed: Rc<Cell<u32>>,
}

impl ScriptedSource {
    fn new(timestamps: &[f64]) -> Self {
        Self {
            packets: timestamps.iter().map(|t| packet(*t)).collect(),
            open: true,
            resumed: Rc::new(Cell::new(0)),
        }
    }

    fn resumed_counter(&self) -> Rc<Cell<u32>> {
        Rc::clone(&self.resumed)
    }
}

impl IoSource for ScriptedSource {
    fn tag(&self) -> &str {
        "scripted"
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn is_ready(&mut self, _ctx: PollContext) -> bool {
        self.open && !self.packets.is_empty()
    }

    fn process(&mut self, _events: &mut EventManager) -> Result<(), CaptureError> {
        Ok(())
    }

    fn is_packet_source(&self) -> bool {
        true
    }

    fn as_packet_source(&mut self) -> Option<&mut dyn PacketSource> {
        Some(self)
    }
}

impl PacketSource for ScriptedSource {
    fn is_live(&self) -> bool {
        false
    }

    fn path(&self) -> &str {
        "scripted://trace"
    }

    fn link_type(&self) -> u32 {
        1
    }

    fn recv(&mut self) -> Result<Recv, CaptureError> {
        match self.packets.pop_front() {
            Some(pkt) => {
                if self.packets.is_empty() {
                    self.open = false;
                }
                Ok(Recv::Packet(pkt))
            }
            None => {
                self.open = false;
                Ok(Recv::Eof)
            }
        }
    }

    fn statistics(&mut self) -> SourceStats {
        SourceStats::default()
    }

    fn continue_after_suspend(&mut self) {
        self.resumed.set(self.resumed.get() + 1);
    }
}

#[test]
fn trace_replay_is_monotonic_and_fires_init_once() {
    let sessions = PacketEventSessions::new();
    let raw_packet = sessions.raw_packet_handler();

    let mut runtime = Runtime::new(
        NettvaktConfig::default(),
        Box::new(sessions),
        MetricsRecorder::new(),
    );
    runtime.state.reading_traces = true;

    let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    {
        let log = Rc::clone(&log);
        runtime
            .network_time_init_handler()
            .subscribe(Rc::new(move |_mgr, args| {
                let origin = match args.first() {
                    Some(Value::Double(t)) => *t,
                    _ => f64::NAN,
                };
                log.borrow_mut().push(format!("init {origin}"));
                Ok(())
            }));
    }
    {
        let log = Rc::clone(&log);
        raw_packet.subscribe(Rc::new(move |_mgr, args| {
            let ts = match args.first() {
                Some(Value::Double(t)) => *t,
                _ => f64::NAN,
            };
            log.borrow_mut().push(format!("pkt {ts}"));
            Ok(())
        }));
    }

    let observed: Rc<RefCell<Vec<u64>>> = Rc::new(RefCell::new(Vec::new()));
    {
        let observed = Rc::clone(&observed);
        runtime
            .state
            .clock
            .register_time_hook(Box::new(move |t| observed.borrow_mut().push(t)));
    }

    runtime
        .registry
        .register(Box::new(ScriptedSource::new(&[1.0, 1.5, 1.5, 3.0])));
    runtime.run_loop();

    // One dispatch per packet, the time origin fixed by the first.
    let log = log.borrow();
    assert_eq!(log.iter().filter(|l| l.starts_with("pkt")).count(), 4);
    assert_eq!(log.iter().filter(|l| l.starts_with("init")).count(), 1);
    assert_eq!(log[0], "init 1", "init must fire before any handler: {log:?}");

    // Network time observed every advance, never decreasing.
    let observed = observed.borrow();
    assert!(observed.windows(2).all(|w| w[0] <= w[1]), "{observed:?}");

    assert!(runtime.state.clock.now_ns() >= secs(3.0));
    assert_eq!(runtime.state.clock.start_network_time_ns(), secs(1.0));
    assert_eq!(runtime.metrics().packets_dispatched.get() as u64, 4);
}

#[test]
fn timers_due_before_a_packet_fire_before_its_events() {
    let sessions = PacketEventSessions::new();
    let raw_packet = sessions.raw_packet_handler();

    let mut runtime = Runtime::new(
        NettvaktConfig::default(),
        Box::new(sessions),
        MetricsRecorder::new(),
    );
    runtime.state.reading_traces = true;

    let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    {
        let log = Rc::clone(&log);
        raw_packet.subscribe(Rc::new(move |_mgr, args| {
            let ts = match args.first() {
                Some(Value::Double(t)) => *t,
                _ => f64::NAN,
            };
            log.borrow_mut().push(format!("pkt {ts}"));
            Ok(())
        }));
    }

    // A timer due at network time 2.0, between the two packets.
    let fired = EventHandler::new("timer_fired");
    {
        let log = Rc::clone(&log);
        fired.subscribe(Rc::new(move |_mgr, _args| {
            log.borrow_mut().push("timer".into());
            Ok(())
        }));
    }
    runtime.timers.schedule(
        secs(2.0),
        Box::new(CallbackTimer::new("test-deadline", move |_now, events| {
            events.enqueue(fired, vec![]);
        })),
    );

    runtime
        .registry
        .register(Box::new(ScriptedSource::new(&[1.0, 3.0])));
    runtime.run_loop();

    let log = log.borrow();
    let timer_at = log.iter().position(|l| l == "timer").expect("timer fired");
    let pkt3_at = log.iter().position(|l| l == "pkt 3").expect("packet handled");
    assert!(
        timer_at < pkt3_at,
        "timer must fire before the 3.0 packet's events: {log:?}"
    );
    assert_eq!(runtime.metrics().timers_expired.get() as u64, 1);
}

#[test]
fn terminating_with_exit_only_after_terminate_stops_the_loop() {
    let mut config = NettvaktConfig::default();
    config.scheduler.exit_only_after_terminate = true;

    let mut runtime = Runtime::new(
        config,
        Box::new(PacketEventSessions::new()),
        MetricsRecorder::new(),
    );

    runtime.terminate_loop("test shutdown");
    runtime.run_loop();

    assert!(runtime.state.terminating);
    assert!(runtime.final_stats_taken());
}

#[test]
fn idle_state_is_reset_between_dispatches() {
    let mut runtime = test_runtime();

    let pkt = packet(4.2);
    runtime.dispatch_packet(&pkt, None);

    assert_eq!(runtime.state.clock.processing_start_ns(), 0);
    assert_eq!(runtime.state.current_dispatched, 0);
    assert_eq!(runtime.state.current_timestamp_ns, 0);
    assert_eq!(runtime.current_iosrc(), None);
}

#[test]
fn direct_dispatch_keeps_network_time_monotonic() {
    let mut runtime = test_runtime();

    let stamps = [1.0, 1.25, 1.25, 2.0, 2.0, 2.5, 7.75];
    let mut last = 0;
    for ts in stamps {
        let pkt = packet(ts);
        runtime.dispatch_packet(&pkt, None);
        let now = runtime.state.clock.now_ns();
        assert!(now >= secs(ts));
        assert!(now >= last);
        last = now;
    }
}

#[tracing_test::traced_test]
#[test]
fn nested_suspension_pokes_the_source_once() {
    let mut runtime = test_runtime();

    let source = ScriptedSource::new(&[1.0]);
    let resumed = source.resumed_counter();
    runtime.registry.register(Box::new(source));

    runtime.suspend_processing();
    runtime.suspend_processing();
    runtime.suspend_processing();
    assert!(runtime.state.is_processing_suspended());

    runtime.continue_processing();
    runtime.continue_processing();
    assert_eq!(resumed.get(), 0, "nested resumes must not poke the source");

    runtime.continue_processing();
    assert!(!runtime.state.is_processing_suspended());
    assert_eq!(resumed.get(), 1);

    assert!(logs_contain("processing suspended"));
    assert!(logs_contain("processing continued"));
}

#[test]
fn suspension_holds_back_packet_sources() {
    let mut runtime = test_runtime();
    runtime.registry.register(Box::new(ScriptedSource::new(&[1.0])));

    let suspended = PollContext {
        now_wall_ns: 0,
        pseudo_realtime: 0.0,
        suspended: true,
    };
    assert!(runtime.registry.find_ready(suspended).is_empty());

    let resumed = PollContext {
        suspended: false,
        ..suspended
    };
    assert_eq!(runtime.registry.find_ready(resumed).len(), 1);
}

#[test]
fn pseudo_realtime_clears_once_no_packet_source_remains() {
    let mut config = NettvaktConfig::default();
    config.capture.pseudo_realtime = 2.0;

    let mut runtime = Runtime::new(
        config,
        Box::new(PacketEventSessions::new()),
        MetricsRecorder::new(),
    );
    runtime.state.reading_traces = true;

    runtime
        .registry
        .register(Box::new(ScriptedSource::new(&[1.0])));
    runtime.run_loop();

    assert_eq!(runtime.state.pseudo_realtime, 0.0);
    assert_eq!(
        runtime.globals.get("pseudo_realtime"),
        Some(Value::Double(0.0))
    );
}

#[test]
fn globals_mirror_run_state() {
    let mut runtime = test_runtime();
    runtime.state.reading_traces = true;

    runtime
        .registry
        .register(Box::new(ScriptedSource::new(&[2.0])));
    runtime.run_loop();

    assert_eq!(
        runtime.globals.get("network_time"),
        Some(Value::Double(
            runtime.state.clock.now_ns() as f64 / NS_PER_SEC as f64
        ))
    );
    assert_eq!(
        runtime.globals.get("reading_traces"),
        Some(Value::Bool(true))
    );
    assert_eq!(
        runtime.globals.get("processing_start_time"),
        Some(Value::Double(0.0))
    );
}

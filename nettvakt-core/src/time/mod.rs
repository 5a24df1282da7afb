//! Virtual network time.
//!
//! The monitor's time axis is defined by the timestamps of observed
//! packets, not by the wall clock. [`NetworkClock`] keeps that axis in
//! an atomic nanosecond counter so the watchdog signal handler can read
//! it without locking; [`RunState`] bundles the clock with the run-mode
//! flags and per-packet bookkeeping that the rest of the loop threads
//! through explicitly.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub const NS_PER_SEC: u64 = 1_000_000_000;

/// Current wall-clock time as nanoseconds since the epoch.
pub fn wall_clock_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Splits a nanosecond timestamp into integer seconds and microseconds.
///
/// The watchdog handler may only perform integer formatting, so every
/// place that reports a timestamp uses this split rather than floating
/// point division.
pub fn split_ns(ts_ns: u64) -> (u64, u64) {
    (ts_ns / NS_PER_SEC, (ts_ns % NS_PER_SEC) / 1_000)
}

type TimeHook = Box<dyn Fn(u64)>;

/// Monotonically non-decreasing virtual clock driven by packet
/// timestamps (or the wall clock when no input is live).
///
/// Handles share the underlying counters, so a clone given to the
/// watchdog bridge observes every store made by the run loop.
#[derive(Clone)]
pub struct NetworkClock {
    network_time: Arc<AtomicU64>,
    processing_start: Arc<AtomicU64>,
    start_network_time: Arc<AtomicU64>,
    start_time: u64,
    hooks: Rc<RefCell<Vec<TimeHook>>>,
}

impl NetworkClock {
    pub fn new() -> Self {
        Self {
            network_time: Arc::new(AtomicU64::new(0)),
            processing_start: Arc::new(AtomicU64::new(0)),
            start_network_time: Arc::new(AtomicU64::new(0)),
            start_time: wall_clock_ns(),
            hooks: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Current network time in nanoseconds.
    #[inline]
    pub fn now_ns(&self) -> u64 {
        self.network_time.load(Ordering::Acquire)
    }

    /// Advances network time and fires the registered time hooks.
    ///
    /// Callers must ensure `new_time_ns >= now_ns()`; the run loop
    /// clamps against the timer manager before calling.
    pub fn update_network_time(&self, new_time_ns: u64) {
        self.network_time.store(new_time_ns, Ordering::Release);
        for hook in self.hooks.borrow().iter() {
            hook(new_time_ns);
        }
    }

    /// Registers an observer fired on every time advance.
    pub fn register_time_hook(&self, hook: TimeHook) {
        self.hooks.borrow_mut().push(hook);
    }

    /// Timestamp of the packet currently being handled; 0 when idle.
    #[inline]
    pub fn processing_start_ns(&self) -> u64 {
        self.processing_start.load(Ordering::Acquire)
    }

    pub fn set_processing_start(&self, t_ns: u64) {
        self.processing_start.store(t_ns, Ordering::Release);
    }

    pub fn clear_processing_start(&self) {
        self.processing_start.store(0, Ordering::Release);
    }

    /// Records the timestamp of the first packet ever seen. Returns
    /// true exactly once, on the call that performed the store.
    pub fn mark_first_packet(&self, t_ns: u64) -> bool {
        self.start_network_time
            .compare_exchange(0, t_ns, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Timestamp of the first packet, or 0 if none seen yet.
    pub fn start_network_time_ns(&self) -> u64 {
        self.start_network_time.load(Ordering::Acquire)
    }

    /// Wall-clock time the process started.
    pub fn start_time_ns(&self) -> u64 {
        self.start_time
    }
}

impl Default for NetworkClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Mode flags and per-packet bookkeeping threaded through the run loop.
///
/// `reading_live` / `reading_traces` are fixed at init; the rest is
/// transient loop state. Scripts may assign `pseudo_realtime` and
/// `terminating`; everything else is read-only from their side.
pub struct RunState {
    pub clock: NetworkClock,

    pub reading_live: bool,
    pub reading_traces: bool,

    /// Trace pacing factor; 0 disables pacing. Cleared mid-run once no
    /// open packet source remains.
    pub pseudo_realtime: f64,

    pub terminating: bool,
    pub is_parsing: bool,
    pub have_pending_timers: bool,

    /// Timers + events charged to the packet currently in flight.
    pub current_dispatched: u32,

    /// Timestamp of the packet currently in flight, 0 when idle.
    pub current_timestamp_ns: u64,

    suspended: u32,
}

/// Result of a suspension counter transition.
#[derive(Debug, PartialEq, Eq)]
pub enum SuspendTransition {
    /// The counter crossed 0; the caller should report it.
    Edge,
    /// Nested change with no observable effect.
    Nested,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            clock: NetworkClock::new(),
            reading_live: false,
            reading_traces: false,
            pseudo_realtime: 0.0,
            terminating: false,
            is_parsing: false,
            have_pending_timers: false,
            current_dispatched: 0,
            current_timestamp_ns: 0,
            suspended: 0,
        }
    }

    /// Increments the suspension counter.
    pub fn suspend_processing(&mut self) -> SuspendTransition {
        self.suspended += 1;
        if self.suspended == 1 {
            SuspendTransition::Edge
        } else {
            SuspendTransition::Nested
        }
    }

    /// Decrements the suspension counter. The final resume is reported
    /// as an edge so the caller can poke the packet source.
    pub fn continue_processing(&mut self) -> SuspendTransition {
        assert!(self.suspended > 0, "continue_processing without matching suspend");
        self.suspended -= 1;
        if self.suspended == 0 {
            SuspendTransition::Edge
        } else {
            SuspendTransition::Nested
        }
    }

    pub fn is_processing_suspended(&self) -> bool {
        self.suspended != 0
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn network_time_starts_at_zero() {
        let clock = NetworkClock::new();
        assert_eq!(clock.now_ns(), 0);
    }

    #[test]
    fn update_fires_hooks() {
        let clock = NetworkClock::new();
        let seen = Rc::new(Cell::new(0u64));
        let seen_hook = Rc::clone(&seen);
        clock.register_time_hook(Box::new(move |t| seen_hook.set(t)));

        clock.update_network_time(1_500_000_000);
        assert_eq!(clock.now_ns(), 1_500_000_000);
        assert_eq!(seen.get(), 1_500_000_000);
    }

    #[test]
    fn first_packet_recorded_once() {
        let clock = NetworkClock::new();
        assert!(clock.mark_first_packet(42));
        assert!(!clock.mark_first_packet(99));
        assert_eq!(clock.start_network_time_ns(), 42);
    }

    #[test]
    fn clones_share_counters() {
        let clock = NetworkClock::new();
        let other = clock.clone();
        clock.set_processing_start(7);
        assert_eq!(other.processing_start_ns(), 7);
        clock.clear_processing_start();
        assert_eq!(other.processing_start_ns(), 0);
    }

    #[test]
    fn split_ns_breaks_out_micros() {
        let (secs, usecs) = split_ns(5_000_123_000);
        assert_eq!(secs, 5);
        assert_eq!(usecs, 123);
    }

    #[test]
    fn nested_suspension_reports_single_edges() {
        let mut state = RunState::new();

        assert_eq!(state.suspend_processing(), SuspendTransition::Edge);
        assert_eq!(state.suspend_processing(), SuspendTransition::Nested);
        assert_eq!(state.suspend_processing(), SuspendTransition::Nested);
        assert!(state.is_processing_suspended());

        assert_eq!(state.continue_processing(), SuspendTransition::Nested);
        assert_eq!(state.continue_processing(), SuspendTransition::Nested);
        assert_eq!(state.continue_processing(), SuspendTransition::Edge);
        assert!(!state.is_processing_suspended());
    }

    #[test]
    #[should_panic(expected = "without matching suspend")]
    fn unbalanced_continue_panics() {
        let mut state = RunState::new();
        state.continue_processing();
    }
}

//! Deadline scheduler over network time.
//!
//! Timers live in a min-heap keyed by `(deadline, insertion order)` so
//! same-deadline timers fire in the order they were scheduled.
//! [`TimerManager::advance`] fires due timers up to a budget; the run
//! loop uses the budget to bound how much time-driven work is charged
//! to a single packet.

use std::cmp::Ordering as CmpOrdering;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use tracing::trace;

use crate::events::EventManager;

/// A scheduled piece of work. Dispatch consumes the timer; timers that
/// need to repeat enqueue an event that reschedules them.
pub trait Timer {
    /// Short tag used in logs.
    fn kind(&self) -> &'static str;

    /// Runs the timer. `now_ns` is the network time the expiry is
    /// charged to, which may be later than the deadline.
    fn dispatch(self: Box<Self>, now_ns: u64, events: &mut EventManager);
}

/// Adapter so plain closures can be scheduled.
pub struct CallbackTimer<F>
where
    F: FnOnce(u64, &mut EventManager),
{
    kind: &'static str,
    callback: F,
}

impl<F> CallbackTimer<F>
where
    F: FnOnce(u64, &mut EventManager),
{
    pub fn new(kind: &'static str, callback: F) -> Self {
        Self { kind, callback }
    }
}

impl<F> Timer for CallbackTimer<F>
where
    F: FnOnce(u64, &mut EventManager),
{
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn dispatch(self: Box<Self>, now_ns: u64, events: &mut EventManager) {
        (self.callback)(now_ns, events);
    }
}

struct Entry {
    deadline_ns: u64,
    seq: u64,
    timer: Box<dyn Timer>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline_ns == other.deadline_ns && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.deadline_ns, self.seq).cmp(&(other.deadline_ns, other.seq))
    }
}

/// Min-heap of deadlines in network time.
#[derive(Default)]
pub struct TimerManager {
    heap: BinaryHeap<Reverse<Entry>>,
    time_ns: u64,
    next_seq: u64,
}

impl TimerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The manager's notion of now: the most recent `advance` target.
    pub fn time_ns(&self) -> u64 {
        self.time_ns
    }

    pub fn schedule(&mut self, deadline_ns: u64, timer: Box<dyn Timer>) {
        trace!(kind = timer.kind(), deadline_ns, "schedule timer");
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Entry {
            deadline_ns,
            seq,
            timer,
        }));
    }

    /// Fires timers with deadlines `<= now_ns`, at most `budget` of
    /// them, in deadline order. Returns the number dispatched.
    pub fn advance(&mut self, now_ns: u64, budget: u32, events: &mut EventManager) -> u32 {
        if now_ns > self.time_ns {
            self.time_ns = now_ns;
        }

        let mut dispatched = 0u32;
        while dispatched < budget {
            let due = matches!(self.heap.peek(), Some(Reverse(entry)) if entry.deadline_ns <= now_ns);
            if !due {
                break;
            }

            let Some(Reverse(entry)) = self.heap.pop() else {
                break;
            };
            trace!(kind = entry.timer.kind(), deadline_ns = entry.deadline_ns, "expire timer");
            entry.timer.dispatch(now_ns, events);
            dispatched += 1;
        }

        dispatched
    }

    pub fn size(&self) -> usize {
        self.heap.len()
    }

    /// Earliest pending deadline, if any.
    pub fn next_deadline_ns(&self) -> Option<u64> {
        self.heap.peek().map(|Reverse(entry)| entry.deadline_ns)
    }
}

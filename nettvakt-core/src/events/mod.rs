//! Event queue with drain-to-quiescence semantics.
//!
//! Scheduled handler invocations form a FIFO. [`EventManager::drain`]
//! runs queued entries to completion, including entries enqueued by the
//! handlers themselves, so a packet's event cascade always settles
//! before the next packet is read. A failing callback is reported and
//! skipped; one bad handler does not stop the loop.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::{debug, error, trace};

use crate::error::CoreError;
use crate::script::Value;

/// Callback registered on an [`EventHandler`]. Callbacks may enqueue
/// further events through the manager they are handed.
pub type Callback = Rc<dyn Fn(&mut EventManager, &[Value]) -> Result<(), CoreError>>;

/// A named event with a list of subscribed callbacks.
pub struct EventHandler {
    name: Rc<str>,
    callbacks: RefCell<Vec<Callback>>,
}

impl EventHandler {
    pub fn new(name: &str) -> Rc<Self> {
        Rc::new(Self {
            name: Rc::from(name),
            callbacks: RefCell::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscribe(&self, callback: Callback) {
        self.callbacks.borrow_mut().push(callback);
    }

    /// Whether anything is listening; enqueueing to a handler with no
    /// subscribers is a no-op at drain time.
    pub fn has_subscribers(&self) -> bool {
        !self.callbacks.borrow().is_empty()
    }
}

struct QueuedEvent {
    handler: Rc<EventHandler>,
    args: Vec<Value>,
}

/// FIFO of scheduled handler invocations.
#[derive(Default)]
pub struct EventManager {
    queue: VecDeque<QueuedEvent>,
    drained_total: u64,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules an invocation of `handler` with `args`.
    pub fn enqueue(&mut self, handler: Rc<EventHandler>, args: Vec<Value>) {
        trace!(event = handler.name(), "enqueue");
        self.queue.push_back(QueuedEvent { handler, args });
    }

    /// Runs the queue to empty. Events enqueued while draining are
    /// themselves drained before this returns.
    ///
    /// Returns the number of events run.
    pub fn drain(&mut self) -> u64 {
        let mut drained = 0u64;

        while let Some(entry) = self.queue.pop_front() {
            drained += 1;

            // Snapshot the callback list so handlers may subscribe or
            // enqueue while we iterate.
            let callbacks: Vec<Callback> = entry.handler.callbacks.borrow().clone();
            for callback in callbacks {
                if let Err(e) = callback(self, &entry.args) {
                    error!(event = entry.handler.name(), error = %e, "event handler failed");
                }
            }
        }

        if drained > 0 {
            debug!(drained, "event queue drained");
        }
        self.drained_total += drained;
        drained
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Total events run over the life of the manager.
    pub fn drained_total(&self) -> u64 {
        self.drained_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn counting_handler(name: &str, log: &Rc<RefCell<Vec<String>>>) -> Rc<EventHandler> {
        let handler = EventHandler::new(name);
        let log = Rc::clone(log);
        let tag = name.to_string();
        handler.subscribe(Rc::new(move |_mgr, _args| {
            log.borrow_mut().push(tag.clone());
            Ok(())
        }));
        handler
    }

    #[test]
    fn drains_in_fifo_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = counting_handler("a", &log);
        let b = counting_handler("b", &log);

        let mut mgr = EventManager::new();
        mgr.enqueue(Rc::clone(&a), vec![]);
        mgr.enqueue(Rc::clone(&b), vec![]);
        mgr.enqueue(a, vec![]);

        assert_eq!(mgr.drain(), 3);
        assert_eq!(*log.borrow(), vec!["a", "b", "a"]);
        assert!(mgr.is_empty());
    }

    #[test]
    fn events_enqueued_mid_drain_are_drained() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let inner = counting_handler("inner", &log);

        let outer = EventHandler::new("outer");
        {
            let log = Rc::clone(&log);
            let inner = Rc::clone(&inner);
            outer.subscribe(Rc::new(move |mgr, _args| {
                log.borrow_mut().push("outer".into());
                mgr.enqueue(Rc::clone(&inner), vec![]);
                Ok(())
            }));
        }

        let mut mgr = EventManager::new();
        mgr.enqueue(outer, vec![]);
        assert_eq!(mgr.drain(), 2);
        assert_eq!(*log.borrow(), vec!["outer", "inner"]);
    }

    #[test]
    fn failing_callback_does_not_stop_drain() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let bad = EventHandler::new("bad");
        bad.subscribe(Rc::new(|_mgr, _args| {
            Err(CoreError::handler("bad", "deliberate failure"))
        }));
        let good = counting_handler("good", &log);

        let mut mgr = EventManager::new();
        mgr.enqueue(bad, vec![]);
        mgr.enqueue(good, vec![]);

        assert_eq!(mgr.drain(), 2);
        assert_eq!(*log.borrow(), vec!["good"]);
    }

    #[test]
    fn args_reach_callbacks() {
        let seen = Rc::new(RefCell::new(None));
        let handler = EventHandler::new("args");
        {
            let seen = Rc::clone(&seen);
            handler.subscribe(Rc::new(move |_mgr, args| {
                *seen.borrow_mut() = Some(args.to_vec());
                Ok(())
            }));
        }

        let mut mgr = EventManager::new();
        mgr.enqueue(handler, vec![Value::Int(7), Value::Bool(true)]);
        mgr.drain();

        assert_eq!(
            seen.borrow().as_deref(),
            Some(&[Value::Int(7), Value::Bool(true)][..])
        );
    }
}

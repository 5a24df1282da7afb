//! Suspended conditions awaiting resolution.
//!
//! A trigger owns the delayed activation it will resume; the frame
//! holds only a weak back-reference (see [`super::Frame::set_trigger`]),
//! so trigger/frame cycles cannot leak.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::frame::Frame;

pub struct Trigger {
    name: Rc<str>,
    resolved: Cell<bool>,
    delayed_frame: RefCell<Option<Rc<Frame>>>,
}

impl Trigger {
    pub fn new(name: &str) -> Rc<Self> {
        Rc::new(Self {
            name: Rc::from(name),
            resolved: Cell::new(false),
            delayed_frame: RefCell::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Takes ownership of a delayed activation until resolution.
    pub fn hold(&self, frame: Rc<Frame>) {
        frame.set_delayed();
        *self.delayed_frame.borrow_mut() = Some(frame);
    }

    /// Resolves the condition, releasing the delayed activation to the
    /// caller so its deferred return can run.
    pub fn resolve(&self) -> Option<Rc<Frame>> {
        self.resolved.set(true);
        self.delayed_frame.borrow_mut().take()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.get()
    }
}

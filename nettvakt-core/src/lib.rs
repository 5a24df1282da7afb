//! # nettvakt-core
//!
//! Foundation layer for the packet-driven execution core: the virtual
//! network clock and run-state flags, the timer scheduler, the event
//! queue, and the script frame subsystem backing function activations.
//!
//! The core is single-threaded and cooperative; the only state shared
//! with another execution context are the clock atomics read by the
//! watchdog signal handler.
//!
//! ### Key submodules:
//! - `time`: `NetworkClock` using atomic counters, plus `RunState`
//! - `timers`: deadline min-heap with budgeted expiry
//! - `events`: FIFO handler queue with drain-to-quiescence semantics
//! - `script`: values, identifiers, frames and closure frames

pub mod error;
pub mod events;
pub mod script;
pub mod time;
pub mod timers;

pub use error::CoreError;

pub mod prelude {
    pub use crate::events::{EventHandler, EventManager};
    pub use crate::script::{ClosureFrame, Frame, FrameHandle, FuncInfo, Ident, Value};
    pub use crate::time::{NetworkClock, RunState};
    pub use crate::timers::{Timer, TimerManager};
}

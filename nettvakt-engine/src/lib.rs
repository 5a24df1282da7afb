//! # nettvakt-engine
//!
//! The packet-driven execution core: a single-threaded cooperative run
//! loop that multiplexes packet and I/O sources, advances the virtual
//! clock from packet timestamps, drains timers and events in timestamp
//! order, and guards forward progress with a SIGALRM watchdog.

pub mod error;
pub mod runtime;
pub mod sessions;
pub mod signal;
pub mod watchdog;

pub use error::EngineError;
pub use runtime::{CommStatus, Runtime};
pub use sessions::{PacketEventSessions, SessionLayer};

pub mod prelude {
    pub use crate::error::EngineError;
    pub use crate::runtime::{CommStatus, Runtime};
    pub use crate::sessions::{PacketEventSessions, SessionLayer};
}

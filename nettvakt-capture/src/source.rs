//! I/O source interfaces consumed by the run loop.

use nettvakt_core::events::EventManager;

use crate::error::CaptureError;
use crate::packet::Packet;

/// Snapshot of the loop state a readiness poll may depend on.
#[derive(Debug, Clone, Copy)]
pub struct PollContext {
    /// Wall clock at poll time, nanoseconds since the epoch.
    pub now_wall_ns: u64,

    /// Trace pacing factor; 0 disables pacing.
    pub pseudo_realtime: f64,

    /// Packet sources are held back while processing is suspended.
    pub suspended: bool,
}

/// Counters a packet source reports at shutdown.
#[derive(Debug, Default, Clone, Copy)]
pub struct SourceStats {
    pub received: u64,
    pub dropped: u64,
}

/// Outcome of a single packet-source read.
#[derive(Debug)]
pub enum Recv {
    /// A packet arrived.
    Packet(Packet),

    /// Nothing arrived inside the source's poll window.
    Timeout,

    /// The source is exhausted and has closed itself.
    Eof,
}

/// Options applied when opening a packet source.
#[derive(Debug, Clone, Copy)]
pub struct SourceOptions {
    pub snaplen: u32,
    pub promiscuous: bool,
    pub buffer_size: u32,
    pub timeout_ms: i32,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            snaplen: 65_535,
            promiscuous: true,
            buffer_size: 2 * 1024 * 1024,
            timeout_ms: 1_000,
        }
    }
}

/// A polled readiness source multiplexed by the run loop.
pub trait IoSource {
    /// Short tag naming the source in logs.
    fn tag(&self) -> &str;

    fn is_open(&self) -> bool;

    /// Whether the loop should service this source now.
    fn is_ready(&mut self, ctx: PollContext) -> bool;

    /// Services a non-packet source; implementations typically enqueue
    /// events. Packet sources are serviced through
    /// [`IoSource::as_packet_source`] instead.
    fn process(&mut self, events: &mut EventManager) -> Result<(), CaptureError>;

    fn is_packet_source(&self) -> bool {
        false
    }

    fn as_packet_source(&mut self) -> Option<&mut dyn PacketSource> {
        None
    }
}

/// The packet-delivering refinement of [`IoSource`].
pub trait PacketSource {
    fn is_live(&self) -> bool;

    /// Interface name or trace path.
    fn path(&self) -> &str;

    /// pcap DLT_* value for packets from this source.
    fn link_type(&self) -> u32;

    /// Reads one packet, if available within the poll window.
    fn recv(&mut self) -> Result<Recv, CaptureError>;

    fn statistics(&mut self) -> SourceStats;

    /// Called once when the final nested suspension is lifted.
    fn continue_after_suspend(&mut self) {}
}

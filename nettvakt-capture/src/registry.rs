//! The polled set of I/O sources multiplexed by the run loop.

use tracing::debug;

use crate::dumper::PacketDumper;
use crate::error::CaptureError;
use crate::pcap_source::{LivePcapSource, OfflinePcapSource};
use crate::source::{IoSource, PacketSource, PollContext, SourceOptions};

/// Registry of readiness sources. Sources that close themselves are
/// pruned on the next readiness poll.
#[derive(Default)]
pub struct IoSourceRegistry {
    sources: Vec<Box<dyn IoSource>>,
    lifetime_total: usize,
}

impl IoSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Box<dyn IoSource>) {
        debug!(tag = source.tag(), "registering I/O source");
        self.lifetime_total += 1;
        self.sources.push(source);
    }

    /// Opens a packet source over `spec` (interface name or trace
    /// path) and registers it.
    pub fn open_packet_source(
        &mut self,
        spec: &str,
        is_live: bool,
        opts: &SourceOptions,
    ) -> Result<(), CaptureError> {
        let source: Box<dyn IoSource> = if is_live {
            Box::new(LivePcapSource::open(spec, opts)?)
        } else {
            Box::new(OfflinePcapSource::open(spec)?)
        };
        self.register(source);
        Ok(())
    }

    /// Opens a dump file. Dumpers are owned by the caller, not the
    /// registry.
    pub fn open_packet_dumper(
        &self,
        path: &str,
        link_type: u32,
        append: bool,
    ) -> Result<PacketDumper, CaptureError> {
        PacketDumper::open(path, link_type, append)
    }

    /// Prunes closed sources, then returns the indices of the ready
    /// ones. Packet sources are never ready while processing is
    /// suspended.
    pub fn find_ready(&mut self, ctx: PollContext) -> Vec<usize> {
        self.sources.retain(|s| s.is_open());

        let mut ready = Vec::with_capacity(self.sources.len());
        for (idx, source) in self.sources.iter_mut().enumerate() {
            if ctx.suspended && source.is_packet_source() {
                continue;
            }
            if source.is_ready(ctx) {
                ready.push(idx);
            }
        }
        ready
    }

    /// Number of open sources.
    pub fn size(&self) -> usize {
        self.sources.iter().filter(|s| s.is_open()).count()
    }

    /// Number of sources ever registered.
    pub fn total_size(&self) -> usize {
        self.lifetime_total
    }

    pub fn source_mut(&mut self, idx: usize) -> Option<&mut (dyn IoSource + 'static)> {
        self.sources.get_mut(idx).map(|s| s.as_mut())
    }

    /// The first registered packet source, if any is still around.
    pub fn get_packet_source(&mut self) -> Option<&mut dyn PacketSource> {
        self.sources
            .iter_mut()
            .find(|s| s.is_packet_source())
            .and_then(|s| s.as_packet_source())
    }

    pub fn has_open_packet_source(&self) -> bool {
        self.sources
            .iter()
            .any(|s| s.is_packet_source() && s.is_open())
    }
}

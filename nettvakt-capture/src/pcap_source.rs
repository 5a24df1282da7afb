//! Packet sources backed by `pcap`: live devices and recorded traces.

use pcap::{Active, Capture, Device, Offline};
use tracing::{debug, info, warn};

use nettvakt_core::events::EventManager;

use crate::error::CaptureError;
use crate::packet::Packet;
use crate::source::{IoSource, PacketSource, PollContext, Recv, SourceOptions, SourceStats};

/// Live capture on a network device.
pub struct LivePcapSource {
    cap: Option<Capture<Active>>,
    iface: String,
    link_type: u32,
    received: u64,
}

impl LivePcapSource {
    /// Opens `iface` in the configured mode. The capture timeout keeps
    /// reads from blocking the loop indefinitely when the wire is
    /// quiet.
    pub fn open(iface: &str, opts: &SourceOptions) -> Result<Self, CaptureError> {
        let device = Device::list()
            .map_err(|e| CaptureError::interface(iface, e))?
            .into_iter()
            .find(|d| d.name == iface)
            .ok_or_else(|| CaptureError::DeviceNotFound(iface.to_string()))?;

        let cap = Capture::from_device(device)
            .map_err(|e| CaptureError::interface(iface, e))?
            .promisc(opts.promiscuous)
            .snaplen(opts.snaplen as i32)
            .buffer_size(opts.buffer_size as i32)
            .timeout(opts.timeout_ms)
            .open()
            .map_err(|e| CaptureError::interface(iface, e))?;

        let link_type = cap.get_datalink().0 as u32;
        info!(iface, link_type, "live capture opened");

        Ok(Self {
            cap: Some(cap),
            iface: iface.to_string(),
            link_type,
            received: 0,
        })
    }
}

impl IoSource for LivePcapSource {
    fn tag(&self) -> &str {
        "pcap-live"
    }

    fn is_open(&self) -> bool {
        self.cap.is_some()
    }

    fn is_ready(&mut self, _ctx: PollContext) -> bool {
        // Reads carry their own poll window; an open device is always
        // worth asking.
        self.is_open()
    }

    fn process(&mut self, _events: &mut EventManager) -> Result<(), CaptureError> {
        // Packet sources are serviced through recv().
        Ok(())
    }

    fn is_packet_source(&self) -> bool {
        true
    }

    fn as_packet_source(&mut self) -> Option<&mut dyn PacketSource> {
        Some(self)
    }
}

impl PacketSource for LivePcapSource {
    fn is_live(&self) -> bool {
        true
    }

    fn path(&self) -> &str {
        &self.iface
    }

    fn link_type(&self) -> u32 {
        self.link_type
    }

    fn recv(&mut self) -> Result<Recv, CaptureError> {
        let Some(cap) = self.cap.as_mut() else {
            return Ok(Recv::Eof);
        };

        // Copy out of the capture's lending buffer before acting on
        // the outcome.
        let link_type = self.link_type;
        let outcome = match cap.next_packet() {
            Ok(captured) => Ok(Packet::from_capture(captured.header, captured.data, link_type)),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(pkt) => {
                self.received += 1;
                Ok(Recv::Packet(pkt))
            }
            Err(pcap::Error::TimeoutExpired) => Ok(Recv::Timeout),
            Err(e) => {
                warn!(iface = %self.iface, error = %e, "live capture failed, closing source");
                self.cap = None;
                Err(CaptureError::Read(e))
            }
        }
    }

    fn statistics(&mut self) -> SourceStats {
        match self.cap.as_mut().map(|c| c.stats()) {
            Some(Ok(stats)) => SourceStats {
                received: stats.received as u64,
                dropped: (stats.dropped + stats.if_dropped) as u64,
            },
            _ => SourceStats {
                received: self.received,
                dropped: 0,
            },
        }
    }
}

/// Replay of a recorded trace, optionally paced toward wall-clock
/// cadence.
pub struct OfflinePcapSource {
    cap: Option<Capture<Offline>>,
    path: String,
    link_type: u32,
    received: u64,

    /// Read-ahead slot so pacing can inspect the next timestamp.
    pending: Option<Packet>,

    /// Timestamp of the first packet in the trace.
    first_ts_ns: Option<u64>,

    /// Wall clock when replay of the first packet began.
    wall_base_ns: Option<u64>,

    /// Pacing factor seen at the last readiness poll.
    pacing_factor: f64,
}

impl OfflinePcapSource {
    pub fn open(path: &str) -> Result<Self, CaptureError> {
        let cap = Capture::from_file(path).map_err(|e| CaptureError::trace(path, e))?;
        let link_type = cap.get_datalink().0 as u32;
        info!(path, link_type, "trace opened");

        Ok(Self {
            cap: Some(cap),
            path: path.to_string(),
            link_type,
            received: 0,
            pending: None,
            first_ts_ns: None,
            wall_base_ns: None,
            pacing_factor: 0.0,
        })
    }

    /// Fills the read-ahead slot. Closes the source at end of trace.
    fn fill_pending(&mut self) {
        if self.pending.is_some() {
            return;
        }

        let Some(cap) = self.cap.as_mut() else {
            return;
        };

        let link_type = self.link_type;
        let outcome = match cap.next_packet() {
            Ok(captured) => Ok(Packet::from_capture(captured.header, captured.data, link_type)),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(pkt) => self.pending = Some(pkt),
            Err(pcap::Error::NoMorePackets) => {
                debug!(path = %self.path, "end of trace");
                self.cap = None;
            }
            Err(e) => {
                warn!(path = %self.path, error = %e, "trace read failed, closing source");
                self.cap = None;
            }
        }
    }

    /// Wall-clock deadline for delivering `ts_ns` under `factor`.
    fn due_at(&self, ts_ns: u64, factor: f64) -> Option<u64> {
        let first = self.first_ts_ns?;
        let base = self.wall_base_ns?;
        Some(base + paced_gap_ns(first, ts_ns, factor))
    }
}

impl IoSource for OfflinePcapSource {
    fn tag(&self) -> &str {
        "pcap-file"
    }

    fn is_open(&self) -> bool {
        self.cap.is_some() || self.pending.is_some()
    }

    fn is_ready(&mut self, ctx: PollContext) -> bool {
        self.fill_pending();
        let Some(pending) = self.pending.as_ref() else {
            return false;
        };

        if ctx.pseudo_realtime <= 0.0 {
            return true;
        }
        self.pacing_factor = ctx.pseudo_realtime;

        // First packet anchors the pacing base.
        if self.first_ts_ns.is_none() {
            self.first_ts_ns = Some(pending.ts_ns);
            self.wall_base_ns = Some(ctx.now_wall_ns);
            return true;
        }

        match self.due_at(pending.ts_ns, ctx.pseudo_realtime) {
            Some(due) => ctx.now_wall_ns >= due,
            None => true,
        }
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

impl PacketSource for OfflinePcapSource {
    fn is_live(&self) -> bool {
        false
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn link_type(&self) -> u32 {
        self.link_type
    }

    fn recv(&mut self) -> Result<Recv, CaptureError> {
        self.fill_pending();
        match self.pending.take() {
            Some(pkt) => {
                self.received += 1;
                Ok(Recv::Packet(pkt))
            }
            None => Ok(Recv::Eof),
        }
    }

    fn statistics(&mut self) -> SourceStats {
        SourceStats {
            received: self.received,
            dropped: 0,
        }
    }

    fn continue_after_suspend(&mut self) {
        // Rebase pacing so the suspension gap is not replayed: the
        // pending packet becomes due immediately.
        if let (Some(pending), Some(first)) = (self.pending.as_ref(), self.first_ts_ns) {
            if self.pacing_factor > 0.0 {
                let gap = paced_gap_ns(first, pending.ts_ns, self.pacing_factor);
                self.wall_base_ns =
                    Some(nettvakt_core::time::wall_clock_ns().saturating_sub(gap));
            }
        }
        debug!(path = %self.path, "trace replay continuing after suspend");
    }
}

/// Nanosecond gap between two trace timestamps scaled by the pacing
/// factor.
pub fn paced_gap_ns(earlier_ns: u64, later_ns: u64, factor: f64) -> u64 {
    if factor <= 0.0 {
        return 0;
    }
    (later_ns.saturating_sub(earlier_ns) as f64 / factor) as u64
}

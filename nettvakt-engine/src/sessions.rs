//! Session layer seam.
//!
//! The real flow reassembler and protocol analyzers live behind this
//! trait; the run loop only needs "hand the packet over, it will
//! enqueue events". The default implementation turns each packet into
//! a `raw_packet` script event so the frame subsystem is exercised
//! end-to-end even without analyzers.

use std::rc::Rc;

use tracing::debug;

use nettvakt_capture::Packet;
use nettvakt_core::events::{EventHandler, EventManager};
use nettvakt_core::script::Value;
use nettvakt_core::time::NS_PER_SEC;

pub trait SessionLayer {
    /// Hands one packet to the session layer, which enqueues whatever
    /// events it derives from it.
    fn next_packet(&mut self, t_ns: u64, pkt: &Packet, events: &mut EventManager);

    /// Flushes buffered state into final events at shutdown.
    fn drain(&mut self, _events: &mut EventManager) {}

    /// Final teardown after the last drain.
    fn done(&mut self) {}
}

/// Default session layer: one `raw_packet(ts, caplen, link_type)`
/// event per packet.
pub struct PacketEventSessions {
    raw_packet: Rc<EventHandler>,
    packets: u64,
}

impl PacketEventSessions {
    pub fn new() -> Self {
        Self {
            raw_packet: EventHandler::new("raw_packet"),
            packets: 0,
        }
    }

    /// The `raw_packet` handler, exposed so scripts can subscribe.
    pub fn raw_packet_handler(&self) -> Rc<EventHandler> {
        Rc::clone(&self.raw_packet)
    }
}

impl Default for PacketEventSessions {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLayer for PacketEventSessions {
    fn next_packet(&mut self, t_ns: u64, pkt: &Packet, events: &mut EventManager) {
        self.packets += 1;
        events.enqueue(
            Rc::clone(&self.raw_packet),
            vec![
                Value::Double(t_ns as f64 / NS_PER_SEC as f64),
                Value::Int(pkt.caplen as i64),
                Value::Int(pkt.link_type as i64),
            ],
        );
    }

    fn done(&mut self) {
        debug!(packets = self.packets, "session layer finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::cell::RefCell;

    #[test]
    fn packets_become_raw_packet_events() {
        let mut sessions = PacketEventSessions::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        {
            let seen = Rc::clone(&seen);
            sessions.raw_packet_handler().subscribe(Rc::new(move |_mgr, args| {
                seen.borrow_mut().push(args.to_vec());
                Ok(())
            }));
        }

        let mut events = EventManager::new();
        let pkt = Packet::new(2_500_000_000, 1, Bytes::from_static(b"abc"));
        sessions.next_packet(pkt.ts_ns, &pkt, &mut events);
        events.drain();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0][0], Value::Double(2.5));
        assert_eq!(seen[0][1], Value::Int(3));
    }
}

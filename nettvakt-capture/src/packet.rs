//! The raw packet type handed through the dispatch path.

use bytes::Bytes;

use nettvakt_core::time::NS_PER_SEC;

/// A captured packet with its capture-time metadata.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Capture timestamp in nanoseconds since the epoch.
    pub ts_ns: u64,

    /// Bytes actually captured.
    pub caplen: u32,

    /// Original length on the wire.
    pub len: u32,

    /// Data-link type of the source (pcap DLT_* value).
    pub link_type: u32,

    /// Immutable payload buffer using zero-copy semantics.
    pub data: Bytes,
}

impl Packet {
    pub fn new(ts_ns: u64, link_type: u32, data: Bytes) -> Self {
        let len = data.len() as u32;
        Self {
            ts_ns,
            caplen: len,
            len,
            link_type,
            data,
        }
    }

    /// Converts a pcap record into an owned packet.
    pub fn from_capture(header: &pcap::PacketHeader, data: &[u8], link_type: u32) -> Self {
        let ts_ns = (header.ts.tv_sec as u64) * NS_PER_SEC + (header.ts.tv_usec as u64) * 1_000;
        Self {
            ts_ns,
            caplen: header.caplen,
            len: header.len,
            link_type,
            data: Bytes::copy_from_slice(data),
        }
    }
}

//! Packet dump files.

use pcap::{Capture, Linktype};
use tracing::info;

use nettvakt_core::time::NS_PER_SEC;

use crate::error::CaptureError;
use crate::packet::Packet;

/// Writes packets to a capture file in pcap format.
pub struct PacketDumper {
    savefile: pcap::Savefile,
    path: String,
    records: u64,
}

impl PacketDumper {
    pub fn open(path: &str, link_type: u32, append: bool) -> Result<Self, CaptureError> {
        let dead = Capture::dead(Linktype(link_type as i32))
            .map_err(|e| CaptureError::dumper(path, e))?;

        let savefile = if append {
            dead.savefile_append(path)
                .map_err(|e| CaptureError::dumper(path, e))?
        } else {
            dead.savefile(path).map_err(|e| CaptureError::dumper(path, e))?
        };

        info!(path, link_type, append, "packet dumper opened");
        Ok(Self {
            savefile,
            path: path.to_string(),
            records: 0,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    /// Appends one record preserving the packet's capture timestamp.
    pub fn dump(&mut self, pkt: &Packet) {
        let header = pcap::PacketHeader {
            ts: libc::timeval {
                tv_sec: (pkt.ts_ns / NS_PER_SEC) as libc::time_t,
                tv_usec: ((pkt.ts_ns % NS_PER_SEC) / 1_000) as libc::suseconds_t,
            },
            caplen: pkt.caplen,
            len: pkt.len,
        };
        self.savefile.write(&pcap::Packet::new(&header, &pkt.data));
        self.records += 1;
    }

    pub fn flush(&mut self) -> Result<(), CaptureError> {
        self.savefile.flush().map_err(CaptureError::Read)
    }
}

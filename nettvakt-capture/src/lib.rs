//! # nettvakt-capture
//!
//! Packet acquisition layer for the nettvakt monitor: a unified
//! [`PacketSource`] interface over live `pcap` devices and recorded
//! traces, dump-file writing, and the polled registry of I/O sources
//! the run loop multiplexes.

pub mod dumper;
pub mod error;
pub mod packet;
pub mod pcap_source;
pub mod registry;
pub mod source;

pub use dumper::PacketDumper;
pub use error::CaptureError;
pub use packet::Packet;
pub use registry::IoSourceRegistry;
pub use source::{IoSource, PacketSource, PollContext, Recv, SourceOptions, SourceStats};

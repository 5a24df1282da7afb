use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("problem with trace file {path} ({source})")]
    TraceOpen { path: String, source: pcap::Error },

    #[error("problem with interface {iface} ({source})")]
    InterfaceOpen { iface: String, source: pcap::Error },

    #[error("device '{0}' not found")]
    DeviceNotFound(String),

    #[error("problem opening dump file {path} ({source})")]
    DumperOpen { path: String, source: pcap::Error },

    #[error("capture read failed: {0}")]
    Read(#[from] pcap::Error),
}

impl CaptureError {
    pub fn trace(path: &str, source: pcap::Error) -> Self {
        CaptureError::TraceOpen {
            path: path.to_string(),
            source,
        }
    }

    pub fn interface(iface: &str, source: pcap::Error) -> Self {
        CaptureError::InterfaceOpen {
            iface: iface.to_string(),
            source,
        }
    }

    pub fn dumper(path: &str, source: pcap::Error) -> Self {
        CaptureError::DumperOpen {
            path: path.to_string(),
            source,
        }
    }
}

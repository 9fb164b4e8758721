//! Error types for the capture, protocol, and injector subsystems.
//!
//! Each subsystem gets its own small `thiserror` enum rather than one
//! catch-all type, since callers generally only care about failures within
//! the subsystem they're driving.

/// Errors from the raw-socket capture path.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("interface name must not be empty")]
    EmptyInterface,

    #[error("failed to create raw socket: {0}")]
    SocketCreate(#[source] std::io::Error),

    #[error("interface {0:?} not found")]
    InterfaceNotFound(String),

    #[error("failed to bind to interface {iface:?}: {source}")]
    Bind {
        iface: String,
        #[source]
        source: std::io::Error,
    },

    #[error("capture already running")]
    AlreadyRunning,

    #[error("capture not initialized")]
    NotInitialized,
}

/// Errors from loading and parsing protocol descriptors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("failed to read descriptor at {path:?}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse descriptor at {path:?}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed header key {0:?}, expected \"offset_length\"")]
    MalformedHeaderKey(String),
}

/// Errors from the raw-socket injector family.
#[derive(Debug, thiserror::Error)]
pub enum InjectorError {
    #[error("injector already initialized")]
    AlreadyInitialized,

    #[error("injector not initialized")]
    NotInitialized,

    #[error("interface name is required for this injector")]
    InterfaceRequired,

    #[error("interface {0:?} could not be resolved to an index")]
    InterfaceNotFound(String),

    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    #[error("interface {0:?} has no usable hardware address")]
    NoHardwareAddress(String),

    #[error("failed to create raw socket: {0}")]
    SocketCreate(#[source] std::io::Error),

    #[error("failed to bind socket to {iface:?}: {source}")]
    Bind {
        iface: String,
        #[source]
        source: std::io::Error,
    },

    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),
}

/// Errors from the PCAP append-only writer.
#[derive(Debug, thiserror::Error)]
pub enum PcapError {
    #[error("pcap file is not open")]
    NotOpen,

    #[error("refusing to write an invalid or empty frame")]
    InvalidFrame,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_error_messages() {
        assert_eq!(
            CaptureError::EmptyInterface.to_string(),
            "interface name must not be empty"
        );
        assert_eq!(
            CaptureError::InterfaceNotFound("eth9".into()).to_string(),
            "interface \"eth9\" not found"
        );
    }

    #[test]
    fn test_protocol_error_malformed_key() {
        let err = ProtocolError::MalformedHeaderKey("nope".into());
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_injector_error_variants_distinguishable() {
        assert_ne!(
            InjectorError::AlreadyInitialized.to_string(),
            InjectorError::NotInitialized.to_string()
        );
    }

    #[test]
    fn test_pcap_error_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let pcap_err: PcapError = io_err.into();
        assert!(pcap_err.to_string().contains("disk full"));
    }
}

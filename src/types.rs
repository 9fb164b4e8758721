//! Core data types shared across the capture, parsing, and injection
//! subsystems.

use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

use crate::config::MAX_PACKET_SIZE;

/// A single captured link-layer frame.
///
/// `bytes` is a fixed-capacity buffer; only the first `length` bytes are
/// meaningful. Frames are cheap to copy by value (a few KB), which keeps
/// ownership simple across the ring buffer's producer/consumer boundary.
/// `timestamp` is wall-clock (not monotonic), since the PCAP writer needs
/// an epoch-relative `ts_sec`/`ts_usec` pair for each record.
#[derive(Clone)]
pub struct RawFrame {
    bytes: [u8; MAX_PACKET_SIZE],
    length: usize,
    pub timestamp: SystemTime,
    pub valid: bool,
}

impl RawFrame {
    /// An empty, invalid placeholder frame (used to pre-fill the ring).
    pub fn empty() -> Self {
        Self {
            bytes: [0u8; MAX_PACKET_SIZE],
            length: 0,
            timestamp: SystemTime::now(),
            valid: false,
        }
    }

    /// Builds a frame from a captured slice, truncating to `MAX_PACKET_SIZE`.
    pub fn from_slice(data: &[u8]) -> Self {
        let mut bytes = [0u8; MAX_PACKET_SIZE];
        let length = data.len().min(MAX_PACKET_SIZE);
        bytes[..length].copy_from_slice(&data[..length]);
        Self {
            bytes,
            length,
            timestamp: SystemTime::now(),
            valid: length > 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.length]
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }
}

impl fmt::Display for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawFrame {{ length: {}, valid: {}, bytes: ", self.length, self.valid)?;
        for b in self.as_bytes() {
            write!(f, "{b:02x}")?;
        }
        write!(f, " }}")
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFrame")
            .field("length", &self.length)
            .field("valid", &self.valid)
            .finish_non_exhaustive()
    }
}

/// One decoded protocol layer: the descriptor file that produced it, plus
/// every extracted field keyed by `"relOffset_bitLen_absBitOffset"`.
#[derive(Debug, Clone, Default)]
pub struct ParsedLayer {
    pub source_file: String,
    pub fields: HashMap<String, u64>,
}

impl ParsedLayer {
    pub fn new(source_file: impl Into<String>) -> Self {
        Self {
            source_file: source_file.into(),
            fields: HashMap::new(),
        }
    }
}

/// An ordered sequence of decoded layers, outermost first.
#[derive(Debug, Clone, Default)]
pub struct ParsedPacket {
    pub layers: Vec<ParsedLayer>,
}

impl ParsedPacket {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    pub fn push_layer(&mut self, layer: ParsedLayer) {
        self.layers.push(layer);
    }
}

/// Minimal device bookkeeping record: a MAC/IP pair associated with an
/// interface. No persistence is attached to this type; it is a plain data
/// holder for callers that want to track interface identity alongside a
/// capture or injector session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceRecord {
    mac: String,
    ip: String,
}

impl DeviceRecord {
    pub fn new(mac: impl Into<String>, ip: impl Into<String>) -> Self {
        Self { mac: mac.into(), ip: ip.into() }
    }

    pub fn mac(&self) -> &str {
        &self.mac
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn set_mac(&mut self, mac: impl Into<String>) {
        self.mac = mac.into();
    }

    pub fn set_ip(&mut self, ip: impl Into<String>) {
        self.ip = ip.into();
    }
}

impl fmt::Display for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceRecord {{ mac: {}, ip: {} }}", self.mac, self.ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_slice_truncates_to_capacity() {
        let data = vec![0xABu8; MAX_PACKET_SIZE + 500];
        let frame = RawFrame::from_slice(&data);
        assert_eq!(frame.len(), MAX_PACKET_SIZE);
        assert!(frame.valid);
    }

    #[test]
    fn test_empty_slice_is_invalid() {
        let frame = RawFrame::from_slice(&[]);
        assert_eq!(frame.len(), 0);
        assert!(!frame.valid);
    }

    #[test]
    fn test_as_bytes_returns_only_used_prefix() {
        let frame = RawFrame::from_slice(&[1, 2, 3]);
        assert_eq!(frame.as_bytes(), &[1, 2, 3]);
        assert_eq!(frame.capacity(), MAX_PACKET_SIZE);
    }

    #[test]
    fn test_device_record_accessors() {
        let mut dev = DeviceRecord::new("aa:bb:cc:dd:ee:ff", "192.168.1.1");
        assert_eq!(dev.mac(), "aa:bb:cc:dd:ee:ff");
        dev.set_ip("10.0.0.1");
        assert_eq!(dev.ip(), "10.0.0.1");
        assert!(dev.to_string().contains("10.0.0.1"));
    }

    #[test]
    fn test_parsed_packet_push_layer() {
        let mut packet = ParsedPacket::new();
        let mut layer = ParsedLayer::new("./eth.json");
        layer.fields.insert("0_48_0".into(), 0xFFFFFFFFFFFF);
        packet.push_layer(layer);
        assert_eq!(packet.layers.len(), 1);
        assert_eq!(packet.layers[0].source_file, "./eth.json");
    }
}

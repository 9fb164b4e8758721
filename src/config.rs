//! Centralized runtime constants.
//!
//! All tunable sizes and intervals are collected here so they can be found and
//! adjusted in a single place rather than scattered across modules.

/// Number of slots in the SPSC capture ring.
pub const RING_SIZE: usize = 128;

/// Maximum frame size the capture pipeline will store (supports jumbo frames).
pub const MAX_PACKET_SIZE: usize = 9000;

/// How long the processing worker blocks waiting for new ring data before
/// re-checking the stop flag.
pub const CONSUMER_WAIT_TIMEOUT_MS: u64 = 100;

/// Sleep interval between retries when a non-blocking `recv` returns
/// `EAGAIN`/`EWOULDBLOCK`.
pub const RECV_RETRY_SLEEP_US: u64 = 100;

/// Hard bound on protocol-descent depth, guarding against cyclic descriptor
/// graphs (e.g. tunneling loops) that would otherwise pin the processing
/// thread in an unbounded loop.
pub const MAX_DESCENT_DEPTH: usize = 32;

/// Size in bytes of the PCAP global file header.
pub const PCAP_GLOBAL_HEADER_SIZE: usize = 24;

/// Size in bytes of a single PCAP per-packet record header.
pub const PCAP_PACKET_HEADER_SIZE: usize = 12;

/// PCAP magic number identifying microsecond-resolution, host-endian files.
pub const PCAP_MAGIC: u32 = 0xa1b2_c3d4;

/// PCAP format major/minor version written to the global header.
pub const PCAP_VERSION_MAJOR: u16 = 2;
pub const PCAP_VERSION_MINOR: u16 = 4;

/// Maximum length captured per packet, written to the PCAP global header.
pub const PCAP_SNAPLEN: u32 = 65535;

/// Link-layer type written to the PCAP global header (1 = Ethernet).
pub const PCAP_LINKTYPE_ETHERNET: u32 = 1;

//! Append-only PCAP file writer.
//!
//! Single-threaded, minimal: a fixed 24-byte global header followed by
//! one 12-byte record header plus payload per captured frame. No reader
//! is provided — this crate only ever produces PCAP files, it never
//! consumes them.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::config::{
    PCAP_GLOBAL_HEADER_SIZE, PCAP_LINKTYPE_ETHERNET, PCAP_MAGIC, PCAP_SNAPLEN,
    PCAP_VERSION_MAJOR, PCAP_VERSION_MINOR,
};
use crate::error::PcapError;
use crate::types::RawFrame;

/// Writes frames to a `.pcap` file in host byte order, one global header
/// followed by a stream of per-packet records.
pub struct PcapWriter {
    file: Option<BufWriter<File>>,
}

impl PcapWriter {
    pub fn new() -> Self {
        Self { file: None }
    }

    /// Creates (or truncates) `path` and writes the 24-byte global header.
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<(), PcapError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        write_global_header(&mut writer)?;
        self.file = Some(writer);
        Ok(())
    }

    /// Appends one packet record: a 12-byte header (`ts_sec`, `ts_usec`,
    /// `incl_len`) followed by `incl_len` bytes, then flushes. Rejects the
    /// write (without touching the file) if the writer isn't open or the
    /// frame is invalid/empty.
    pub fn write_packet(&mut self, frame: &RawFrame) -> Result<(), PcapError> {
        if !frame.valid || frame.len() == 0 {
            return Err(PcapError::InvalidFrame);
        }
        let writer = self.file.as_mut().ok_or(PcapError::NotOpen)?;

        let since_epoch = frame
            .timestamp
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let ts_sec = since_epoch.as_secs() as u32;
        let ts_usec = since_epoch.subsec_micros();
        let incl_len = frame.len() as u32;

        writer.write_all(&ts_sec.to_ne_bytes())?;
        writer.write_all(&ts_usec.to_ne_bytes())?;
        writer.write_all(&incl_len.to_ne_bytes())?;
        writer.write_all(frame.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Drops the underlying file handle, flushing any buffered bytes.
    pub fn close(&mut self) {
        if let Some(mut writer) = self.file.take() {
            let _ = writer.flush();
        }
    }
}

impl Default for PcapWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PcapWriter {
    fn drop(&mut self) {
        self.close();
    }
}

fn write_global_header(writer: &mut impl Write) -> io::Result<()> {
    writer.write_all(&PCAP_MAGIC.to_ne_bytes())?;
    writer.write_all(&PCAP_VERSION_MAJOR.to_ne_bytes())?;
    writer.write_all(&PCAP_VERSION_MINOR.to_ne_bytes())?;
    writer.write_all(&0i32.to_ne_bytes())?; // thiszone
    writer.write_all(&0u32.to_ne_bytes())?; // sigfigs
    writer.write_all(&PCAP_SNAPLEN.to_ne_bytes())?;
    writer.write_all(&PCAP_LINKTYPE_ETHERNET.to_ne_bytes())?;
    debug_assert_eq!(4 + 2 + 2 + 4 + 4 + 4 + 4, PCAP_GLOBAL_HEADER_SIZE);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_write_packet_before_open_rejected() {
        let mut writer = PcapWriter::new();
        let frame = RawFrame::from_slice(&[1, 2, 3]);
        assert!(matches!(writer.write_packet(&frame), Err(PcapError::NotOpen)));
    }

    #[test]
    fn test_write_packet_rejects_invalid_frame() {
        let dir = std::env::temp_dir().join(format!("pcap_test_invalid_{}", std::process::id()));
        let mut writer = PcapWriter::new();
        writer.open(&dir).unwrap();
        let mut frame = RawFrame::from_slice(&[1, 2, 3]);
        frame.valid = false;
        assert!(matches!(writer.write_packet(&frame), Err(PcapError::InvalidFrame)));
        writer.close();
        let _ = std::fs::remove_file(&dir);
    }

    #[test]
    fn test_open_writes_24_byte_global_header() {
        let dir = std::env::temp_dir().join(format!("pcap_test_header_{}", std::process::id()));
        let mut writer = PcapWriter::new();
        writer.open(&dir).unwrap();
        writer.close();

        let mut contents = Vec::new();
        File::open(&dir).unwrap().read_to_end(&mut contents).unwrap();
        assert_eq!(contents.len(), PCAP_GLOBAL_HEADER_SIZE);
        let magic = u32::from_ne_bytes(contents[0..4].try_into().unwrap());
        assert_eq!(magic, PCAP_MAGIC);
        let _ = std::fs::remove_file(&dir);
    }

    #[test]
    fn test_write_packet_round_trips_length_and_bytes() {
        let dir = std::env::temp_dir().join(format!("pcap_test_roundtrip_{}", std::process::id()));
        let mut writer = PcapWriter::new();
        writer.open(&dir).unwrap();
        let frame = RawFrame::from_slice(&[0xAA, 0xBB, 0xCC, 0xDD]);
        writer.write_packet(&frame).unwrap();
        writer.close();

        let mut contents = Vec::new();
        File::open(&dir).unwrap().read_to_end(&mut contents).unwrap();
        assert_eq!(contents.len(), PCAP_GLOBAL_HEADER_SIZE + 12 + 4);
        let incl_len = u32::from_ne_bytes(
            contents[PCAP_GLOBAL_HEADER_SIZE + 8..PCAP_GLOBAL_HEADER_SIZE + 12]
                .try_into()
                .unwrap(),
        );
        assert_eq!(incl_len, 4);
        assert_eq!(&contents[PCAP_GLOBAL_HEADER_SIZE + 12..], &[0xAA, 0xBB, 0xCC, 0xDD]);
        let _ = std::fs::remove_file(&dir);
    }
}

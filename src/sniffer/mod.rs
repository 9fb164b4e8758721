//! Orchestrates capture, the ring buffer, and parsing into a two-thread
//! producer/consumer pipeline, delivering decoded packets to a caller's
//! callback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::buffer::RingBuffer;
use crate::capture::PacketCapture;
use crate::config::CONSUMER_WAIT_TIMEOUT_MS;
use crate::error::CaptureError;
use crate::parser::Parser;
use crate::types::{ParsedPacket, RawFrame};

/// Receives each decoded packet as it comes off the processing thread.
/// Implementors must not block indefinitely: a stalled sink stalls the
/// whole pipeline, since delivery happens inline on the processing thread.
pub trait PacketSink: Send {
    fn on_packet(&mut self, frame: &RawFrame, packet: &ParsedPacket);
}

impl<F: FnMut(&RawFrame, &ParsedPacket) + Send> PacketSink for F {
    fn on_packet(&mut self, frame: &RawFrame, packet: &ParsedPacket) {
        self(frame, packet)
    }
}

type BoxedSink = Box<dyn PacketSink>;

/// Drives one interface's capture → parse → deliver pipeline.
pub struct NetworkSniffer {
    ring: Arc<RingBuffer>,
    parser: Arc<Mutex<Option<Box<dyn Parser + Send>>>>,
    sink: Arc<Mutex<Option<BoxedSink>>>,
    capture: Arc<Mutex<Option<Arc<PacketCapture>>>>,
    is_running: Arc<AtomicBool>,
    should_stop: Arc<AtomicBool>,
    capture_handle: Option<JoinHandle<()>>,
    processing_handle: Option<JoinHandle<()>>,
}

impl NetworkSniffer {
    pub fn new() -> Self {
        Self {
            ring: Arc::new(RingBuffer::new()),
            parser: Arc::new(Mutex::new(None)),
            sink: Arc::new(Mutex::new(None)),
            capture: Arc::new(Mutex::new(None)),
            is_running: Arc::new(AtomicBool::new(false)),
            should_stop: Arc::new(AtomicBool::new(false)),
            capture_handle: None,
            processing_handle: None,
        }
    }

    /// Installs the decoding strategy. Rejected while sniffing is active.
    pub fn set_parser(&self, parser: Box<dyn Parser + Send>) -> bool {
        if self.is_running.load(Ordering::Acquire) {
            warn!("refusing to swap parser while sniffing is active");
            return false;
        }
        *self.parser.lock().unwrap_or_else(|e| e.into_inner()) = Some(parser);
        true
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Starts sniffing on `interface`, delivering decoded packets to
    /// `sink`. The processing thread is spawned before the capture thread
    /// so a frame is never handed to the ring before a consumer exists to
    /// drain it.
    pub fn start(&mut self, interface: &str, sink: BoxedSink) -> Result<(), CaptureError> {
        if self.is_running.load(Ordering::Acquire) {
            return Err(CaptureError::AlreadyRunning);
        }
        if self.parser.lock().unwrap_or_else(|e| e.into_inner()).is_none() {
            return Err(CaptureError::NotInitialized);
        }

        let capture = Arc::new(PacketCapture::new(interface));
        capture.initialize()?;

        *self.sink.lock().unwrap_or_else(|e| e.into_inner()) = Some(sink);
        *self.capture.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&capture));
        self.should_stop.store(false, Ordering::Release);
        self.is_running.store(true, Ordering::Release);

        let processing_handle = {
            let ring = Arc::clone(&self.ring);
            let parser = Arc::clone(&self.parser);
            let sink = Arc::clone(&self.sink);
            let should_stop = Arc::clone(&self.should_stop);
            thread::Builder::new()
                .name("sniffer-processing".into())
                .spawn(move || processing_loop(ring, parser, sink, should_stop))
                .expect("failed to spawn processing thread")
        };

        let capture_handle = {
            let ring = Arc::clone(&self.ring);
            let should_stop = Arc::clone(&self.should_stop);
            let capture = Arc::clone(&capture);
            thread::Builder::new()
                .name("sniffer-capture".into())
                .spawn(move || capture_loop(capture, ring, should_stop))
                .expect("failed to spawn capture thread")
        };

        self.capture_handle = Some(capture_handle);
        self.processing_handle = Some(processing_handle);
        info!(interface, "sniffing started");
        Ok(())
    }

    /// Stops sniffing. Idempotent: calling this when not running is a
    /// no-op. Joins the capture thread before the processing thread, since
    /// closing the socket is what unblocks the capture thread's `recv`.
    pub fn stop(&mut self) {
        if !self.is_running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.should_stop.store(true, Ordering::Release);

        if let Some(capture) = self.capture.lock().unwrap_or_else(|e| e.into_inner()).take() {
            capture.stop();
        }
        self.ring.notify_consumer();

        if let Some(handle) = self.capture_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.processing_handle.take() {
            let _ = handle.join();
        }
        *self.sink.lock().unwrap_or_else(|e| e.into_inner()) = None;
        debug!("sniffing stopped");
    }
}

impl Default for NetworkSniffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NetworkSniffer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(capture: Arc<PacketCapture>, ring: Arc<RingBuffer>, should_stop: Arc<AtomicBool>) {
    capture.start_capture(|data| {
        if should_stop.load(Ordering::Acquire) {
            return;
        }
        ring.push(RawFrame::from_slice(data));
    });
}

fn processing_loop(
    ring: Arc<RingBuffer>,
    parser: Arc<Mutex<Option<Box<dyn Parser + Send>>>>,
    sink: Arc<Mutex<Option<BoxedSink>>>,
    should_stop: Arc<AtomicBool>,
) {
    loop {
        match ring.pop() {
            Some(frame) => deliver(&frame, &parser, &sink),
            None => {
                if should_stop.load(Ordering::Acquire) {
                    break;
                }
                ring.wait_for_data(Duration::from_millis(CONSUMER_WAIT_TIMEOUT_MS));
            }
        }
    }

    // Drain whatever arrived between the should_stop check and the
    // capture thread actually being torn down.
    while let Some(frame) = ring.pop() {
        deliver(&frame, &parser, &sink);
    }
}

fn deliver(
    frame: &RawFrame,
    parser: &Arc<Mutex<Option<Box<dyn Parser + Send>>>>,
    sink: &Arc<Mutex<Option<BoxedSink>>>,
) {
    let packet = {
        let mut guard = parser.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_mut() {
            Some(p) => p.parse_packet(frame),
            None => return,
        }
    };

    // Take the sink out from behind the lock, invoke it with no lock held
    // (so a slow or reentrant callback can't block a concurrent
    // set_parser/stop), then put it back.
    let mut taken = match sink.lock().unwrap_or_else(|e| e.into_inner()).take() {
        Some(s) => s,
        None => return,
    };
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        taken.on_packet(frame, &packet);
    }));
    if let Err(payload) = result {
        warn!(?payload, "packet sink panicked; continuing");
    }
    *sink.lock().unwrap_or_else(|e| e.into_inner()) = Some(taken);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    struct StubParser;
    impl Parser for StubParser {
        fn parse_packet(&mut self, _frame: &RawFrame) -> ParsedPacket {
            ParsedPacket::new()
        }
        fn set_protocol_entry_file(&mut self, _path: String) {}
    }

    #[test]
    fn test_start_without_parser_is_rejected() {
        let mut sniffer = NetworkSniffer::new();
        let result = sniffer.start("lo", Box::new(|_: &RawFrame, _: &ParsedPacket| {}));
        assert!(matches!(result, Err(CaptureError::NotInitialized)));
    }

    #[test]
    fn test_stop_without_start_is_idempotent() {
        let mut sniffer = NetworkSniffer::new();
        sniffer.stop();
        sniffer.stop();
        assert!(!sniffer.is_running());
    }

    #[test]
    fn test_set_parser_accepted_when_not_running() {
        let sniffer = NetworkSniffer::new();
        assert!(sniffer.set_parser(Box::new(StubParser)));
    }
}

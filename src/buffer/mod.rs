//! Bounded single-producer/single-consumer frame queue.
//!
//! A full ring overwrites its oldest entry rather than rejecting the push,
//! so the capture thread never blocks on a slow consumer. The condvar is
//! used purely to wake a waiting consumer; all slot and index state lives
//! behind the same mutex, which keeps the implementation safe without
//! hand-rolled atomic index bookkeeping.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::config::RING_SIZE;
use crate::types::RawFrame;

struct RingInner {
    slots: VecDeque<RawFrame>,
}

/// Fixed-capacity frame ring shared between a capture producer and a
/// processing consumer.
pub struct RingBuffer {
    capacity: usize,
    inner: Mutex<RingInner>,
    not_empty: Condvar,
}

impl RingBuffer {
    pub fn new() -> Self {
        Self::with_capacity(RING_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(RingInner { slots: VecDeque::with_capacity(capacity) }),
            not_empty: Condvar::new(),
        }
    }

    /// Pushes a frame, overwriting the oldest entry when the ring is full.
    /// Returns `false` only if the frame itself is oversized.
    pub fn push(&self, frame: RawFrame) -> bool {
        if frame.len() > frame.capacity() {
            return false;
        }
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.slots.len() == self.capacity {
            inner.slots.pop_front();
        }
        inner.slots.push_back(frame);
        drop(inner);
        self.not_empty.notify_one();
        true
    }

    /// Pops the oldest frame, if any. A frame marked `valid = false` is
    /// treated as absent.
    pub fn pop(&self) -> Option<RawFrame> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.slots.pop_front() {
            Some(frame) if frame.valid => Some(frame),
            _ => None,
        }
    }

    /// Blocks the caller until a frame is available or `timeout` elapses.
    pub fn wait_for_data(&self, timeout: Duration) {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let _ = self
            .not_empty
            .wait_timeout_while(inner, timeout, |i| i.slots.is_empty())
            .unwrap_or_else(|e| e.into_inner());
    }

    /// Wakes any consumer blocked in `wait_for_data`, used at shutdown.
    pub fn notify_consumer(&self) {
        self.not_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(byte: u8) -> RawFrame {
        RawFrame::from_slice(&[byte])
    }

    #[test]
    fn test_push_pop_preserves_fifo_order() {
        let ring = RingBuffer::with_capacity(4);
        ring.push(frame(1));
        ring.push(frame(2));
        ring.push(frame(3));
        assert_eq!(ring.pop().unwrap().as_bytes(), &[1]);
        assert_eq!(ring.pop().unwrap().as_bytes(), &[2]);
        assert_eq!(ring.pop().unwrap().as_bytes(), &[3]);
        assert!(ring.pop().is_none());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let ring = RingBuffer::with_capacity(128);
        for i in 0..200u16 {
            ring.push(frame((i % 256) as u8));
        }
        assert_eq!(ring.len(), 128);
        // the oldest 72 pushes (0..72) were evicted; 73..200 remain.
        let first = ring.pop().unwrap();
        assert_eq!(first.as_bytes(), &[(72u16 % 256) as u8]);
    }

    #[test]
    fn test_empty_ring_pop_is_none() {
        let ring = RingBuffer::with_capacity(8);
        assert!(ring.pop().is_none());
    }

    #[test]
    fn test_wait_for_data_returns_after_push() {
        use std::sync::Arc;
        use std::thread;
        use std::time::Duration;

        let ring = Arc::new(RingBuffer::with_capacity(8));
        let producer = Arc::clone(&ring);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.push(frame(42));
        });
        ring.wait_for_data(Duration::from_secs(1));
        handle.join().unwrap();
        assert_eq!(ring.pop().unwrap().as_bytes(), &[42]);
    }

    #[test]
    fn test_invalid_frame_pops_as_empty() {
        let ring = RingBuffer::with_capacity(4);
        let mut invalid = frame(7);
        invalid.valid = false;
        ring.push(invalid);
        assert!(ring.pop().is_none());
    }
}

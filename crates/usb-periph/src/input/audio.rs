use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

use crate::error::BackendError;

/// Non-blocking source of captured PCM.
///
/// Samples are signed 16-bit and interleaved by channel (stereo: L0, R0, L1, R1, ...).
pub trait AudioCapture: Send {
    /// Copies up to `out.len()` queued samples into `out` and returns how many were copied.
    fn read_samples(&mut self, out: &mut [i16]) -> usize;

    /// Samples currently queued.
    fn available(&self) -> usize;
}

/// Bounded sample ring shared between a capture thread and a microphone adapter.
///
/// Clones share the same ring. When the ring is full the oldest samples are overwritten.
#[derive(Debug, Clone)]
pub struct CaptureBuffer {
    inner: Arc<Mutex<VecDeque<i16>>>,
    capacity: usize,
}

impl CaptureBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&self, samples: &[i16]) {
        let mut ring = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let overflow = (ring.len() + samples.len()).saturating_sub(self.capacity);
        if overflow > 0 {
            trace!(overflow, "capture ring full, overwriting oldest samples");
            let from_ring = overflow.min(ring.len());
            ring.drain(..from_ring);
        }
        let skip = samples.len().saturating_sub(self.capacity);
        ring.extend(&samples[skip..]);
    }

    pub fn clear(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl AudioCapture for CaptureBuffer {
    fn read_samples(&mut self, out: &mut [i16]) -> usize {
        let mut ring = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let n = out.len().min(ring.len());
        for (dst, src) in out.iter_mut().zip(ring.drain(..n)) {
            *dst = src;
        }
        n
    }

    fn available(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Opens capture devices by name.
pub trait CaptureDevices {
    fn open(&self, name: &str) -> Result<Box<dyn AudioCapture>, BackendError>;
}

/// In-process capture devices, each backed by a [`CaptureBuffer`].
#[derive(Debug, Default)]
pub struct CaptureDeviceTable {
    devices: HashMap<String, CaptureBuffer>,
}

impl CaptureDeviceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` and returns the ring the producer side writes into.
    pub fn register(&mut self, name: &str, capacity: usize) -> CaptureBuffer {
        let ring = CaptureBuffer::new(capacity);
        self.devices.insert(name.to_owned(), ring.clone());
        ring
    }
}

impl CaptureDevices for CaptureDeviceTable {
    fn open(&self, name: &str) -> Result<Box<dyn AudioCapture>, BackendError> {
        match self.devices.get(name) {
            Some(ring) => Ok(Box::new(ring.clone())),
            None => Err(BackendError::CaptureUnavailable {
                name: name.to_owned(),
            }),
        }
    }
}

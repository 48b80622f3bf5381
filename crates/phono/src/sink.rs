//! PCM output abstraction and the bounded byte queue behind it.
//!
//! The engine loop writes quantized s16le bytes through [`PcmSink`]; the
//! production sink (see `device.rs`) parks them in a [`SharedPcm`] queue that
//! the CPAL callback drains without blocking. Sink writes block while the
//! queue is full, which bounds the engine loop's suspension to device
//! buffering latency.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::error::PlayError;

/// Stream parameters for one output session.
#[derive(Clone, Copy, Debug)]
pub struct SinkSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub bytes_per_sample: u16,
}

impl SinkSpec {
    /// Stereo s16le at the given rate, the only layout the engine produces.
    pub fn stereo_s16(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 2,
            bytes_per_sample: 2,
        }
    }
}

/// A PCM byte sink for one playback session.
///
/// Writes carry interleaved s16le stereo frames (4 bytes per frame).
pub trait PcmSink {
    /// Write bytes to the device, blocking while its buffer is full.
    ///
    /// Returns the number of bytes accepted.
    fn write(&mut self, bytes: &[u8]) -> Result<usize, PlayError>;

    /// Block until buffered audio has been handed to the device.
    ///
    /// Called once on natural end of stream so the tail is not clipped.
    fn drain(&mut self);
}

/// Factory for per-session sinks. Owned by the engine for its lifetime.
pub trait AudioOutput: Send + Sync {
    fn open(&self, spec: SinkSpec) -> Result<Box<dyn PcmSink>, PlayError>;
}

/// Bounded byte queue between sink writes and the output callback.
///
/// - Writers block while the queue is full, unless it has been closed.
/// - The callback pops non-blocking and fills silence on underrun.
/// - `close()` is idempotent and wakes all waiters; a closed queue stops
///   accepting data but can still be drained.
///
/// Bytes are stored as whole stereo frames (4-byte groups) so the callback
/// never observes a torn frame.
pub struct SharedPcm {
    inner: Mutex<PcmInner>,
    cv: Condvar,
    max_buffered_bytes: usize,
}

struct PcmInner {
    queue: VecDeque<u8>,
    done: bool,
}

impl SharedPcm {
    /// Create a queue bounded to `max_buffered_bytes` (rounded down to whole
    /// frames).
    pub fn new(max_buffered_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(PcmInner {
                queue: VecDeque::new(),
                done: false,
            }),
            cv: Condvar::new(),
            max_buffered_bytes: (max_buffered_bytes & !3).max(4),
        }
    }

    /// Push bytes, blocking while the queue is full.
    ///
    /// Returns the number of bytes accepted; short only when the queue is
    /// closed mid-write.
    pub fn push_blocking(&self, bytes: &[u8]) -> usize {
        let mut offset = 0;

        while offset < bytes.len() {
            let mut g = self.inner.lock().unwrap();

            while g.queue.len() >= self.max_buffered_bytes && !g.done {
                g = self.cv.wait(g).unwrap();
            }
            if g.done {
                return offset;
            }

            let mut pushed_any = false;
            while offset < bytes.len() && g.queue.len() < self.max_buffered_bytes {
                g.queue.push_back(bytes[offset]);
                offset += 1;
                pushed_any = true;
            }

            drop(g);
            if pushed_any {
                self.cv.notify_all();
            }
        }
        offset
    }

    /// Pop up to `max_bytes` (whole frames only), or `None` if empty.
    pub fn pop_nonblocking(&self, max_bytes: usize) -> Option<Vec<u8>> {
        let mut g = self.inner.lock().unwrap();

        let take = g.queue.len().min(max_bytes) & !3;
        if take == 0 {
            return None;
        }

        let mut out = Vec::with_capacity(take);
        for _ in 0..take {
            out.push(g.queue.pop_front().unwrap_or(0));
        }

        drop(g);
        self.cv.notify_all();
        Some(out)
    }

    /// Mark the queue as finished and wake all waiters. Idempotent.
    pub fn close(&self) {
        let mut g = self.inner.lock().unwrap();
        g.done = true;
        drop(g);
        self.cv.notify_all();
    }

    /// Whether the queue has been closed by either side.
    pub fn is_done(&self) -> bool {
        let g = self.inner.lock().unwrap();
        g.done
    }

    /// Current buffered bytes (best-effort snapshot).
    pub fn len_bytes(&self) -> usize {
        let g = self.inner.lock().unwrap();
        g.queue.len()
    }

    /// Block until the queue is empty or `timeout` elapses.
    ///
    /// Returns `true` if the queue drained.
    pub fn wait_empty(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut g = self.inner.lock().unwrap();
        while !g.queue.is_empty() {
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            let (ng, _) = self.cv.wait_timeout(g, deadline - now).unwrap();
            g = ng;
        }
        true
    }
}

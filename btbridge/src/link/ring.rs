//! Receive ring buffer between the byte-arrival callback and `poll()`.

use {
    crate::error::{Error, Result},
    log::warn,
    std::sync::{Arc, Mutex, PoisonError},
};

/// Fixed-capacity circular byte buffer. Writes never overrun unread data.
#[derive(Debug)]
pub struct RingBuffer {
    buf: Box<[u8]>,
    read: usize,
    len: usize,
}

impl RingBuffer {
    /// Create a buffer holding up to `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity].into_boxed_slice(),
            read: 0,
            len: 0,
        }
    }

    /// Total capacity.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Unread bytes.
    pub fn available(&self) -> usize {
        self.len
    }

    /// Free space.
    pub fn free(&self) -> usize {
        self.capacity() - self.len
    }

    /// Append as much of `bytes` as fits; returns the count stored.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.free());
        let cap = self.capacity();
        let mut write = (self.read + self.len) % cap.max(1);
        for &b in &bytes[..n] {
            self.buf[write] = b;
            write = (write + 1) % cap;
        }
        self.len += n;
        n
    }

    /// Move up to `out.len()` unread bytes into `out`.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.len);
        let cap = self.capacity();
        for slot in &mut out[..n] {
            *slot = self.buf[self.read];
            self.read = (self.read + 1) % cap;
        }
        self.len -= n;
        n
    }

    /// Append every unread byte to `out`; returns the count moved.
    pub fn drain(&mut self, out: &mut Vec<u8>) -> usize {
        let n = self.len;
        let start = out.len();
        out.resize(start + n, 0);
        self.read(&mut out[start..])
    }
}

/// Shared producer handle to a [`RingBuffer`].
///
/// Cloned into whatever delivers received bytes (an RX thread, an interrupt
/// shim, a test double).
#[derive(Debug, Clone)]
pub struct RxSink {
    ring: Arc<Mutex<RingBuffer>>,
}

impl RxSink {
    /// Wrap a ring buffer.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Arc::new(Mutex::new(RingBuffer::new(capacity))),
        }
    }

    /// Push received bytes. A short write is reported as an overrun; the
    /// bytes that fit are kept.
    pub fn on_bytes_received(&self, bytes: &[u8]) -> Result<()> {
        let stored = self.lock().write(bytes);
        if stored < bytes.len() {
            let dropped = bytes.len() - stored;
            warn!("RX overrun, dropped {dropped} bytes");
            return Err(Error::Overrun { dropped });
        }
        Ok(())
    }

    /// Unread bytes.
    pub fn available(&self) -> usize {
        self.lock().available()
    }

    /// Drain every unread byte into `out`.
    pub fn drain(&self, out: &mut Vec<u8>) -> usize {
        self.lock().drain(out)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RingBuffer> {
        self.ring
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

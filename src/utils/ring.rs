use crate::error::{FlowError, Result};

/// Fixed-capacity byte accumulator used by every packetizer.
///
/// Storage is twice the capacity so that buffered bytes always form one
/// contiguous slice: instead of wrapping, the live region is slid back to
/// the front once the write cursor would run past the end. Bytes that were
/// read but not yet overwritten stay resident and can be pushed back with
/// [`RingBuffer::unread`].
///
/// ```
/// use tsflow::utils::RingBuffer;
///
/// let mut ring = RingBuffer::new(8);
/// assert_eq!(ring.write(b"abcdef"), 6);
///
/// let mut out = [0u8; 4];
/// assert_eq!(ring.read(&mut out), 4);
/// ring.unread(2).unwrap();
/// assert_eq!(ring.peek(4), b"cdef");
/// ```
pub struct RingBuffer {
    buf: Box<[u8]>,
    cap: usize,
    /// Read cursor. Everything before it is read-but-resident history.
    r: usize,
    /// Write cursor.
    w: usize,
}

impl RingBuffer {
    /// Creates a ring buffer holding at most `cap` unread bytes.
    pub fn new(cap: usize) -> Self {
        assert!(cap > 0, "ring buffer capacity must be positive");
        Self {
            buf: vec![0u8; cap * 2].into_boxed_slice(),
            cap,
            r: 0,
            w: 0,
        }
    }

    /// Maximum number of unread bytes.
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Number of unread bytes.
    pub fn len(&self) -> usize {
        self.w - self.r
    }

    pub fn is_empty(&self) -> bool {
        self.r == self.w
    }

    /// Space left for writing; always `cap() - len()`.
    pub fn free(&self) -> usize {
        self.cap - self.len()
    }

    /// Appends as much of `data` as fits and returns the number of bytes taken.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.free());
        if n == 0 {
            return 0;
        }
        if self.w + n > self.buf.len() {
            self.compact();
        }
        self.buf[self.w..self.w + n].copy_from_slice(&data[..n]);
        self.w += n;
        n
    }

    /// Moves up to `out.len()` unread bytes into `out`.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.len());
        out[..n].copy_from_slice(&self.buf[self.r..self.r + n]);
        self.r += n;
        n
    }

    /// Appends up to `n` unread bytes to `out`, consuming them.
    pub fn read_into(&mut self, out: &mut Vec<u8>, n: usize) -> usize {
        let n = n.min(self.len());
        out.extend_from_slice(&self.buf[self.r..self.r + n]);
        self.r += n;
        n
    }

    /// Returns up to `n` unread bytes without consuming them.
    pub fn peek(&self, n: usize) -> &[u8] {
        let n = n.min(self.len());
        &self.buf[self.r..self.r + n]
    }

    /// Drops up to `n` unread bytes and returns how many were dropped.
    pub fn skip(&mut self, n: usize) -> usize {
        let n = n.min(self.len());
        self.r += n;
        n
    }

    /// Makes the last `n` read bytes unread again.
    ///
    /// Fails when fewer than `n` read bytes are still resident, or when
    /// re-adding them would exceed the capacity.
    pub fn unread(&mut self, n: usize) -> Result<()> {
        let available = self.r.min(self.free());
        if n > available {
            return Err(FlowError::Unread {
                requested: n,
                available,
            });
        }
        self.r -= n;
        Ok(())
    }

    /// Discards all buffered bytes and history.
    pub fn reset(&mut self) {
        self.r = 0;
        self.w = 0;
    }

    // Slides live bytes to the front, keeping as much read history as
    // could still be unread afterwards.
    fn compact(&mut self) {
        let keep = self.r.min(self.free());
        let start = self.r - keep;
        self.buf.copy_within(start..self.w, 0);
        self.r -= start;
        self.w -= start;
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("cap", &self.cap)
            .field("len", &self.len())
            .field("resident", &self.r)
            .finish()
    }
}

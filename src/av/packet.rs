use parking_lot::Mutex;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Pool of fixed-size byte buffers.
///
/// Buffers come out as a writable [`PacketBuf`]; freezing one yields a
/// shared [`Packet`]. Cloning a `Packet` takes another reference and
/// dropping the last reference hands the buffer back to the pool, so a
/// buffer can never be released more often than it was referenced.
#[derive(Clone)]
pub struct PacketPool {
    shared: Arc<PoolShared>,
}

struct PoolShared {
    buffer_size: usize,
    max_idle: usize,
    /// Buffers ever allocated and not discarded.
    allocated: AtomicUsize,
    idle: Mutex<Vec<Vec<u8>>>,
}

impl PoolShared {
    fn put(&self, mut data: Vec<u8>) {
        data.clear();
        let mut idle = self.idle.lock();
        assert!(
            idle.len() < self.allocated.load(Ordering::Acquire),
            "packet pool: buffer released more times than it was acquired"
        );
        if idle.len() < self.max_idle {
            idle.push(data);
        } else {
            self.allocated.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl PacketPool {
    /// Creates a pool of `buffer_size`-byte buffers keeping at most
    /// `max_idle` of them around for reuse.
    pub fn new(buffer_size: usize, max_idle: usize) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                buffer_size,
                max_idle,
                allocated: AtomicUsize::new(0),
                idle: Mutex::new(Vec::with_capacity(max_idle)),
            }),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.shared.buffer_size
    }

    /// Number of idle buffers ready for reuse.
    pub fn available(&self) -> usize {
        self.shared.idle.lock().len()
    }

    /// Number of buffers currently owned by the pool or its handles.
    pub fn allocated(&self) -> usize {
        self.shared.allocated.load(Ordering::Acquire)
    }

    /// Takes an empty buffer, allocating one when none is idle.
    pub fn get(&self) -> PacketBuf {
        let data = self.shared.idle.lock().pop().unwrap_or_else(|| {
            self.shared.allocated.fetch_add(1, Ordering::AcqRel);
            Vec::with_capacity(self.shared.buffer_size)
        });
        PacketBuf {
            data,
            limit: self.shared.buffer_size,
            pool: Arc::downgrade(&self.shared),
        }
    }

    /// Copies `bytes` into a pooled buffer and freezes it.
    ///
    /// Panics if `bytes` does not fit in one buffer.
    pub fn copy_from(&self, bytes: &[u8]) -> Packet {
        let mut buf = self.get();
        buf.extend_from_slice(bytes);
        buf.freeze()
    }
}

impl fmt::Debug for PacketPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketPool")
            .field("buffer_size", &self.shared.buffer_size)
            .field("allocated", &self.allocated())
            .field("available", &self.available())
            .finish()
    }
}

/// Exclusively owned pooled buffer. Returned to its pool on drop.
pub struct PacketBuf {
    data: Vec<u8>,
    limit: usize,
    pool: Weak<PoolShared>,
}

impl PacketBuf {
    /// Appends `bytes`. Overrunning the pool's buffer size is a programming
    /// error and panics.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        assert!(
            self.data.len() + bytes.len() <= self.limit,
            "packet buffer overflow: {} + {} > {}",
            self.data.len(),
            bytes.len(),
            self.limit
        );
        self.data.extend_from_slice(bytes);
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Converts the buffer into a shared, reference-counted packet with a
    /// reference count of one.
    pub fn freeze(self) -> Packet {
        Packet {
            inner: Arc::new(self),
        }
    }
}

impl Deref for PacketBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for PacketBuf {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.upgrade() {
            pool.put(std::mem::take(&mut self.data));
        }
    }
}

/// Shared handle to a pooled buffer.
///
/// `clone` adds a reference, `drop` releases one; the buffer goes back to
/// the pool when the count reaches zero.
#[derive(Clone)]
pub struct Packet {
    inner: Arc<PacketBuf>,
}

impl Packet {
    /// Current number of live references to this buffer.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.inner.data
    }
}

impl Deref for Packet {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.inner.data
    }
}

impl AsRef<[u8]> for Packet {
    fn as_ref(&self) -> &[u8] {
        &self.inner.data
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("len", &self.inner.data.len())
            .field("refs", &self.ref_count())
            .finish()
    }
}

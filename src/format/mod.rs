use bytes::{Buf, Bytes};

use crate::error::{FlowError, Result};
use crate::utils::RingBuffer;

pub mod rtp;
pub mod tlv;
pub mod ts;

/// Turns an arbitrarily chunked byte stream into discrete protocol frames.
///
/// Callers alternate between one `write` and as many `next` calls as it
/// takes to get `Ok(None)`; bytes that did not fit into the internal buffer
/// are kept and fed in by later `next` calls.
pub trait Packetizer {
    /// Queues `data` for framing.
    ///
    /// Fails with [`FlowError::PendingData`] when bytes from an earlier write
    /// are still waiting, i.e. the caller did not drain `next` first.
    fn write(&mut self, data: Bytes) -> Result<()>;

    /// Returns the next complete frame, `Ok(None)` when more input is
    /// needed, or a framing error. The slice is valid until the next call.
    fn next(&mut self) -> Result<Option<&[u8]>>;
}

/// Ring buffer plus the not-yet-buffered remainder of the last write.
#[derive(Debug)]
pub(crate) struct Reframer {
    pub ring: RingBuffer,
    pending: Bytes,
    pub out: Vec<u8>,
}

impl Reframer {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: RingBuffer::new(capacity),
            pending: Bytes::new(),
            out: Vec::with_capacity(capacity),
        }
    }

    pub fn write(&mut self, data: Bytes) -> Result<()> {
        self.fill();
        if !self.pending.is_empty() {
            return Err(FlowError::PendingData(self.pending.len()));
        }
        self.pending = data;
        self.fill();
        Ok(())
    }

    /// Moves as much of the pending remainder into the ring as fits.
    pub fn fill(&mut self) {
        let n = self.ring.write(&self.pending);
        self.pending.advance(n);
    }

    /// True when every written byte has reached the ring.
    pub fn drained(&self) -> bool {
        self.pending.is_empty()
    }

    /// Copies `n` bytes from the ring into the output buffer.
    pub fn take(&mut self, n: usize) -> &[u8] {
        self.out.clear();
        self.ring.read_into(&mut self.out, n);
        &self.out
    }

    pub fn reset(&mut self) {
        self.ring.reset();
        self.pending = Bytes::new();
        self.out.clear();
    }
}

pub use self::rtp::{RTPPacket, RTPPacketizer, RTPTracker};
pub use self::tlv::TLVPacketizer;
pub use self::ts::{TSPacketizer, TSTracker};

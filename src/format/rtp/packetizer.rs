use bytes::Bytes;
use log::warn;

use super::{RTPError, RTPHeader};
use crate::config::RTPPacketizerConfig;
use crate::error::{FlowError, Result};
use crate::format::ts::TS_PACKET_SIZE;
use crate::format::{Packetizer, Reframer};

// CSRC list plus a short header extension
const HEADER_ROOM: usize = 128;

/// Cuts a byte stream into RTP frames of one header plus a fixed number
/// of TS packets.
#[derive(Debug)]
pub struct RTPPacketizer {
    frame: Reframer,
    payload_size: usize,
    consumed: usize,
}

impl RTPPacketizer {
    pub fn new(config: RTPPacketizerConfig) -> Self {
        let payload_size = config.packets_per_frame.max(1) * TS_PACKET_SIZE;
        Self {
            frame: Reframer::new((payload_size + HEADER_ROOM) * 2),
            payload_size,
            consumed: 0,
        }
    }

    /// Bytes taken from the stream by the last `next` call, including
    /// bytes dropped on a framing error.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn reset(&mut self) {
        self.frame.reset();
        self.consumed = 0;
    }

    fn flush(&mut self) -> usize {
        let n = self.frame.ring.len();
        self.frame.ring.skip(n)
    }
}

impl Packetizer for RTPPacketizer {
    fn write(&mut self, data: Bytes) -> Result<()> {
        self.frame.write(data)
    }

    fn next(&mut self) -> Result<Option<&[u8]>> {
        self.consumed = 0;
        self.frame.fill();

        let header = match RTPHeader::parse(self.frame.ring.peek(self.frame.ring.len())) {
            Ok(header) => header,
            Err(RTPError::Truncated(needed)) => {
                if needed + self.payload_size > self.frame.ring.cap() {
                    self.consumed = self.flush();
                    return Err(FlowError::FrameTooLarge {
                        len: needed + self.payload_size,
                        max: self.frame.ring.cap(),
                    });
                }
                return Ok(None);
            }
            Err(e) => {
                // no way to find the next header boundary
                self.consumed = self.flush();
                warn!("dropping {} bytes after bad RTP header: {}", self.consumed, e);
                return Err(e.into());
            }
        };

        let frame_len = header.header_len + self.payload_size;
        if frame_len > self.frame.ring.cap() {
            self.consumed = self.flush();
            return Err(FlowError::FrameTooLarge {
                len: frame_len,
                max: self.frame.ring.cap(),
            });
        }
        if self.frame.ring.len() < frame_len {
            return Ok(None);
        }
        if header.padding {
            self.consumed = self.frame.ring.skip(frame_len);
            return Err(RTPError::Padding.into());
        }

        self.consumed = frame_len;
        Ok(Some(self.frame.take(frame_len)))
    }
}

//! # Type-Length-Value framing
//!
//! Each frame is a one byte type, a big-endian 16-bit payload length and
//! exactly that many payload bytes.
//!
//! ```rust
//! use tsflow::format::tlv;
//!
//! let frame = tlv::encode(7, b"payload").unwrap();
//! assert_eq!(&frame[..3], &[7, 0, 7]);
//! assert_eq!(tlv::decode(&frame).unwrap(), (7, &b"payload"[..]));
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use log::debug;
use thiserror::Error;

use crate::config::TLVConfig;
use crate::error::Result as FlowResult;
use crate::format::ts::{null_packet, TS_PACKET_SIZE};
use crate::format::{Packetizer, Reframer};

pub const TLV_HEADER_SIZE: usize = 3;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TLVError {
    #[error("frame type {0} is not allowed")]
    DisallowedType(u8),

    #[error("declared length {len} exceeds maximum {max}")]
    LengthExceeded { len: usize, max: usize },

    #[error("frame needs {needed} bytes, only {available} present")]
    Truncated { needed: usize, available: usize },

    #[error("payload of {0} bytes does not fit a 16-bit length")]
    PayloadTooLarge(usize),
}

pub type Result<T> = std::result::Result<T, TLVError>;

/// Wraps `payload` into one frame.
pub fn encode(frame_type: u8, payload: &[u8]) -> Result<Bytes> {
    let len = u16::try_from(payload.len()).map_err(|_| TLVError::PayloadTooLarge(payload.len()))?;
    let mut buf = BytesMut::with_capacity(TLV_HEADER_SIZE + payload.len());
    buf.put_u8(frame_type);
    buf.put_u16(len);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Reads the frame at the start of `buf`. Bytes after it are ignored.
pub fn decode(buf: &[u8]) -> Result<(u8, &[u8])> {
    if buf.len() < TLV_HEADER_SIZE {
        return Err(TLVError::Truncated {
            needed: TLV_HEADER_SIZE,
            available: buf.len(),
        });
    }
    let len = u16::from_be_bytes([buf[1], buf[2]]) as usize;
    let end = TLV_HEADER_SIZE + len;
    if buf.len() < end {
        return Err(TLVError::Truncated {
            needed: end,
            available: buf.len(),
        });
    }
    Ok((buf[0], &buf[TLV_HEADER_SIZE..end]))
}

/// Cuts a byte stream into TLV payloads.
#[derive(Debug)]
pub struct TLVPacketizer {
    frame: Reframer,
    config: TLVConfig,
}

impl TLVPacketizer {
    pub fn new(config: TLVConfig) -> Self {
        let max_length = config.max_length.min(u16::MAX as usize);
        Self {
            frame: Reframer::new((TLV_HEADER_SIZE + max_length) * 2),
            config: TLVConfig {
                max_length,
                ..config
            },
        }
    }

    /// Like [`Packetizer::next`], but also returns the frame type.
    ///
    /// An oversized length only drops the header, since the length itself
    /// cannot be trusted; a disallowed type drops the whole frame.
    pub fn next_frame(&mut self) -> FlowResult<Option<(u8, &[u8])>> {
        self.frame.fill();
        let ring = &mut self.frame.ring;
        if ring.len() < TLV_HEADER_SIZE {
            return Ok(None);
        }

        let header = ring.peek(TLV_HEADER_SIZE);
        let frame_type = header[0];
        let len = u16::from_be_bytes([header[1], header[2]]) as usize;

        if len > self.config.max_length {
            ring.skip(TLV_HEADER_SIZE);
            return Err(TLVError::LengthExceeded {
                len,
                max: self.config.max_length,
            }
            .into());
        }
        if ring.len() < TLV_HEADER_SIZE + len {
            return Ok(None);
        }
        if let Some(allowed) = &self.config.allowed_types {
            if !allowed.contains(&frame_type) {
                ring.skip(TLV_HEADER_SIZE + len);
                return Err(TLVError::DisallowedType(frame_type).into());
            }
        }

        ring.skip(TLV_HEADER_SIZE);
        let out = &mut self.frame.out;
        out.clear();
        self.frame.ring.read_into(out, len);

        if self.config.null_padding_type == Some(frame_type) {
            reinflate(out, self.config.packets_per_frame);
        }
        Ok(Some((frame_type, self.frame.out.as_slice())))
    }

    pub fn reset(&mut self) {
        self.frame.reset();
    }
}

// Restores trailing null packets stripped by the sender.
fn reinflate(payload: &mut Vec<u8>, packets: usize) {
    let full = packets * TS_PACKET_SIZE;
    if payload.len() % TS_PACKET_SIZE != 0 || payload.len() >= full {
        return;
    }
    let missing = (full - payload.len()) / TS_PACKET_SIZE;
    debug!("restoring {} null packets", missing);
    let null = null_packet();
    for _ in 0..missing {
        payload.extend_from_slice(&null);
    }
}

impl Packetizer for TLVPacketizer {
    fn write(&mut self, data: Bytes) -> FlowResult<()> {
        self.frame.write(data)
    }

    fn next(&mut self) -> FlowResult<Option<&[u8]>> {
        Ok(self.next_frame()?.map(|(_, payload)| payload))
    }
}

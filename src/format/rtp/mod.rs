//! # Real-time Transport Protocol (RTP)
//!
//! MPEG-TS carried over RTP (RFC 2250): every packet is an RTP header
//! followed by a fixed number of 188-byte TS packets.
//!
//! - [`RTPPacket`]: full header parse, CSRC list, extension and padding
//! - [`RTPHeader`]: allocation-free parse of the fields framing needs
//! - [`RTPPacketizer`]: cuts a byte stream into RTP frames
//! - [`RTPTracker`]: loss, reordering and jitter, plus TS payload checks
//!
//! ## Example: Creating and Parsing RTP Packets
//!
//! ```rust
//! use tsflow::format::rtp::RTPPacket;
//! use bytes::Bytes;
//!
//! let payload = Bytes::from(vec![1, 2, 3, 4]);
//! let packet = RTPPacket::new(
//!     33,            // MP2T payload type
//!     1000,          // Sequence number
//!     90000,         // Timestamp
//!     0x12345678,    // SSRC
//!     false,         // Marker bit
//!     payload,
//! );
//!
//! let parsed = RTPPacket::parse(&packet.to_bytes()).unwrap();
//! assert_eq!(parsed.sequence_number, 1000);
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Stream framing
pub mod packetizer;

/// Loss, reordering and jitter statistics
pub mod tracker;


pub use packetizer::RTPPacketizer;
pub use tracker::{RTPStats, RTPTracker};

/// Size of the fixed RTP header.
pub const RTP_HEADER_SIZE: usize = 12;
/// Static payload type of MPEG-TS over RTP.
pub const PAYLOAD_TYPE_MP2T: u8 = 33;

/// Errors that can occur during RTP operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RTPError {
    /// The packet data is malformed or incomplete
    #[error("Invalid RTP packet")]
    InvalidPacket,

    #[error("unsupported RTP version {0}")]
    Version(u8),

    /// Fewer bytes than the header declares
    #[error("RTP header needs {0} bytes")]
    Truncated(usize),

    /// The streaming packetizer cannot frame padded packets
    #[error("padded RTP packets are not supported")]
    Padding,
}

/// Specialized Result type for RTP operations
pub type Result<T> = std::result::Result<T, RTPError>;

/// The header fields needed to frame and order packets, parsed in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RTPHeader {
    pub padding: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    /// Fixed header plus CSRC list plus extension.
    pub header_len: usize,
}

impl RTPHeader {
    /// Parses the header at the start of `data`.
    ///
    /// Fails with [`RTPError::Truncated`] when `data` ends inside the
    /// header, so a streaming caller can wait for more bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < RTP_HEADER_SIZE {
            return Err(RTPError::Truncated(RTP_HEADER_SIZE));
        }
        let version = data[0] >> 6;
        if version != 2 {
            return Err(RTPError::Version(version));
        }

        let mut header_len = RTP_HEADER_SIZE + (data[0] & 0x0F) as usize * 4;
        if data[0] & 0x10 != 0 {
            if data.len() < header_len + 4 {
                return Err(RTPError::Truncated(header_len + 4));
            }
            let words = u16::from_be_bytes([data[header_len + 2], data[header_len + 3]]);
            header_len += 4 + words as usize * 4;
        }
        if data.len() < header_len {
            return Err(RTPError::Truncated(header_len));
        }

        Ok(Self {
            padding: data[0] & 0x20 != 0,
            marker: data[1] & 0x80 != 0,
            payload_type: data[1] & 0x7F,
            sequence_number: u16::from_be_bytes([data[2], data[3]]),
            timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ssrc: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            header_len,
        })
    }
}

/// An RTP packet containing media data and metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RTPPacket {
    /// RTP version (should be 2)
    pub version: u8,
    /// Padding flag
    pub padding: bool,
    /// Header extension flag
    pub extension: bool,
    /// CSRC count
    pub csrc_count: u8,
    /// Marker bit
    pub marker: bool,
    /// Payload type identifier
    pub payload_type: u8,
    /// Packet sequence number
    pub sequence_number: u16,
    /// Media timestamp
    pub timestamp: u32,
    /// Synchronization source identifier
    pub ssrc: u32,
    /// Contributing source identifiers
    pub csrc: Vec<u32>,
    /// Optional header extension (profile-specific ID, data)
    pub extension_data: Option<(u16, Bytes)>,
    /// Packet payload data, padding removed
    pub payload: Bytes,
}

impl RTPPacket {
    pub fn new(
        payload_type: u8,
        sequence_number: u16,
        timestamp: u32,
        ssrc: u32,
        marker: bool,
        payload: Bytes,
    ) -> Self {
        Self {
            version: 2,
            padding: false,
            extension: false,
            csrc_count: 0,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc: Vec::new(),
            extension_data: None,
            payload,
        }
    }

    /// Parses an RTP packet from raw bytes
    ///
    /// # Errors
    ///
    /// Returns `RTPError` if:
    /// - The packet is shorter than its header
    /// - The version is not 2
    /// - The padding length runs into the header
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = RTPHeader::parse(data).map_err(|e| match e {
            RTPError::Truncated(_) => RTPError::InvalidPacket,
            other => other,
        })?;

        let first_byte = data[0];
        let extension = (first_byte & 0x10) != 0;
        let csrc_count = first_byte & 0x0f;

        let mut offset = RTP_HEADER_SIZE;
        let csrc = data[offset..offset + csrc_count as usize * 4]
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        offset += csrc_count as usize * 4;

        let extension_data = if extension {
            let ext_header = u16::from_be_bytes([data[offset], data[offset + 1]]);
            offset += 4;
            Some((
                ext_header,
                Bytes::copy_from_slice(&data[offset..header.header_len]),
            ))
        } else {
            None
        };
        offset = header.header_len;

        let payload = if header.padding {
            let padding_len = data[data.len() - 1] as usize;
            if padding_len == 0 || offset + padding_len > data.len() {
                return Err(RTPError::InvalidPacket);
            }
            Bytes::copy_from_slice(&data[offset..data.len() - padding_len])
        } else {
            Bytes::copy_from_slice(&data[offset..])
        };

        Ok(Self {
            version: 2,
            padding: header.padding,
            extension,
            csrc_count,
            marker: header.marker,
            payload_type: header.payload_type,
            sequence_number: header.sequence_number,
            timestamp: header.timestamp,
            ssrc: header.ssrc,
            csrc,
            extension_data,
            payload,
        })
    }

    /// Serializes the packet. Padding is not written.
    pub fn to_bytes(&self) -> Bytes {
        let ext_len = self
            .extension_data
            .as_ref()
            .map_or(0, |(_, data)| 4 + data.len());
        let mut buf =
            BytesMut::with_capacity(RTP_HEADER_SIZE + self.csrc.len() * 4 + ext_len + self.payload.len());

        buf.put_u8(
            (2 << 6)
                | (if self.extension_data.is_some() { 0x10 } else { 0 })
                | (self.csrc.len().min(15) as u8),
        );
        buf.put_u8((if self.marker { 0x80 } else { 0 }) | (self.payload_type & 0x7F));
        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
        for &csrc in self.csrc.iter().take(15) {
            buf.put_u32(csrc);
        }
        if let Some((profile, data)) = &self.extension_data {
            buf.put_u16(*profile);
            buf.put_u16((data.len() / 4) as u16);
            buf.put_slice(&data[..data.len() / 4 * 4]);
        }
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

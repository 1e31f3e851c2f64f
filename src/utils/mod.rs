//! # Utility Functions and Types
//!
//! Byte-level helpers shared by the packetizers, trackers and pacers:
//!
//! - [`RingBuffer`]: fixed-capacity accumulator with peek/unread support
//! - [`crc32_mpeg2`]: CRC used by PSI tables
//! - [`Throttle`]: rate limiting for log output
//!
//! ```rust
//! use tsflow::utils::RingBuffer;
//!
//! let mut ring = RingBuffer::new(188);
//! ring.write(&[0x47, 0x00, 0x11]);
//! assert_eq!(ring.peek(1), &[0x47]);
//! ```

/// CRC calculation for PSI sections
pub mod crc;

/// Ring buffer used for re-framing byte streams
pub mod ring;

/// Log rate limiting
pub mod throttle;

pub use crc::{crc32_mpeg2, section_crc_ok};
pub use ring::RingBuffer;
pub use throttle::Throttle;

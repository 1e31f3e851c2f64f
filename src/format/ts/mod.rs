//! # MPEG Transport Stream (TS)
//!
//! Everything needed to cut a raw TS byte stream into frames and check it:
//!
//! - [`TSPacketizer`]: groups packets into fixed-size frames, keeping sync
//! - [`TSTracker`]: continuity, PSI discovery and PCR jitter per PID
//! - PSI section reassembly and PAT/PMT/PES header parsing
//!
//! ## Example Usage
//!
//! ```rust
//! use bytes::Bytes;
//! use tsflow::config::{TSPacketizerConfig, TrackerConfig};
//! use tsflow::format::ts::{null_packet, TSPacketizer, TSTracker};
//! use tsflow::format::Packetizer;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut packetizer = TSPacketizer::new(TSPacketizerConfig::default());
//! let mut tracker = TSTracker::new(TrackerConfig::default());
//!
//! let input: Vec<u8> = (0..14).flat_map(|_| null_packet()).collect();
//! packetizer.write(Bytes::from(input))?;
//! while let Some(frame) = packetizer.next()? {
//!     let report = tracker.track(frame);
//!     assert!(report.is_clean());
//! }
//! assert_eq!(tracker.stats().packets, 14);
//! # Ok(())
//! # }
//! ```

/// Frame assembly from an unaligned byte stream
pub mod packetizer;

/// Header, adaptation field, PSI and PES parsing
pub mod parser;

/// PSI section reassembly
pub mod psi;

/// Stream validation and statistics
pub mod tracker;

/// Core TS types and constants
pub mod types;


pub use packetizer::TSPacketizer;
pub use parser::{parse_adaptation_field, parse_pat, parse_pes_timestamps, parse_pmt, payload_offset};
pub use psi::SectionAccumulator;
pub use tracker::{PidStats, TSStats, TSTracker, TrackReport, ValidationError};
pub use types::*;

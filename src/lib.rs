#![doc(html_root_url = "https://docs.rs/tsflow/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::missing_crate_level_docs)]

//! # tsflow - MPEG transport stream ingest and playout
//!
//! `tsflow` takes MPEG-TS data arriving as a raw byte stream, inside RTP
//! packets or inside TLV frames, cuts it into well-formed units, checks
//! it for damage and releases it at the pace its embedded clocks ask for.
//!
//! ## Features
//!
//! ### Framing
//! - TS packetizer with modulo, one-shot and continuous sync recovery
//! - RTP packetizer cutting fixed-size RTP-over-TS frames
//! - TLV framing with type filtering and null packet reinflation
//!
//! ### Validation
//! - Continuity counter, PSI and adaptation field checks per PID
//! - PAT/PMT tracking and PCR jitter histograms
//! - RTP sequence and timestamp gap detection
//!
//! ### Pacing
//! - PCR, PTS/DTS or RTP timestamp driven release
//! - Blocking pacer and an async, bounded-queue pacer with pooled buffers
//!
//! ## Quick Start
//!
//! ```rust
//! use bytes::Bytes;
//! use tsflow::config::{TSPacketizerConfig, TrackerConfig};
//! use tsflow::format::ts::{null_packet, TSPacketizer, TSTracker};
//! use tsflow::format::Packetizer;
//!
//! # fn main() -> tsflow::Result<()> {
//! let mut packetizer = TSPacketizer::new(TSPacketizerConfig::default());
//! let mut tracker = TSTracker::new(TrackerConfig::default());
//!
//! packetizer.write(Bytes::from(null_packet().repeat(7)))?;
//! while let Some(frame) = packetizer.next()? {
//!     assert!(tracker.track(frame).is_clean());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - `format`: packetizers and trackers for TS, RTP and TLV
//! - `pacer`: schedules and pacers releasing frames on time
//! - `timing`: clocks, counter unwrapping, gap detection
//! - `av`: pooled packet buffers
//! - `stats`: histograms for jitter reporting
//! - `config`: layered configuration
//! - `error`: error type and result alias
//! - `utils`: ring buffer, CRC and log throttling

/// Pooled, reference-counted packet buffers
pub mod av;

/// Configuration module
pub mod config;

/// Error types and utilities
pub mod error;

/// Packetizers and trackers (TS, RTP, TLV)
pub mod format;

/// Frame pacing by embedded timestamps
pub mod pacer;

/// Histograms and counters
pub mod stats;

/// Clocks, wrap-around handling and gap detection
pub mod timing;

/// Common utilities and helper functions
pub mod utils;

pub use error::{FlowError, Result};

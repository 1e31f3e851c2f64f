use std::fmt;
use std::time::Duration;
use thiserror::Error;

use super::unwrap::{SequenceUnwrapper, TimestampUnwrapper};
use super::{ticks_exceed, ticks_to_nanos};

/// One discontinuity found by [`GapDetector::detect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gap {
    /// The sequence number moved by more than the accepted step.
    Sequence { previous: i64, current: i64 },
    /// The media timestamp moved by more than the accepted duration.
    Timestamp { previous: i64, current: i64, rate: u64 },
}

impl Gap {
    /// Signed step between the two values.
    pub fn delta(&self) -> i64 {
        match *self {
            Gap::Sequence { previous, current } | Gap::Timestamp { previous, current, .. } => {
                current - previous
            }
        }
    }
}

impl fmt::Display for Gap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Gap::Sequence { previous, current } => write!(
                f,
                "sequence jumped from {} to {} ({:+})",
                previous,
                current,
                current - previous
            ),
            Gap::Timestamp {
                previous,
                current,
                rate,
            } => write!(
                f,
                "timestamp jumped from {} to {} ({:+} ms)",
                previous,
                current,
                ticks_to_nanos(current - previous, rate) / 1_000_000
            ),
        }
    }
}

/// All gaps flagged by a single detection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct GapError {
    pub gaps: Vec<Gap>,
}

impl GapError {
    pub fn has_sequence_gap(&self) -> bool {
        self.gaps.iter().any(|g| matches!(g, Gap::Sequence { .. }))
    }

    pub fn has_timestamp_gap(&self) -> bool {
        self.gaps.iter().any(|g| matches!(g, Gap::Timestamp { .. }))
    }
}

impl fmt::Display for GapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, gap) in self.gaps.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", gap)?;
        }
        Ok(())
    }
}

/// Result of [`GapDetector::detect`]. The unwrapped values are always
/// filled in, whether or not a gap was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub sequence: i64,
    pub timestamp: i64,
    pub gap: Option<GapError>,
}

/// Flags sequence and timestamp discontinuities in an RTP stream.
#[derive(Debug, Clone)]
pub struct GapDetector {
    sequence: SequenceUnwrapper,
    timestamp: TimestampUnwrapper,
    max_sequence_delta: u64,
    max_timestamp_delta: Duration,
    clock_rate: u64,
}

impl GapDetector {
    /// `max_sequence_delta` is the largest accepted sequence step (1 for a
    /// lossless stream); `max_timestamp_delta` the largest accepted media
    /// time step at `clock_rate` Hz.
    pub fn new(max_sequence_delta: u64, max_timestamp_delta: Duration, clock_rate: u64) -> Self {
        Self {
            sequence: SequenceUnwrapper::new(),
            timestamp: TimestampUnwrapper::new(),
            max_sequence_delta,
            max_timestamp_delta,
            clock_rate,
        }
    }

    pub fn detect(&mut self, seq: u16, ts: u32) -> Detection {
        let sequence = self.sequence.unwrap(seq);
        let timestamp = self.timestamp.unwrap(ts);
        let mut gaps = Vec::new();

        let seq_delta = self.sequence.delta();
        if seq_delta.unsigned_abs() > self.max_sequence_delta {
            gaps.push(Gap::Sequence {
                previous: sequence - seq_delta,
                current: sequence,
            });
        }

        let ts_delta = self.timestamp.delta();
        if ticks_exceed(ts_delta, self.clock_rate, self.max_timestamp_delta) {
            gaps.push(Gap::Timestamp {
                previous: timestamp - ts_delta,
                current: timestamp,
                rate: self.clock_rate,
            });
        }

        Detection {
            sequence,
            timestamp,
            gap: (!gaps.is_empty()).then_some(GapError { gaps }),
        }
    }

    pub fn clock_rate(&self) -> u64 {
        self.clock_rate
    }

    pub fn reset(&mut self) {
        self.sequence.reset();
        self.timestamp.reset();
    }
}

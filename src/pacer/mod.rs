//! # Playout pacing
//!
//! Pacers release frames at the wall-clock instant their media timestamps
//! call for. A [`Schedule`] turns a frame into a target instant; the
//! [`Pacer`] sleeps the calling thread until then, while the
//! [`AsyncPacer`] hands frames through a bounded queue to a consumer task
//! that does the waiting.
//!
//! Every schedule keeps a [`TimeReference`] pairing one wall-clock instant
//! with one media timestamp. It is replaced, never adjusted, when the
//! stream jumps or when a frame would be released too late.
//!
//! ```rust
//! use std::time::Duration;
//! use bytes::Bytes;
//! use tsflow::config::PacerConfig;
//! use tsflow::format::rtp::RTPPacket;
//! use tsflow::pacer::{Pacer, RTPSchedule};
//! use tsflow::timing::ManualClock;
//!
//! let mut pacer = Pacer::with_clock(RTPSchedule::new(&PacerConfig::default()), ManualClock::new());
//! let frame = |seq, ts| RTPPacket::new(33, seq, ts, 1, false, Bytes::new()).to_bytes();
//!
//! assert_eq!(pacer.wait(&frame(1, 0)), Duration::ZERO);
//! assert_eq!(pacer.wait(&frame(2, 4_500)), Duration::from_millis(50));
//! ```

use std::time::{Duration, Instant};

use log::debug;

use crate::config::PacerConfig;
use crate::timing::{offset_instant, ticks_to_nanos};

/// Thread-blocking pacer
pub mod blocking;

/// Queue-based pacer for async producers and consumers
pub mod queued;

/// Pacing by RTP timestamps
pub mod rtp;

/// Pacing by PCR or PES timestamps
pub mod ts;

pub use blocking::Pacer;
pub use queued::AsyncPacer;
pub use rtp::RTPSchedule;
pub use ts::TSSchedule;

pub type TSPacer<C = crate::timing::SystemClock> = Pacer<TSSchedule, C>;
pub type RTPPacer<C = crate::timing::SystemClock> = Pacer<RTPSchedule, C>;

/// Decides when a frame is due.
pub trait Schedule: Send {
    /// Target release instant of `frame`, seen at `now`. `None` when the
    /// frame carries no usable timing and can go out right away.
    fn target(&mut self, frame: &[u8], now: Instant) -> Option<Instant>;

    fn stats(&self) -> PacerStats;

    /// Current anchor, if any frame has been timed yet.
    fn reference(&self) -> Option<TimeReference>;
}

/// Pairing of a wall-clock instant with a media timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeReference {
    pub wall_clock: Instant,
    /// Unwrapped media timestamp.
    pub media: i64,
    /// Unwrapped sequence number (RTP) or packet index (TS).
    pub sequence: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacerStats {
    pub frames: u64,
    /// Frames that carried a timestamp.
    pub timed: u64,
    pub reanchors: u64,
    /// Sum of all scheduled waits.
    pub total_wait: Duration,
}

/// Anchor bookkeeping shared by the schedules.
#[derive(Debug, Clone)]
pub(crate) struct Anchor {
    reference: Option<TimeReference>,
    rate: u64,
    tolerance: Duration,
    adjust: bool,
    stats: PacerStats,
}

impl Anchor {
    pub fn new(rate: u64, config: &PacerConfig) -> Self {
        Self {
            reference: None,
            rate,
            tolerance: config.tolerance,
            adjust: config.adjust_reference,
            stats: PacerStats::default(),
        }
    }

    /// Counts a frame without timing.
    pub fn untimed(&mut self) {
        self.stats.frames += 1;
    }

    /// Target instant for media time `media`. Re-anchors on a
    /// discontinuity, when the target is more than the tolerance in the
    /// past, and in adjust mode also when it is that far in the future.
    pub fn schedule(&mut self, media: i64, sequence: i64, discontinuity: bool, now: Instant) -> Instant {
        self.stats.frames += 1;
        self.stats.timed += 1;

        let reference = match self.reference {
            Some(reference) if !discontinuity => reference,
            _ => return self.reanchor(media, sequence, now),
        };

        let target = offset_instant(
            reference.wall_clock,
            ticks_to_nanos(media - reference.media, self.rate),
        );
        match target {
            Some(target) if target + self.tolerance < now => {
                debug!("frame {:?} late, re-anchoring", now - target);
                self.reanchor(media, sequence, now)
            }
            Some(target) if self.adjust && target > now + self.tolerance => {
                debug!("frame {:?} early, re-anchoring", target - now);
                self.reanchor(media, sequence, now)
            }
            Some(target) => {
                self.stats.total_wait += target.saturating_duration_since(now);
                target
            }
            None => self.reanchor(media, sequence, now),
        }
    }

    fn reanchor(&mut self, media: i64, sequence: i64, now: Instant) -> Instant {
        if self.reference.is_some() {
            self.stats.reanchors += 1;
        }
        self.reference = Some(TimeReference {
            wall_clock: now,
            media,
            sequence,
        });
        now
    }

    pub fn reference(&self) -> Option<TimeReference> {
        self.reference
    }

    pub fn stats(&self) -> PacerStats {
        self.stats
    }

    pub fn reset(&mut self) {
        self.reference = None;
    }
}

use std::time::{Duration, Instant};

use super::{offset_instant, ticks_to_nanos};

/// Wall-clock position of one media timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Estimate {
    /// Instant at which the timestamp should have arrived.
    pub wall_clock: Instant,
    /// How late it actually arrived.
    pub jitter: Duration,
}

/// Maps media timestamps onto the local monotonic clock.
///
/// The anchor pairs a wall-clock instant with a media timestamp and is kept
/// at the earliest `arrival - media_time` seen so far: a packet that
/// arrives earlier than the anchor predicts tightens it. Every other packet
/// is measured against it, which makes the reported jitter the packet's
/// delay relative to the fastest delivery observed.
#[derive(Debug, Clone)]
pub struct WallClockEstimator {
    rate: u64,
    anchor: Option<(Instant, i64)>,
}

impl WallClockEstimator {
    pub fn new(rate: u64) -> Self {
        Self { rate, anchor: None }
    }

    /// Records a timestamp (already unwrapped) that arrived at `now`.
    pub fn observe(&mut self, now: Instant, ticks: i64) -> Estimate {
        if let Some(expected) = self.wall_clock(ticks) {
            if expected <= now {
                return Estimate {
                    wall_clock: expected,
                    jitter: now - expected,
                };
            }
        }
        self.anchor = Some((now, ticks));
        Estimate {
            wall_clock: now,
            jitter: Duration::ZERO,
        }
    }

    /// Wall-clock instant matching `ticks` under the current anchor.
    pub fn wall_clock(&self, ticks: i64) -> Option<Instant> {
        let (wall, media) = self.anchor?;
        offset_instant(wall, ticks_to_nanos(ticks - media, self.rate))
    }

    pub fn anchor(&self) -> Option<(Instant, i64)> {
        self.anchor
    }

    pub fn reset(&mut self) {
        self.anchor = None;
    }
}

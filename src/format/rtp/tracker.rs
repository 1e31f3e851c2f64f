use std::collections::BTreeSet;
use std::time::Instant;

use log::{debug, info};

use super::RTPPacket;
use crate::config::TrackerConfig;
use crate::format::ts::{TSStats, TSTracker, TrackReport, ValidationError};
use crate::stats::Histogram;
use crate::timing::{Clock, GapDetector, SystemClock, WallClockEstimator};
use crate::utils::Throttle;

/// Copy of the RTP tracker counters at the time of the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RTPStats {
    pub packets: u64,
    /// Sequence numbers skipped and not (yet) seen late.
    pub lost: u64,
    pub reordered: u64,
    /// Repeats of a sequence number already received.
    pub duplicates: u64,
    /// Detections flagged by the gap detector.
    pub gaps: u64,
    pub errors: u64,
    /// Reconstructed send time of the newest packet.
    pub last_wall_clock: Option<Instant>,
    pub jitter: Histogram,
    /// Validation of the carried TS packets.
    pub ts: TSStats,
}

/// Tracks an RTP stream carrying MPEG-TS.
///
/// Sequence numbers and timestamps are unwrapped by a [`GapDetector`];
/// the send time of every packet is reconstructed from its timestamp and
/// the earliest arrival anchor, and its distance to the actual arrival
/// feeds the jitter histogram. The payload is handed to a [`TSTracker`].
///
/// Skipped sequence numbers are remembered for the last
/// [`LOSS_WINDOW`] packets, so a late arrival only cancels a loss that
/// was actually counted. A late packet that was never missing is a
/// duplicate.
pub const LOSS_WINDOW: i64 = 4096;

#[derive(Debug)]
pub struct RTPTracker<C: Clock = SystemClock> {
    clock: C,
    detector: GapDetector,
    estimator: WallClockEstimator,
    highest: Option<i64>,
    missing: BTreeSet<i64>,
    ts: TSTracker<C>,
    stats: RTPStats,
    throttle: Throttle,
}

impl RTPTracker<SystemClock> {
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> RTPTracker<C> {
    pub fn with_clock(config: TrackerConfig, clock: C) -> Self {
        Self {
            detector: GapDetector::new(
                config.max_sequence_gap,
                config.max_timestamp_gap,
                config.clock_rate,
            ),
            estimator: WallClockEstimator::new(config.clock_rate),
            highest: None,
            missing: BTreeSet::new(),
            throttle: Throttle::new(config.log_interval),
            stats: RTPStats::default(),
            ts: TSTracker::with_clock(config, clock.clone()),
            clock,
        }
    }

    /// Validates one RTP frame and the TS packets it carries.
    pub fn track(&mut self, frame: &[u8]) -> TrackReport {
        let now = self.clock.now();
        let packet = match RTPPacket::parse(frame) {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.errors += 1;
                return TrackReport {
                    packets: 0,
                    errors: vec![ValidationError::Rtp(e.to_string())],
                };
            }
        };
        self.stats.packets += 1;

        let mut errors = Vec::new();
        let detection = self.detector.detect(packet.sequence_number, packet.timestamp);
        self.track_sequence(detection.sequence, packet.ssrc);
        if let Some(gap) = detection.gap {
            debug!("rtp ssrc {:08x}: {}", packet.ssrc, gap);
            self.stats.gaps += 1;
            self.stats.errors += 1;
            errors.push(ValidationError::Gap(gap));
        }

        let estimate = self.estimator.observe(now, detection.timestamp);
        self.stats.jitter.record(estimate.jitter);
        self.stats.last_wall_clock = Some(estimate.wall_clock);

        let mut report = self.ts.track_at(&packet.payload, now);
        errors.append(&mut report.errors);
        report.errors = errors;

        self.log_stats_at(now);
        report
    }

    fn track_sequence(&mut self, seq: i64, ssrc: u32) {
        let highest = match self.highest {
            Some(highest) => highest,
            None => {
                self.highest = Some(seq);
                return;
            }
        };

        if seq > highest {
            self.stats.lost += (seq - highest - 1) as u64;
            self.missing.extend((highest + 1).max(seq - LOSS_WINDOW)..seq);
            self.missing = self.missing.split_off(&(seq - LOSS_WINDOW));
            self.highest = Some(seq);
        } else if self.missing.remove(&seq) {
            self.stats.reordered += 1;
            self.stats.lost -= 1;
        } else if seq > highest - LOSS_WINDOW {
            debug!("rtp ssrc {:08x}: duplicate sequence {}", ssrc, seq);
            self.stats.duplicates += 1;
        } else {
            // too old to tell, the loss stays counted
            self.stats.reordered += 1;
        }
    }

    pub fn stats(&self) -> RTPStats {
        RTPStats {
            ts: self.ts.stats(),
            ..self.stats.clone()
        }
    }

    /// Number of elementary streams found in the carried TS.
    pub fn stream_count(&self) -> usize {
        self.ts.stream_count()
    }

    pub fn reset(&mut self) {
        self.detector.reset();
        self.estimator.reset();
        self.highest = None;
        self.missing.clear();
        self.stats = RTPStats::default();
        self.ts.reset();
    }

    pub fn log_stats(&mut self) {
        let now = self.clock.now();
        self.log_stats_at(now);
    }

    fn log_stats_at(&mut self, now: Instant) {
        if self.throttle.ready(now).is_none() {
            return;
        }
        info!(
            "rtp: {} packets, {} lost, {} reordered, {} duplicates, {} gaps, jitter {}",
            self.stats.packets,
            self.stats.lost,
            self.stats.reordered,
            self.stats.duplicates,
            self.stats.gaps,
            self.stats.jitter
        );
    }
}

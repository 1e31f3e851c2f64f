use std::time::Instant;

use log::debug;

use super::{Anchor, PacerStats, Schedule, TimeReference};
use crate::config::PacerConfig;
use crate::format::rtp::RTPHeader;
use crate::timing::GapDetector;

/// Schedules RTP frames by their timestamps. Any gap flagged by the
/// [`GapDetector`] re-anchors the time reference.
#[derive(Debug, Clone)]
pub struct RTPSchedule {
    detector: GapDetector,
    anchor: Anchor,
}

impl RTPSchedule {
    pub fn new(config: &PacerConfig) -> Self {
        Self {
            detector: GapDetector::new(
                config.max_sequence_gap,
                config.max_timestamp_gap,
                config.clock_rate,
            ),
            anchor: Anchor::new(config.clock_rate, config),
        }
    }

    pub fn reset(&mut self) {
        self.detector.reset();
        self.anchor.reset();
    }
}

impl Schedule for RTPSchedule {
    fn target(&mut self, frame: &[u8], now: Instant) -> Option<Instant> {
        let header = match RTPHeader::parse(frame) {
            Ok(header) => header,
            Err(e) => {
                debug!("unpaced frame: {}", e);
                self.anchor.untimed();
                return None;
            }
        };

        let detection = self.detector.detect(header.sequence_number, header.timestamp);
        if let Some(gap) = &detection.gap {
            debug!("rtp ssrc {:08x}: {}", header.ssrc, gap);
        }
        Some(self.anchor.schedule(
            detection.timestamp,
            detection.sequence,
            detection.gap.is_some(),
            now,
        ))
    }

    fn stats(&self) -> PacerStats {
        self.anchor.stats()
    }

    fn reference(&self) -> Option<TimeReference> {
        self.anchor.reference()
    }
}

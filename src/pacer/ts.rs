use std::time::{Duration, Instant};

use log::debug;

use super::{Anchor, PacerStats, Schedule, TimeReference};
use crate::config::{PacerConfig, TimingSource};
use crate::format::ts::{
    parse_adaptation_field, parse_pes_timestamps, payload_offset, TSHeader, TS_PACKET_SIZE,
};
use crate::timing::{ticks_exceed, Unwrapper, PCR_HZ, PCR_RANGE, PTS_HZ, PTS_RANGE};

/// Schedules TS frames by PCR, or by DTS/PTS of PES headers.
///
/// The schedule locks onto the first PID that carries the configured
/// timing field and ignores timing on every other PID.
#[derive(Debug, Clone)]
pub struct TSSchedule {
    timing: TimingSource,
    pid: Option<u16>,
    unwrapper: Unwrapper,
    rate: u64,
    max_gap: Duration,
    packets: i64,
    anchor: Anchor,
}

impl TSSchedule {
    pub fn new(config: &PacerConfig) -> Self {
        let (rate, modulus) = match config.timing {
            TimingSource::Pcr => (PCR_HZ, PCR_RANGE),
            TimingSource::Pts => (PTS_HZ, PTS_RANGE),
        };
        Self {
            timing: config.timing,
            pid: None,
            unwrapper: Unwrapper::new(modulus),
            rate,
            max_gap: config.max_timestamp_gap,
            packets: 0,
            anchor: Anchor::new(rate, config),
        }
    }

    /// PID the schedule follows, once one has been seen.
    pub fn pid(&self) -> Option<u16> {
        self.pid
    }

    pub fn reset(&mut self) {
        self.pid = None;
        self.unwrapper.reset();
        self.anchor.reset();
    }

    // First timing value in the frame on the followed PID, with the
    // discontinuity indicator of its packet.
    fn find_timing(&mut self, frame: &[u8]) -> Option<(u64, bool, i64)> {
        let first = self.packets;
        self.packets += (frame.len() / TS_PACKET_SIZE) as i64;

        for (i, packet) in frame.chunks_exact(TS_PACKET_SIZE).enumerate() {
            let header = match TSHeader::parse(packet) {
                Ok(header) => header,
                Err(_) => continue,
            };
            if self.pid.map_or(false, |pid| pid != header.pid) {
                continue;
            }
            let adaptation = parse_adaptation_field(packet).ok().flatten();
            let discontinuity = adaptation.as_ref().map_or(false, |a| a.discontinuity);

            let value = match self.timing {
                TimingSource::Pcr => adaptation.and_then(|a| a.pcr),
                TimingSource::Pts if header.payload_unit_start => payload_offset(packet, &header)
                    .ok()
                    .flatten()
                    .and_then(|offset| parse_pes_timestamps(&packet[offset..]))
                    .and_then(|ts| ts.decode_time()),
                TimingSource::Pts => None,
            };

            if let Some(value) = value {
                if self.pid.is_none() {
                    debug!("pacing on pid {} ({:?})", header.pid, self.timing);
                    self.pid = Some(header.pid);
                }
                return Some((value, discontinuity, first + i as i64));
            }
        }
        None
    }
}

impl Schedule for TSSchedule {
    fn target(&mut self, frame: &[u8], now: Instant) -> Option<Instant> {
        let (raw, discontinuity, sequence) = match self.find_timing(frame) {
            Some(found) => found,
            None => {
                self.anchor.untimed();
                return None;
            }
        };

        let media = self.unwrapper.unwrap(raw);
        let jumped = ticks_exceed(self.unwrapper.delta(), self.rate, self.max_gap);
        if jumped {
            debug!("timestamp jumped by {} ticks", self.unwrapper.delta());
        }
        Some(self.anchor.schedule(media, sequence, discontinuity || jumped, now))
    }

    fn stats(&self) -> PacerStats {
        self.anchor.stats()
    }

    fn reference(&self) -> Option<TimeReference> {
        self.anchor.reference()
    }
}

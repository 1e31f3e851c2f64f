use std::time::Duration;

use super::{PacerStats, Schedule};
use crate::timing::{Clock, SystemClock};

/// Blocks the calling thread until each frame is due.
///
/// There is no internal timeout; a caller needing bounded latency races
/// `wait` against its own deadline.
#[derive(Debug)]
pub struct Pacer<S, C = SystemClock> {
    schedule: S,
    clock: C,
}

impl<S: Schedule> Pacer<S, SystemClock> {
    pub fn new(schedule: S) -> Self {
        Self::with_clock(schedule, SystemClock)
    }
}

impl<S: Schedule, C: Clock> Pacer<S, C> {
    pub fn with_clock(schedule: S, clock: C) -> Self {
        Self { schedule, clock }
    }

    /// Sleeps until `frame` is due and returns how long that took.
    pub fn wait(&mut self, frame: &[u8]) -> Duration {
        let now = self.clock.now();
        let wait = self
            .schedule
            .target(frame, now)
            .map_or(Duration::ZERO, |target| target.saturating_duration_since(now));
        if !wait.is_zero() {
            self.clock.sleep(wait);
        }
        wait
    }

    pub fn stats(&self) -> PacerStats {
        self.schedule.stats()
    }

    pub fn schedule(&self) -> &S {
        &self.schedule
    }

    pub fn schedule_mut(&mut self) -> &mut S {
        &mut self.schedule
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PacerConfig, TimingSource};
    use crate::format::rtp::RTPPacket;
    use crate::format::ts::tests::{PacketWriter, AUDIO_PID, VIDEO_PID};
    use crate::format::ts::TS_PACKET_SIZE;
    use crate::pacer::{RTPPacer, RTPSchedule, TSPacer, TSSchedule};
    use crate::timing::ManualClock;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    const MS_100: u64 = 2_700_000;

    fn ts_pacer(config: PacerConfig) -> (TSPacer<ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        (Pacer::with_clock(TSSchedule::new(&config), clock.clone()), clock)
    }

    /// A PES start packet whose header carries PTS and DTS.
    fn pes_packet(w: &mut PacketWriter, pid: u16, pts: u64, dts: u64) -> [u8; TS_PACKET_SIZE] {
        fn stamp(prefix: u8, ts: u64) -> [u8; 5] {
            [
                (prefix << 4) | (((ts >> 30) as u8 & 0x07) << 1) | 1,
                (ts >> 22) as u8,
                (((ts >> 15) as u8) << 1) | 1,
                (ts >> 7) as u8,
                ((ts as u8) << 1) | 1,
            ]
        }
        let mut pes = vec![0x00, 0x00, 0x01, 0xE0, 0x00, 0x00, 0x80, 0xC0, 0x0A];
        pes.extend_from_slice(&stamp(0x3, pts));
        pes.extend_from_slice(&stamp(0x1, dts));
        w.payload(pid, true, &pes)
    }

    #[test]
    fn test_pcr_pacing() {
        let (mut pacer, clock) = ts_pacer(PacerConfig::default());
        let mut w = PacketWriter::default();
        let start = clock.now();

        assert_eq!(pacer.wait(&w.pcr(VIDEO_PID, 5 * MS_100, false)), Duration::ZERO);
        // frames without PCR go out immediately
        assert_eq!(pacer.wait(&w.payload(VIDEO_PID, false, &[])), Duration::ZERO);
        assert_eq!(
            pacer.wait(&w.pcr(VIDEO_PID, 6 * MS_100, false)),
            Duration::from_millis(100)
        );
        assert_eq!(clock.now() - start, Duration::from_millis(100));

        let stats = pacer.stats();
        assert_eq!(stats.frames, 3);
        assert_eq!(stats.timed, 2);
        assert_eq!(stats.reanchors, 0);
        assert_eq!(pacer.schedule().pid(), Some(VIDEO_PID));
    }

    #[test]
    fn test_late_frame_reanchors() {
        let (mut pacer, clock) = ts_pacer(PacerConfig::default());
        let mut w = PacketWriter::default();

        pacer.wait(&w.pcr(VIDEO_PID, 0, false));
        clock.advance(Duration::from_secs(2));
        assert_eq!(pacer.wait(&w.pcr(VIDEO_PID, MS_100, false)), Duration::ZERO);
        assert_eq!(pacer.stats().reanchors, 1);
        assert_eq!(pacer.schedule().reference().map(|r| r.media), Some(MS_100 as i64));

        // paced against the new anchor
        assert_eq!(
            pacer.wait(&w.pcr(VIDEO_PID, 3 * MS_100, false)),
            Duration::from_millis(200)
        );
    }

    #[test]
    fn test_discontinuity_and_jump_reanchor() {
        let (mut pacer, _clock) = ts_pacer(PacerConfig::default());
        let mut w = PacketWriter::default();

        pacer.wait(&w.pcr(VIDEO_PID, 0, false));
        assert_eq!(pacer.wait(&w.pcr(VIDEO_PID, 900 * MS_100, true)), Duration::ZERO);
        // 5 s step exceeds the 1 s gap limit
        assert_eq!(pacer.wait(&w.pcr(VIDEO_PID, 950 * MS_100, false)), Duration::ZERO);
        assert_eq!(pacer.stats().reanchors, 2);
    }

    #[test]
    fn test_adjust_reference() {
        let config = PacerConfig {
            adjust_reference: true,
            max_timestamp_gap: Duration::from_secs(10),
            ..Default::default()
        };
        let (mut pacer, _clock) = ts_pacer(config.clone());
        let mut w = PacketWriter::default();
        pacer.wait(&w.pcr(VIDEO_PID, 0, false));
        assert_eq!(pacer.wait(&w.pcr(VIDEO_PID, 30 * MS_100, false)), Duration::ZERO);
        assert_eq!(pacer.stats().reanchors, 1);

        let (mut strict, _clock) = ts_pacer(PacerConfig {
            adjust_reference: false,
            ..config
        });
        strict.wait(&w.pcr(AUDIO_PID, 0, false));
        assert_eq!(
            strict.wait(&w.pcr(AUDIO_PID, 30 * MS_100, false)),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn test_pts_pacing_prefers_dts_and_locks_pid() {
        let (mut pacer, _clock) = ts_pacer(PacerConfig {
            timing: TimingSource::Pts,
            ..Default::default()
        });
        let mut w = PacketWriter::default();

        pacer.wait(&pes_packet(&mut w, VIDEO_PID, 20_000, 10_000));
        // other PIDs are ignored once locked
        assert_eq!(pacer.wait(&pes_packet(&mut w, AUDIO_PID, 90_000, 90_000)), Duration::ZERO);
        let frame = [
            w.payload(VIDEO_PID, false, &[]),
            pes_packet(&mut w, VIDEO_PID, 40_000, 19_000),
        ]
        .concat();
        assert_eq!(pacer.wait(&frame), Duration::from_millis(100));
        assert_eq!(pacer.schedule().reference().map(|r| r.sequence), Some(0));
    }

    #[test]
    fn test_rtp_pacing_gap_reanchors() {
        let clock = ManualClock::new();
        let mut pacer: RTPPacer<ManualClock> =
            Pacer::with_clock(RTPSchedule::new(&PacerConfig::default()), clock);
        let frame = |seq: u16, ts: u32| RTPPacket::new(33, seq, ts, 7, false, Bytes::new()).to_bytes();

        assert_eq!(pacer.wait(&frame(10, 0)), Duration::ZERO);
        assert_eq!(pacer.wait(&frame(11, 9_000)), Duration::from_millis(100));
        // two packets lost
        assert_eq!(pacer.wait(&frame(14, 18_000)), Duration::ZERO);
        assert_eq!(pacer.stats().reanchors, 1);
        assert_eq!(pacer.schedule().reference().map(|r| r.sequence), Some(14));

        assert_eq!(pacer.wait(&[0u8; 4]), Duration::ZERO);
        assert_eq!(pacer.stats().timed, 3);
    }
}

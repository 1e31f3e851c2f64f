//! # Media clock arithmetic
//!
//! Transport streams carry two clocks: the 27 MHz program clock reference
//! (PCR) and the 90 kHz presentation/decoding timestamps (PTS/DTS). RTP
//! timestamps run at a payload-specific rate, 90 kHz for MPEG-TS. All
//! conversions here are integer arithmetic on ticks, so comparisons near a
//! wrap point never suffer from floating-point drift.
//!
//! ```rust
//! use std::time::Duration;
//! use tsflow::timing::{ticks_to_duration, PCR_HZ, PTS_HZ};
//!
//! assert_eq!(ticks_to_duration(90_000, PTS_HZ), Duration::from_secs(1));
//! assert_eq!(ticks_to_duration(27, PCR_HZ), Duration::from_micros(1));
//! ```

/// Clock sources
pub mod clock;

/// Wall-clock reconstruction from media timestamps
pub mod estimator;

/// Gap detection on RTP sequence numbers and timestamps
pub mod gap;

/// Wraparound-safe counter extension
pub mod unwrap;

pub use clock::{Clock, ManualClock, SystemClock};
pub use estimator::WallClockEstimator;
pub use gap::{Detection, Gap, GapDetector, GapError};
pub use unwrap::{SequenceUnwrapper, TimestampUnwrapper, Unwrapper};

use std::time::{Duration, Instant};

/// PCR ticks per second.
pub const PCR_HZ: u64 = 27_000_000;
/// PTS/DTS ticks per second.
pub const PTS_HZ: u64 = 90_000;
/// Default RTP clock rate for MPEG-TS payloads.
pub const RTP_TS_HZ: u64 = 90_000;

/// Number of distinct PTS/DTS values (33 bits).
pub const PTS_RANGE: u64 = 1 << 33;
/// Number of distinct PCR values (33-bit base x 300 + 9-bit extension).
pub const PCR_RANGE: u64 = PTS_RANGE * 300;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Converts a non-negative tick count at `rate` Hz into a duration,
/// truncating to whole nanoseconds.
pub fn ticks_to_duration(ticks: u64, rate: u64) -> Duration {
    let secs = ticks / rate;
    let rem = ticks % rate;
    Duration::new(secs, (rem * NANOS_PER_SEC / rate) as u32)
}

/// Signed tick count at `rate` Hz expressed in nanoseconds.
pub fn ticks_to_nanos(ticks: i64, rate: u64) -> i128 {
    ticks as i128 * NANOS_PER_SEC as i128 / rate as i128
}

/// Number of whole ticks at `rate` Hz that fit in `duration`.
pub fn duration_to_ticks(duration: Duration, rate: u64) -> u64 {
    (duration.as_nanos() * rate as u128 / NANOS_PER_SEC as u128) as u64
}

/// True when `|ticks| / rate` is strictly longer than `limit`.
///
/// Evaluated by cross-multiplication so no rounding is involved.
pub fn ticks_exceed(ticks: i64, rate: u64, limit: Duration) -> bool {
    ticks.unsigned_abs() as u128 * NANOS_PER_SEC as u128 > limit.as_nanos() * rate as u128
}

/// Shifts `base` by a signed number of nanoseconds.
pub fn offset_instant(base: Instant, nanos: i128) -> Option<Instant> {
    let magnitude = Duration::from_nanos(u64::try_from(nanos.unsigned_abs()).ok()?);
    if nanos >= 0 {
        base.checked_add(magnitude)
    } else {
        base.checked_sub(magnitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcr_conversion_is_exact() {
        assert_eq!(ticks_to_duration(PCR_HZ, PCR_HZ), Duration::from_secs(1));
        assert_eq!(ticks_to_duration(300, PCR_HZ), Duration::from_nanos(11_111));
        assert_eq!(
            ticks_to_duration(PCR_RANGE - 1, PCR_HZ),
            Duration::new(95_443, 717_688_851)
        );
    }

    #[test]
    fn test_ticks_exceed() {
        let second = Duration::from_secs(1);
        assert!(!ticks_exceed(90_000, PTS_HZ, second));
        assert!(ticks_exceed(90_001, PTS_HZ, second));
        assert!(ticks_exceed(-90_001, PTS_HZ, second));
        assert!(!ticks_exceed(0, PTS_HZ, Duration::ZERO));
    }

    #[test]
    fn test_round_trip_ticks() {
        let d = Duration::from_millis(40);
        assert_eq!(duration_to_ticks(d, PTS_HZ), 3_600);
        assert_eq!(ticks_to_nanos(-3_600, PTS_HZ), -40_000_000);
    }

    #[test]
    fn test_offset_instant() {
        let base = Instant::now();
        let later = offset_instant(base, 1_500).unwrap();
        assert_eq!(later - base, Duration::from_nanos(1_500));
        assert_eq!(offset_instant(later, -1_500), Some(base));
    }
}

/// Extends a wrapping counter into a monotonically comparable `i64`.
///
/// The step between two raw values is taken as the signed difference
/// modulo the counter range, so forward wraps add one full range while a
/// small step backwards (reordering) is kept negative instead of being read
/// as a wrap.
#[derive(Debug, Clone)]
pub struct Unwrapper {
    modulus: u64,
    last_raw: Option<u64>,
    current: i64,
    previous: i64,
}

impl Unwrapper {
    /// Creates an unwrapper for a counter taking values in `0..modulus`.
    pub fn new(modulus: u64) -> Self {
        assert!(modulus >= 2, "counter modulus must be at least 2");
        Self {
            modulus,
            last_raw: None,
            current: 0,
            previous: 0,
        }
    }

    pub fn unwrap(&mut self, raw: u64) -> i64 {
        let raw = raw % self.modulus;
        match self.last_raw {
            None => {
                self.current = raw as i64;
                // pretend the stream advanced by exactly one step
                self.previous = self.current - 1;
            }
            Some(last) => {
                self.previous = self.current;
                self.current += self.signed_delta(raw, last);
            }
        }
        self.last_raw = Some(raw);
        self.current
    }

    /// Signed difference `raw - last` within the counter's range.
    pub fn signed_delta(&self, raw: u64, last: u64) -> i64 {
        let forward = (raw % self.modulus + self.modulus - last % self.modulus) % self.modulus;
        if forward >= self.modulus - self.modulus / 2 {
            forward as i64 - self.modulus as i64
        } else {
            forward as i64
        }
    }

    pub fn current(&self) -> i64 {
        self.current
    }

    pub fn previous(&self) -> i64 {
        self.previous
    }

    /// Step applied by the most recent `unwrap`.
    pub fn delta(&self) -> i64 {
        self.current - self.previous
    }

    pub fn is_started(&self) -> bool {
        self.last_raw.is_some()
    }

    pub fn reset(&mut self) {
        self.last_raw = None;
        self.current = 0;
        self.previous = 0;
    }
}

/// Unwrapper for 16-bit RTP sequence numbers.
#[derive(Debug, Clone)]
pub struct SequenceUnwrapper(Unwrapper);

impl SequenceUnwrapper {
    pub fn new() -> Self {
        Self(Unwrapper::new(1 << 16))
    }

    pub fn unwrap(&mut self, raw: u16) -> i64 {
        self.0.unwrap(raw as u64)
    }

    pub fn delta(&self) -> i64 {
        self.0.delta()
    }

    pub fn current(&self) -> i64 {
        self.0.current()
    }

    pub fn reset(&mut self) {
        self.0.reset()
    }
}

impl Default for SequenceUnwrapper {
    fn default() -> Self {
        Self::new()
    }
}

/// Unwrapper for 32-bit RTP timestamps.
#[derive(Debug, Clone)]
pub struct TimestampUnwrapper(Unwrapper);

impl TimestampUnwrapper {
    pub fn new() -> Self {
        Self(Unwrapper::new(1 << 32))
    }

    pub fn unwrap(&mut self, raw: u32) -> i64 {
        self.0.unwrap(raw as u64)
    }

    pub fn delta(&self) -> i64 {
        self.0.delta()
    }

    pub fn current(&self) -> i64 {
        self.0.current()
    }

    pub fn reset(&mut self) {
        self.0.reset()
    }
}

impl Default for TimestampUnwrapper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::{PCR_RANGE, PTS_RANGE};
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_sequence_wrap() {
        let mut seq = SequenceUnwrapper::new();
        let out: Vec<i64> = [65534u16, 65535, 0, 1, 2]
            .iter()
            .map(|&raw| seq.unwrap(raw))
            .collect();
        assert_eq!(out, vec![65534, 65535, 65536, 65537, 65538]);
    }

    #[test]
    fn test_first_call_fabricates_previous() {
        let mut seq = SequenceUnwrapper::new();
        assert_eq!(seq.unwrap(10), 10);
        assert_eq!(seq.delta(), 1);
    }

    #[test]
    fn test_reordering_is_negative() {
        let mut seq = SequenceUnwrapper::new();
        seq.unwrap(1);
        seq.unwrap(0);
        assert_eq!(seq.current(), 0);
        assert_eq!(seq.delta(), -1);
        // backwards across the wrap point
        assert_eq!(seq.unwrap(65535), -1);
    }

    #[test]
    fn test_timestamp_wrap() {
        let mut ts = TimestampUnwrapper::new();
        ts.unwrap(u32::MAX - 1_499);
        assert_eq!(ts.unwrap(1_500), (1i64 << 32) + 1_500);
        assert_eq!(ts.delta(), 3_000);
    }

    #[test]
    fn test_non_power_of_two_range() {
        let mut pcr = Unwrapper::new(PCR_RANGE);
        pcr.unwrap(PCR_RANGE - 300);
        assert_eq!(pcr.unwrap(300), PCR_RANGE as i64 + 300);

        let mut pts = Unwrapper::new(PTS_RANGE);
        pts.unwrap(100);
        assert_eq!(pts.unwrap(PTS_RANGE - 100), -100);
    }

    #[quickcheck]
    fn prop_steady_increment_is_monotone(start: u16, steps: u16) -> bool {
        let mut seq = SequenceUnwrapper::new();
        let mut raw = start;
        let mut last = seq.unwrap(raw);
        for _ in 0..steps {
            raw = raw.wrapping_add(1);
            let next = seq.unwrap(raw);
            if next != last + 1 {
                return false;
            }
            last = next;
        }
        last == start as i64 + steps as i64
    }

    #[quickcheck]
    fn prop_delta_matches_i16_wrap(a: u16, b: u16) -> bool {
        let unwrapper = Unwrapper::new(1 << 16);
        unwrapper.signed_delta(b as u64, a as u64) == b.wrapping_sub(a) as i16 as i64
    }
}

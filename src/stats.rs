//! Jitter histograms shared by the stream trackers.

use std::fmt;
use std::time::Duration;

/// Default jitter bucket upper bounds.
pub const DEFAULT_JITTER_BOUNDS: [Duration; 10] = [
    Duration::from_millis(1),
    Duration::from_millis(2),
    Duration::from_millis(5),
    Duration::from_millis(10),
    Duration::from_millis(20),
    Duration::from_millis(50),
    Duration::from_millis(100),
    Duration::from_millis(200),
    Duration::from_millis(500),
    Duration::from_millis(1000),
];

/// Fixed-bucket duration histogram.
///
/// Bucket `i` counts samples `<= bounds[i]` (and above the previous bound);
/// the final overflow bucket counts everything larger than the last bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    bounds: Vec<Duration>,
    counts: Vec<u64>,
    total: u64,
    max: Duration,
    sum: Duration,
}

impl Histogram {
    pub fn new(bounds: &[Duration]) -> Self {
        debug_assert!(bounds.windows(2).all(|w| w[0] < w[1]));
        Self {
            bounds: bounds.to_vec(),
            counts: vec![0; bounds.len() + 1],
            total: 0,
            max: Duration::ZERO,
            sum: Duration::ZERO,
        }
    }

    pub fn jitter() -> Self {
        Self::new(&DEFAULT_JITTER_BOUNDS)
    }

    pub fn record(&mut self, sample: Duration) {
        let bucket = self.bounds.partition_point(|&b| b < sample);
        self.counts[bucket] += 1;
        self.total += 1;
        self.max = self.max.max(sample);
        self.sum = self.sum.saturating_add(sample);
    }

    pub fn bounds(&self) -> &[Duration] {
        &self.bounds
    }

    /// Per-bucket counts; one longer than [`Histogram::bounds`].
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn mean(&self) -> Duration {
        if self.total == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos((self.sum.as_nanos() / self.total as u128) as u64)
    }

    pub fn clear(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
        self.total = 0;
        self.max = Duration::ZERO;
        self.sum = Duration::ZERO;
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::jitter()
    }
}

impl fmt::Display for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n={} max={:?} [", self.total, self.max)?;
        for (i, count) in self.counts.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match self.bounds.get(i) {
                Some(bound) => write!(f, "<={:?}:{}", bound, count)?,
                None => write!(f, ">:{}", count)?,
            }
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_bucketing() {
        let mut h = Histogram::new(&[Duration::from_millis(1), Duration::from_millis(10)]);
        h.record(Duration::ZERO);
        h.record(Duration::from_millis(1));
        h.record(Duration::from_millis(5));
        h.record(Duration::from_secs(3));

        assert_eq!(h.counts(), &[2, 1, 1]);
        assert_eq!(h.total(), 4);
        assert_eq!(h.max(), Duration::from_secs(3));
        assert_eq!(h.to_string(), "n=4 max=3s [<=1ms:2 <=10ms:1 >:1]");
    }

    #[test]
    fn test_clear_keeps_bounds() {
        let mut h = Histogram::jitter();
        h.record(Duration::from_millis(3));
        h.clear();
        assert_eq!(h.total(), 0);
        assert_eq!(h.bounds().len(), DEFAULT_JITTER_BOUNDS.len());
        assert!(h.counts().iter().all(|&c| c == 0));
    }
}

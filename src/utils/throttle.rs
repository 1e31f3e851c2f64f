use std::time::{Duration, Instant};

/// Rate limiter for diagnostic output.
///
/// Callers ask [`Throttle::ready`] before emitting a log line; at most one
/// emission per interval is allowed and the number of suppressed calls is
/// handed back so it can be reported with the next emitted line.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
    suppressed: u64,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
            suppressed: 0,
        }
    }

    /// Returns `Some(suppressed)` when a message may be emitted at `now`.
    pub fn ready(&mut self, now: Instant) -> Option<u64> {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => {
                self.suppressed += 1;
                None
            }
            _ => {
                self.last = Some(now);
                Some(std::mem::take(&mut self.suppressed))
            }
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

//----------------------------------------------------------------------------------------------
// Module timestamp
// One monotonic nanosecond clock per transport. Timestamps are stamped as bytes enter the
// reader, not when a user task dequeues them, so application latency never corrupts recorded
// relative times.

use std::time::Instant;

/// Whether timestamps are reported against a captured wall-clock origin or against zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampMode {
    /// Long recordings: origin is the wall-clock instant the clock was constructed.
    Absolute,
    /// Low-latency measurement sessions: origin is zero.
    Relative,
}

#[derive(Debug, Clone)]
pub struct TimestampSource {
    mode: TimestampMode,
    origin: Instant,
}

impl TimestampSource {
    pub fn new(mode: TimestampMode) -> Self {
        TimestampSource { mode, origin: Instant::now() }
    }

    /// Nanoseconds since the clock's origin, monotonic.
    pub fn now_ns(&self) -> u64 {
        match self.mode {
            TimestampMode::Absolute | TimestampMode::Relative => self.origin.elapsed().as_nanos() as u64,
        }
    }

    pub fn mode(&self) -> TimestampMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic() {
        let ts = TimestampSource::new(TimestampMode::Relative);
        let a = ts.now_ns();
        let b = ts.now_ns();
        assert!(b >= a);
    }
}

//! Offset-corrected clock aligned to exchange server time.
//!
//! Every scheduled job and every candle-grid index reads time through this
//! clock so the whole process observes the exchange's clock rather than the
//! local one. The manager feeds it `(ping, server - local)` samples from
//! `GET /fapi/v1/time` and periodically applies the mean offset.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;

/// Maximum retained latency/offset samples.
const SAMPLE_CAPACITY: usize = 360;

/// Minimum samples before an offset shift is applied.
pub const MIN_SAMPLES_FOR_SHIFT: usize = 30;

#[derive(Debug)]
struct ClockInner {
    /// Applied correction, added to local time.
    offset_ms: i64,
    /// Rolling `(ping_ms, raw_offset_ms)` samples.
    samples: VecDeque<(i64, i64)>,
}

/// Offset-corrected UTC clock.
#[derive(Debug)]
pub struct ServerClock {
    inner: RwLock<ClockInner>,
}

impl ServerClock {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(ClockInner {
                offset_ms: 0,
                samples: VecDeque::with_capacity(SAMPLE_CAPACITY),
            }),
        }
    }

    /// Current corrected time.
    pub fn now(&self) -> DateTime<Utc> {
        let offset = self.inner.read().offset_ms;
        Utc::now() + chrono::Duration::milliseconds(offset)
    }

    /// Current corrected time as epoch milliseconds.
    pub fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }

    /// Record one `(ping_ms, server_time - local_time)` sample.
    ///
    /// The raw offset must be measured against the uncorrected local clock.
    pub fn record_sample(&self, ping_ms: i64, raw_offset_ms: i64) {
        let mut inner = self.inner.write();
        if inner.samples.len() == SAMPLE_CAPACITY {
            inner.samples.pop_front();
        }
        inner.samples.push_back((ping_ms, raw_offset_ms));
    }

    /// Shift the observable clock by the mean recorded offset.
    ///
    /// No-op until [`MIN_SAMPLES_FOR_SHIFT`] samples exist. Returns the
    /// applied offset when a shift happened.
    pub fn apply_mean_offset(&self) -> Option<i64> {
        let mut inner = self.inner.write();
        if inner.samples.len() < MIN_SAMPLES_FOR_SHIFT {
            return None;
        }
        let sum: i64 = inner.samples.iter().map(|(_, off)| off).sum();
        let mean = sum / inner.samples.len() as i64;
        inner.offset_ms = mean;
        Some(mean)
    }

    /// Applied correction in milliseconds.
    pub fn offset_ms(&self) -> i64 {
        self.inner.read().offset_ms
    }

    /// Mean ping over the retained samples, if any.
    pub fn mean_ping_ms(&self) -> Option<i64> {
        let inner = self.inner.read();
        if inner.samples.is_empty() {
            return None;
        }
        let sum: i64 = inner.samples.iter().map(|(ping, _)| ping).sum();
        Some(sum / inner.samples.len() as i64)
    }

    /// Number of retained samples.
    pub fn sample_count(&self) -> usize {
        self.inner.read().samples.len()
    }

    /// Force a fixed offset (tests and replay).
    pub fn set_offset_ms(&self, offset_ms: i64) {
        self.inner.write().offset_ms = offset_ms;
    }
}

impl Default for ServerClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to the process clock.
pub type SharedClock = Arc<ServerClock>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_shift_below_minimum_samples() {
        let clock = ServerClock::new();
        for _ in 0..(MIN_SAMPLES_FOR_SHIFT - 1) {
            clock.record_sample(10, 500);
        }
        assert_eq!(clock.apply_mean_offset(), None);
        assert_eq!(clock.offset_ms(), 0);
    }

    #[test]
    fn test_shift_applies_mean() {
        let clock = ServerClock::new();
        for i in 0..MIN_SAMPLES_FOR_SHIFT {
            let off = if i % 2 == 0 { 100 } else { 300 };
            clock.record_sample(10, off);
        }
        assert_eq!(clock.apply_mean_offset(), Some(200));
        assert_eq!(clock.offset_ms(), 200);
    }

    #[test]
    fn test_samples_evict_oldest() {
        let clock = ServerClock::new();
        for _ in 0..(SAMPLE_CAPACITY + 50) {
            clock.record_sample(10, 0);
        }
        assert_eq!(clock.sample_count(), SAMPLE_CAPACITY);
    }

    #[test]
    fn test_forced_offset_moves_now() {
        let clock = ServerClock::new();
        let before = Utc::now().timestamp_millis();
        clock.set_offset_ms(60_000);
        let now = clock.now_ms();
        assert!(now >= before + 59_000, "offset not applied: {}", now - before);
    }

    #[test]
    fn test_mean_ping() {
        let clock = ServerClock::new();
        assert_eq!(clock.mean_ping_ms(), None);
        clock.record_sample(10, 0);
        clock.record_sample(30, 0);
        assert_eq!(clock.mean_ping_ms(), Some(20));
    }
}

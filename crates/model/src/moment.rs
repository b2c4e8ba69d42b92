//! 10-second-aligned UTC instants.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Width of one candle bucket in seconds.
pub const TICK_SECS: i64 = 10;

const TICK_MS: i64 = TICK_SECS * 1000;

/// A UTC instant aligned to a 10-second boundary.
///
/// Stored as epoch milliseconds, always a multiple of 10 000. All candle
/// indices and asset-record causation timestamps are moments.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Moment(i64);

/// A timestamp that does not sit on a 10-second boundary.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("timestamp {0}ms is not aligned to a 10-second boundary")]
pub struct MomentError(pub i64);

impl Moment {
    /// The epoch origin moment.
    pub const EPOCH: Moment = Moment(0);

    /// Construct from epoch milliseconds, rejecting unaligned values.
    pub fn try_from_ms(ms: i64) -> Result<Self, MomentError> {
        if ms.rem_euclid(TICK_MS) == 0 {
            Ok(Self(ms))
        } else {
            Err(MomentError(ms))
        }
    }

    /// Floor an arbitrary epoch-millisecond timestamp to its moment.
    pub fn floor_ms(ms: i64) -> Self {
        Self(ms - ms.rem_euclid(TICK_MS))
    }

    /// Floor a datetime to its moment.
    pub fn floor(dt: DateTime<Utc>) -> Self {
        Self::floor_ms(dt.timestamp_millis())
    }

    /// Construct from a datetime, rejecting unaligned values.
    pub fn try_new(dt: DateTime<Utc>) -> Result<Self, MomentError> {
        Self::try_from_ms(dt.timestamp_millis())
    }

    pub fn as_ms(&self) -> i64 {
        self.0
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.0).unwrap()
    }

    /// The following moment (+10 s).
    pub fn next(&self) -> Self {
        Self(self.0 + TICK_MS)
    }

    /// The preceding moment (-10 s).
    pub fn prev(&self) -> Self {
        Self(self.0 - TICK_MS)
    }

    /// Shift by whole seconds; the shift must preserve alignment.
    pub fn offset_secs(&self, secs: i64) -> Result<Self, MomentError> {
        Self::try_from_ms(self.0 + secs * 1000)
    }

    /// Shift by `n` buckets.
    pub fn offset_rows(&self, n: i64) -> Self {
        Self(self.0 + n * TICK_MS)
    }

    /// Calendar year of the instant.
    pub fn year(&self) -> i32 {
        self.datetime().year()
    }

    /// Second-of-minute, always one of `{0, 10, 20, 30, 40, 50}`.
    pub fn second(&self) -> u32 {
        self.datetime().second()
    }

    /// Half-open range `[start, end)` stepped by 10 seconds.
    pub fn range(start: Moment, end: Moment) -> impl Iterator<Item = Moment> {
        let mut cur = start;
        std::iter::from_fn(move || {
            if cur < end {
                let out = cur;
                cur = cur.next();
                Some(out)
            } else {
                None
            }
        })
    }
}

impl fmt::Display for Moment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.datetime().format("%Y-%m-%dT%H:%M:%SZ"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_enforced() {
        assert!(Moment::try_from_ms(1_700_000_000_000).is_ok());
        assert_eq!(
            Moment::try_from_ms(1_700_000_003_000),
            Err(MomentError(1_700_000_003_000))
        );
        assert_eq!(
            Moment::try_from_ms(1_700_000_000_001),
            Err(MomentError(1_700_000_000_001))
        );
    }

    #[test]
    fn test_floor() {
        let m = Moment::floor_ms(1_700_000_009_999);
        assert_eq!(m.as_ms(), 1_700_000_000_000);
        assert_eq!(Moment::floor_ms(1_700_000_000_000).as_ms(), 1_700_000_000_000);
    }

    #[test]
    fn test_second_is_on_tens() {
        let mut m = Moment::floor_ms(1_700_000_000_000);
        for _ in 0..12 {
            assert_eq!(m.second() % 10, 0);
            assert_eq!(m.datetime().timestamp_subsec_micros(), 0);
            m = m.next();
        }
    }

    #[test]
    fn test_range_is_half_open() {
        let start = Moment::try_from_ms(0).unwrap();
        let end = start.offset_rows(3);
        let moments: Vec<_> = Moment::range(start, end).collect();
        assert_eq!(moments.len(), 3);
        assert_eq!(moments[0], start);
        assert_eq!(moments[2], end.prev());
    }

    #[test]
    fn test_offset_secs_alignment() {
        let m = Moment::EPOCH;
        assert!(m.offset_secs(20).is_ok());
        assert!(m.offset_secs(15).is_err());
    }
}

//! Bounded FIFO rings of realtime WebSocket events.
//!
//! Each ring has a single producer (its WebSocket handler) and read-only
//! consumers (candle synthesis, the GUI). Oldest events are evicted on
//! overflow. Reads happen on the runtime thread, so a read-preferring lock
//! around a `VecDeque` is sufficient.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Capacity of the shared book-ticker/mark-price ring.
pub const QUOTE_RING_CAPACITY: usize = 1 << 22;

/// Capacity of the aggregate-trade ring.
pub const TRADE_RING_CAPACITY: usize = 1 << 20;

/// Best bid/ask snapshot from `{symbol}@bookTicker`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookTicker {
    pub ts_ms: i64,
    pub symbol: String,
    pub best_bid: f64,
    pub best_ask: f64,
}

/// Mark price from `!markPrice@arr@1s`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkPrice {
    pub ts_ms: i64,
    pub symbol: String,
    pub price: f64,
}

/// Event stored in the shared quote ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QuoteEvent {
    Book(BookTicker),
    Mark(MarkPrice),
}

impl QuoteEvent {
    pub fn ts_ms(&self) -> i64 {
        match self {
            Self::Book(e) => e.ts_ms,
            Self::Mark(e) => e.ts_ms,
        }
    }
}

/// One aggregate trade from `{symbol}@aggTrade`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateTrade {
    pub ts_ms: i64,
    pub symbol: String,
    pub price: f64,
    pub volume: f64,
}

/// Bounded FIFO of events, oldest evicted on overflow.
#[derive(Debug)]
pub struct EventRing<T> {
    inner: RwLock<VecDeque<T>>,
    capacity: usize,
}

impl<T: Clone> EventRing<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(VecDeque::new()),
            capacity,
        }
    }

    /// Append one event, evicting the oldest at capacity.
    pub fn push(&self, event: T) {
        let mut ring = self.inner.write();
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Drop everything (reconnect hygiene).
    pub fn clear(&self) {
        self.inner.write().clear();
    }

    /// Clone the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.read().iter().cloned().collect()
    }

    /// The oldest retained event, cloned.
    pub fn front(&self) -> Option<T> {
        self.inner.read().front().cloned()
    }
}

impl EventRing<AggregateTrade> {
    /// Trades with `start_ms < ts < end_ms` (both bounds exclusive).
    ///
    /// The start bound is exclusive so a trade sitting exactly on a ring
    /// boundary is never counted into two buckets.
    pub fn trades_between(&self, start_ms: i64, end_ms: i64) -> Vec<AggregateTrade> {
        self.inner
            .read()
            .iter()
            .filter(|t| t.ts_ms > start_ms && t.ts_ms < end_ms)
            .cloned()
            .collect()
    }

    /// Timestamp of the oldest retained trade.
    pub fn first_ts_ms(&self) -> Option<i64> {
        self.inner.read().front().map(|t| t.ts_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(ts_ms: i64, price: f64) -> AggregateTrade {
        AggregateTrade {
            ts_ms,
            symbol: "BTCUSDT".into(),
            price,
            volume: 1.0,
        }
    }

    #[test]
    fn test_eviction_at_capacity() {
        let ring = EventRing::new(3);
        for i in 0..5 {
            ring.push(trade(i, i as f64));
        }

        assert_eq!(ring.len(), 3);
        assert_eq!(ring.first_ts_ms(), Some(2));
    }

    #[test]
    fn test_trades_between_bounds_exclusive() {
        let ring = EventRing::new(16);
        for ts in [1000, 2000, 3000, 4000] {
            ring.push(trade(ts, 1.0));
        }

        let slice = ring.trades_between(1000, 4000);
        let times: Vec<i64> = slice.iter().map(|t| t.ts_ms).collect();
        assert_eq!(times, vec![2000, 3000]);
    }

    #[test]
    fn test_clear() {
        let ring = EventRing::new(16);
        ring.push(trade(1, 1.0));
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.first_ts_ms(), None);
    }
}

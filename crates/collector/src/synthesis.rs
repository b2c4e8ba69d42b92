//! Candle synthesis from aggregate trades.

use model::{AggregateTrade, Candle, Moment};
use std::collections::BTreeMap;

/// Fold one bucket's trades into a candle.
///
/// Returns `None` for an empty slice; callers decide whether to inherit a
/// close or skip the cell.
pub fn synthesize_candle(trades: &[AggregateTrade]) -> Option<Candle> {
    let first = trades.first()?;
    let mut candle = Candle {
        open: first.price as f32,
        high: first.price as f32,
        low: first.price as f32,
        close: trades.last().map(|t| t.price as f32)?,
        volume: 0.0,
    };
    for trade in trades {
        let price = trade.price as f32;
        candle.high = candle.high.max(price);
        candle.low = candle.low.min(price);
        candle.volume += trade.volume as f32;
    }
    Some(candle)
}

/// Group trades into 10-second buckets and synthesize each.
///
/// Only buckets fully covered by the trade span are returned: a bucket
/// whose end lies beyond the last trade may still receive trades, so it is
/// withheld until later data proves it complete. `ts_bound_ms`, when given,
/// overrides the last-trade bound (REST paging knows how far it fetched).
pub fn bucket_candles(
    trades: &[AggregateTrade],
    ts_bound_ms: Option<i64>,
) -> BTreeMap<Moment, Candle> {
    let Some(last) = trades.last() else {
        return BTreeMap::new();
    };
    let bound_ms = ts_bound_ms.unwrap_or(last.ts_ms);

    let mut buckets: BTreeMap<Moment, Vec<&AggregateTrade>> = BTreeMap::new();
    for trade in trades {
        buckets.entry(Moment::floor_ms(trade.ts_ms)).or_default().push(trade);
    }

    buckets
        .into_iter()
        .filter(|(moment, _)| moment.next().as_ms() <= bound_ms)
        .filter_map(|(moment, bucket)| {
            let owned: Vec<AggregateTrade> = bucket.into_iter().cloned().collect();
            synthesize_candle(&owned).map(|c| (moment, c))
        })
        .collect()
}

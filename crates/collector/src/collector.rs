//! The collector component: grid ownership, candle synthesis, gap filling,
//! hourly persistence.

use crate::error::CollectorError;
use crate::persist::{load_partition, save_partition};
use crate::stream::{run_market_stream, StreamKind};
use crate::synthesis::{bucket_candles, synthesize_candle};
use binance_rest::BinanceFuturesClient;
use common::{BinanceEnvironment, DataPaths, SharedClock};
use model::{
    AggregateTrade, Candle, CandleGrid, EventRing, Moment, QuoteEvent, QUOTE_RING_CAPACITY,
    TRADE_RING_CAPACITY,
};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Close inheritance looks back this many rows for a zero-trade bucket.
const INHERIT_LOOKBACK_ROWS: usize = 60;

/// Non-NaN rows expected over 24 h before the gap filler stands down.
const FULL_DAY_ROWS: usize = (86_400 - 60) / 10 + 1;

/// REST calls the gap filler may spend per tick.
const MAX_FILL_CALLS_PER_TICK: usize = 10;

/// Page size for aggTrades fetches.
const FILL_PAGE_LIMIT: u32 = 1000;

/// Point-in-time collector health for the status panel.
#[derive(Debug, Clone)]
pub struct CollectorStatus {
    pub cumulation_rate: f64,
    pub last_moment: Option<Moment>,
    pub quote_ring_len: usize,
    pub trade_ring_len: usize,
    pub gone_symbols: Vec<String>,
}

/// Owns the candle grid and both realtime rings.
pub struct Collector {
    symbols: Vec<String>,
    environment: BinanceEnvironment,
    paths: DataPaths,
    client: Arc<BinanceFuturesClient>,
    clock: SharedClock,
    grid: Arc<RwLock<CandleGrid>>,
    quote_ring: Arc<EventRing<QuoteEvent>>,
    trade_ring: Arc<EventRing<AggregateTrade>>,
    gone_symbols: RwLock<HashSet<String>>,
}

impl Collector {
    /// Create a collector, loading the current-year partition if present.
    pub fn new(
        symbols: Vec<String>,
        environment: BinanceEnvironment,
        paths: DataPaths,
        client: Arc<BinanceFuturesClient>,
        clock: SharedClock,
    ) -> Result<Self, CollectorError> {
        let year = Moment::floor(clock.now()).year();
        let mut grid = match load_partition(&paths, year)? {
            Some(grid) => {
                info!(year, rows = grid.len(), "loaded candle partition");
                grid
            }
            None => CandleGrid::new(),
        };
        for symbol in &symbols {
            grid.ensure_symbol(symbol);
        }

        Ok(Self {
            symbols,
            environment,
            paths,
            client,
            clock,
            grid: Arc::new(RwLock::new(grid)),
            quote_ring: Arc::new(EventRing::new(QUOTE_RING_CAPACITY)),
            trade_ring: Arc::new(EventRing::new(TRADE_RING_CAPACITY)),
            gone_symbols: RwLock::new(HashSet::new()),
        })
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    pub fn client(&self) -> &Arc<BinanceFuturesClient> {
        &self.client
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Read-locked grid shared with the transactor, simulator, and GUI.
    pub fn grid(&self) -> Arc<RwLock<CandleGrid>> {
        self.grid.clone()
    }

    pub fn quote_ring(&self) -> Arc<EventRing<QuoteEvent>> {
        self.quote_ring.clone()
    }

    pub fn trade_ring(&self) -> Arc<EventRing<AggregateTrade>> {
        self.trade_ring.clone()
    }

    /// Spawn the three WebSocket subscriptions.
    pub fn spawn_streams(&self, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut kinds = vec![StreamKind::MarkPriceArray];
        for symbol in &self.symbols {
            kinds.push(StreamKind::BookTicker(symbol.clone()));
            kinds.push(StreamKind::AggTrade(symbol.clone()));
        }

        kinds
            .into_iter()
            .map(|kind| {
                tokio::spawn(run_market_stream(
                    kind,
                    self.environment,
                    self.quote_ring.clone(),
                    self.trade_ring.clone(),
                    shutdown_rx.clone(),
                ))
            })
            .collect()
    }

    /// One 10-second tick: synthesize the previous bucket, then fill holes.
    pub async fn on_tick(&self) {
        let tick = Moment::floor(self.clock.now());
        self.synthesize_tick(tick);
        self.fill_holes(tick).await;
    }

    /// Fold the ring's trades for `[tick-10s, tick)` into one grid row.
    pub fn synthesize_tick(&self, tick: Moment) {
        let bucket = tick.prev();

        // The ring must reach back past the bucket start, otherwise the
        // process has not been watching long enough to trust this row.
        match self.trade_ring.first_ts_ms() {
            Some(first_ts) if first_ts <= bucket.as_ms() => {}
            _ => return,
        }

        let trades = self.trade_ring.trades_between(bucket.as_ms(), tick.as_ms());
        let mut by_symbol: HashMap<&str, Vec<AggregateTrade>> = HashMap::new();
        for trade in &trades {
            by_symbol
                .entry(trade.symbol.as_str())
                .or_default()
                .push(trade.clone());
        }

        let mut grid = self.grid.write();
        for symbol in &self.symbols {
            match by_symbol.get(symbol.as_str()).and_then(|t| synthesize_candle(t)) {
                Some(candle) => grid.set(bucket, symbol, candle),
                None => {
                    // No trade in this bucket: pin OHLC at the last close
                    // seen within the lookback, or skip entirely.
                    if let Some(close) =
                        grid.inherited_close(symbol, bucket, INHERIT_LOOKBACK_ROWS)
                    {
                        grid.set(bucket, symbol, Candle::flat(close));
                    }
                }
            }
        }
    }

    /// Repair holes in the trailing 24 hours with REST aggTrades paging.
    ///
    /// REST errors are swallowed per iteration; the next tick retries.
    pub async fn fill_holes(&self, now: Moment) {
        let day_ago = now.offset_rows(-8640);
        let mut calls_left = MAX_FILL_CALLS_PER_TICK;

        for symbol in &self.symbols {
            if calls_left == 0 {
                break;
            }
            if self.gone_symbols.read().contains(symbol) {
                continue;
            }

            let (observed, first_missing) = {
                let grid = self.grid.read();
                (
                    grid.observed_rows(symbol, day_ago, now),
                    grid.first_missing_moment(symbol, day_ago, now),
                )
            };
            if observed >= FULL_DAY_ROWS {
                continue;
            }
            let Some(missing) = first_missing else {
                continue;
            };

            match self
                .fill_symbol_from(symbol, missing, now, &mut calls_left)
                .await
            {
                Ok(()) => {}
                Err(CollectorError::MissingHistoricalData(symbol)) => {
                    warn!(symbol = %symbol, "symbol has no data on the exchange, marking gone");
                    self.gone_symbols.write().insert(symbol);
                }
                Err(e) => {
                    debug!(symbol = %symbol, error = %e, "gap fill failed, will retry next tick");
                }
            }
        }
    }

    /// Page aggTrades forward from `missing` until at least the next bucket
    /// is covered, then merge the synthesized candles.
    async fn fill_symbol_from(
        &self,
        symbol: &str,
        missing: Moment,
        now: Moment,
        calls_left: &mut usize,
    ) -> Result<(), CollectorError> {
        let target_ms = missing.next().as_ms();
        let mut start_ms = missing.as_ms();
        let mut collected: Vec<AggregateTrade> = Vec::new();
        let mut coverage_ms = start_ms;

        while *calls_left > 0 {
            *calls_left -= 1;
            let page = self
                .client
                .agg_trades(symbol, start_ms, FILL_PAGE_LIMIT)
                .await?;

            if page.is_empty() {
                if collected.is_empty() {
                    return Err(CollectorError::MissingHistoricalData(symbol.to_string()));
                }
                coverage_ms = now.as_ms();
                break;
            }

            let last_ts = page.last().map(|t| t.timestamp_ms).unwrap_or(start_ms);
            let short_page = page.len() < FILL_PAGE_LIMIT as usize;
            collected.extend(page.into_iter().map(|t| AggregateTrade {
                ts_ms: t.timestamp_ms,
                symbol: symbol.to_string(),
                price: t.price,
                volume: t.qty,
            }));

            // A short page means every trade up to now is in hand.
            coverage_ms = if short_page { now.as_ms() } else { last_ts };
            start_ms = last_ts + 1;

            if coverage_ms >= target_ms {
                break;
            }
        }

        if collected.is_empty() {
            return Ok(());
        }

        let candles = bucket_candles(&collected, Some(coverage_ms));
        let mut grid = self.grid.write();
        for (moment, candle) in candles {
            grid.set(moment, symbol, candle);
        }
        debug!(symbol = %symbol, from = %missing, "gap filled");
        Ok(())
    }

    /// Rewrite the current-year partition (hourly job).
    pub fn persist_current_year(&self) -> Result<(), CollectorError> {
        let year = Moment::floor(self.clock.now()).year();
        let grid = self.grid.read();
        save_partition(&self.paths, &grid, year)
    }

    /// Trailing-24h cumulation rate over the non-gone target symbols.
    pub fn cumulation_rate(&self) -> f64 {
        let now = Moment::floor(self.clock.now());
        let gone = self.gone_symbols.read();
        let watched: Vec<&String> = self
            .symbols
            .iter()
            .filter(|s| !gone.contains(s.as_str()))
            .collect();
        if watched.is_empty() {
            return 0.0;
        }
        self.grid.read().cumulation_rate(&watched, now)
    }

    pub fn status(&self) -> CollectorStatus {
        CollectorStatus {
            cumulation_rate: self.cumulation_rate(),
            last_moment: self.grid.read().last_moment(),
            quote_ring_len: self.quote_ring.len(),
            trade_ring_len: self.trade_ring.len(),
            gone_symbols: self.gone_symbols.read().iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth::ApiCredentials;
    use common::ServerClock;

    fn test_collector() -> Collector {
        let dir = std::env::temp_dir().join(format!(
            "collector_test_{}_{:?}",
            std::process::id(),
            std::thread::current().id()
        ));
        let paths = DataPaths::new(&dir);
        paths.ensure_dirs().unwrap();
        let clock: SharedClock = Arc::new(ServerClock::new());
        let client = Arc::new(
            BinanceFuturesClient::new(
                ApiCredentials::new("key".into(), "secret".into()),
                BinanceEnvironment::Testnet,
                clock.clone(),
            )
            .unwrap(),
        );
        Collector::new(
            vec!["BTCUSDT".into(), "ETHUSDT".into()],
            BinanceEnvironment::Testnet,
            paths,
            client,
            clock,
        )
        .unwrap()
    }

    fn trade(ts_ms: i64, symbol: &str, price: f64, volume: f64) -> AggregateTrade {
        AggregateTrade {
            ts_ms,
            symbol: symbol.into(),
            price,
            volume,
        }
    }

    #[test]
    fn test_synthesize_tick_writes_ohlcv() {
        let collector = test_collector();
        let t0 = Moment::try_from_ms(1_700_000_000_000).unwrap();
        let tick = t0.next();

        // Ring reaches back before the bucket start.
        collector.trade_ring.push(trade(t0.as_ms() - 5_000, "BTCUSDT", 99.0, 1.0));
        collector.trade_ring.push(trade(t0.as_ms() + 1_000, "BTCUSDT", 100.0, 1.0));
        collector.trade_ring.push(trade(t0.as_ms() + 3_000, "BTCUSDT", 110.0, 2.0));
        collector.trade_ring.push(trade(t0.as_ms() + 7_000, "BTCUSDT", 90.0, 3.0));

        collector.synthesize_tick(tick);

        let grid = collector.grid.read();
        let candle = grid.get(t0, "BTCUSDT").unwrap();
        assert_eq!(candle.open, 100.0);
        assert_eq!(candle.high, 110.0);
        assert_eq!(candle.low, 90.0);
        assert_eq!(candle.close, 90.0);
        assert_eq!(candle.volume, 6.0);
    }

    #[test]
    fn test_synthesize_tick_inherits_close_for_quiet_symbol() {
        let collector = test_collector();
        let t0 = Moment::try_from_ms(1_700_000_000_000).unwrap();
        let tick = t0.next();

        collector
            .grid
            .write()
            .set(t0.prev(), "ETHUSDT", Candle::flat(3000.0));

        collector.trade_ring.push(trade(t0.as_ms() - 5_000, "BTCUSDT", 99.0, 1.0));
        collector.trade_ring.push(trade(t0.as_ms() + 1_000, "BTCUSDT", 100.0, 1.0));

        collector.synthesize_tick(tick);

        let grid = collector.grid.read();
        let eth = grid.get(t0, "ETHUSDT").unwrap();
        assert_eq!(eth.close, 3000.0);
        assert_eq!(eth.open, 3000.0);
        assert_eq!(eth.volume, 0.0);
    }

    #[test]
    fn test_synthesize_tick_guard_short_ring() {
        let collector = test_collector();
        let t0 = Moment::try_from_ms(1_700_000_000_000).unwrap();
        let tick = t0.next();

        // First ring event is newer than the bucket start: not watching
        // long enough, row must not be written.
        collector.trade_ring.push(trade(t0.as_ms() + 1_000, "BTCUSDT", 100.0, 1.0));
        collector.synthesize_tick(tick);

        assert!(collector.grid.read().get(t0, "BTCUSDT").is_none());
    }

    #[test]
    fn test_synthesize_tick_empty_ring() {
        let collector = test_collector();
        let tick = Moment::try_from_ms(1_700_000_000_000).unwrap();
        collector.synthesize_tick(tick);
        assert!(collector.grid.read().is_empty());
    }
}

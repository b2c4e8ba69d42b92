//! Dense time-indexed OHLCV grid.
//!
//! Rows are [`Moment`]s at 10-second frequency, columns are per-symbol
//! candles of `f32` fields. NaN denotes "no trade observed in this bucket"
//! and is fillable by the gap filler. The index is unique and monotonically
//! increasing after every write.

use crate::moment::Moment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ideal non-NaN row count over a trailing 24 hours.
///
/// The first minute after a cold start can never be observed live, so the
/// denominator excludes six buckets: `8640 - 6`.
pub const IDEAL_DAY_ROWS: usize = 8640 - 6;

/// Candle fields, in column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandleField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl CandleField {
    /// Parse a field name as scripts spell it.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "OPEN" => Some(Self::Open),
            "HIGH" => Some(Self::High),
            "LOW" => Some(Self::Low),
            "CLOSE" => Some(Self::Close),
            "VOLUME" => Some(Self::Volume),
            _ => None,
        }
    }
}

/// One OHLCV cell group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: f32,
    pub high: f32,
    pub low: f32,
    pub close: f32,
    pub volume: f32,
}

impl Candle {
    /// The unobserved bucket.
    pub const EMPTY: Candle = Candle {
        open: f32::NAN,
        high: f32::NAN,
        low: f32::NAN,
        close: f32::NAN,
        volume: f32::NAN,
    };

    /// A zero-volume candle pinned at an inherited close.
    pub fn flat(close: f32) -> Self {
        Self {
            open: close,
            high: close,
            low: close,
            close,
            volume: 0.0,
        }
    }

    /// Whether this bucket holds no observation.
    pub fn is_empty(&self) -> bool {
        self.close.is_nan()
    }

    pub fn field(&self, field: CandleField) -> f32 {
        match field {
            CandleField::Open => self.open,
            CandleField::High => self.high,
            CandleField::Low => self.low,
            CandleField::Close => self.close,
            CandleField::Volume => self.volume,
        }
    }
}

/// The candle grid over all target symbols.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandleGrid {
    index: Vec<Moment>,
    columns: BTreeMap<String, Vec<Candle>>,
}

impl CandleGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a grid with empty columns for the given symbols.
    pub fn with_symbols<S: AsRef<str>>(symbols: &[S]) -> Self {
        let mut grid = Self::new();
        for symbol in symbols {
            grid.ensure_symbol(symbol.as_ref());
        }
        grid
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|s| s.as_str())
    }

    pub fn index(&self) -> &[Moment] {
        &self.index
    }

    pub fn first_moment(&self) -> Option<Moment> {
        self.index.first().copied()
    }

    pub fn last_moment(&self) -> Option<Moment> {
        self.index.last().copied()
    }

    /// Register a symbol column, backfilled with empty candles.
    pub fn ensure_symbol(&mut self, symbol: &str) {
        if !self.columns.contains_key(symbol) {
            self.columns
                .insert(symbol.to_string(), vec![Candle::EMPTY; self.index.len()]);
        }
    }

    fn row_position(&self, moment: Moment) -> Result<usize, usize> {
        self.index.binary_search(&moment)
    }

    /// Write one symbol's candle at a moment, creating the row if absent.
    ///
    /// Appends to the tail and re-sorts only when the new index would not be
    /// monotonically after the last row, so the common in-order write is
    /// O(1) amortized.
    pub fn set(&mut self, moment: Moment, symbol: &str, candle: Candle) {
        self.ensure_symbol(symbol);

        let row = match self.row_position(moment) {
            Ok(row) => row,
            Err(_) => {
                let needs_sort = self.index.last().is_some_and(|last| *last > moment);
                self.index.push(moment);
                for column in self.columns.values_mut() {
                    column.push(Candle::EMPTY);
                }
                if needs_sort {
                    self.sort_rows();
                    match self.row_position(moment) {
                        Ok(row) => row,
                        // Unreachable: the moment was just inserted.
                        Err(row) => row,
                    }
                } else {
                    self.index.len() - 1
                }
            }
        };

        if let Some(column) = self.columns.get_mut(symbol) {
            column[row] = candle;
        }
    }

    pub fn get(&self, moment: Moment, symbol: &str) -> Option<Candle> {
        let row = self.row_position(moment).ok()?;
        self.columns.get(symbol).map(|c| c[row])
    }

    fn sort_rows(&mut self) {
        let mut order: Vec<usize> = (0..self.index.len()).collect();
        order.sort_by_key(|&i| self.index[i]);

        self.index = order.iter().map(|&i| self.index[i]).collect();
        for column in self.columns.values_mut() {
            *column = order.iter().map(|&i| column[i]).collect();
        }
    }

    /// Last non-NaN close within `lookback` rows strictly before `moment`.
    pub fn inherited_close(&self, symbol: &str, moment: Moment, lookback: usize) -> Option<f32> {
        let column = self.columns.get(symbol)?;
        let upper = match self.row_position(moment) {
            Ok(row) => row,
            Err(insertion) => insertion,
        };
        let lower = upper.saturating_sub(lookback);
        column[lower..upper]
            .iter()
            .rev()
            .map(|c| c.close)
            .find(|c| !c.is_nan())
    }

    /// Count of non-NaN rows for `symbol` in `[start, end)`.
    pub fn observed_rows(&self, symbol: &str, start: Moment, end: Moment) -> usize {
        let Some(column) = self.columns.get(symbol) else {
            return 0;
        };
        let lower = self.row_position(start).unwrap_or_else(|i| i);
        let upper = self.row_position(end).unwrap_or_else(|i| i);
        column[lower..upper].iter().filter(|c| !c.is_empty()).count()
    }

    /// First moment in `[start, end)` whose cell for `symbol` is missing.
    ///
    /// Walks the dense moment range, so wholly absent rows count as missing.
    pub fn first_missing_moment(&self, symbol: &str, start: Moment, end: Moment) -> Option<Moment> {
        Moment::range(start, end).find(|&m| match self.get(m, symbol) {
            Some(candle) => candle.is_empty(),
            None => true,
        })
    }

    /// Trailing-24h cumulation rate, the minimum across the given symbols.
    ///
    /// 1.0 means every expected bucket holds data (denominator
    /// [`IDEAL_DAY_ROWS`]); the rate is clamped to 1.0.
    pub fn cumulation_rate<S: AsRef<str>>(&self, symbols: &[S], now: Moment) -> f64 {
        let start = now.offset_rows(-(8640));
        symbols
            .iter()
            .map(|s| {
                let observed = self.observed_rows(s.as_ref(), start, now);
                (observed as f64 / IDEAL_DAY_ROWS as f64).min(1.0)
            })
            .fold(1.0_f64, f64::min)
    }

    /// Cloned sub-grid covering `[start, end)`.
    pub fn window(&self, start: Moment, end: Moment) -> CandleWindow {
        let lower = self.row_position(start).unwrap_or_else(|i| i);
        let upper = self.row_position(end).unwrap_or_else(|i| i);

        CandleWindow {
            index: self.index[lower..upper].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|(symbol, column)| (symbol.clone(), column[lower..upper].to_vec()))
                .collect(),
        }
    }

    /// Cloned sub-grid of every row in the given calendar year.
    pub fn year_partition(&self, year: i32) -> CandleGrid {
        let rows: Vec<usize> = (0..self.index.len())
            .filter(|&i| self.index[i].year() == year)
            .collect();

        CandleGrid {
            index: rows.iter().map(|&i| self.index[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|(symbol, column)| {
                    (symbol.clone(), rows.iter().map(|&i| column[i]).collect())
                })
                .collect(),
        }
    }

    /// Merge another grid into this one.
    ///
    /// Non-empty cells from `other` win; empty cells never overwrite data.
    pub fn merge(&mut self, other: &CandleGrid) {
        for (symbol, column) in &other.columns {
            for (row, candle) in column.iter().enumerate() {
                if !candle.is_empty() {
                    self.set(other.index[row], symbol, *candle);
                }
            }
        }
    }
}

/// An immutable cloned window of the grid handed to the strategy kernel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandleWindow {
    index: Vec<Moment>,
    columns: BTreeMap<String, Vec<Candle>>,
}

impl CandleWindow {
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[Moment] {
        &self.index
    }

    pub fn series(&self, symbol: &str) -> Option<&[Candle]> {
        self.columns.get(symbol).map(|c| c.as_slice())
    }

    /// Field column for a symbol as an owned f32 series.
    pub fn field_series(&self, symbol: &str, field: CandleField) -> Option<Vec<f32>> {
        self.columns
            .get(symbol)
            .map(|column| column.iter().map(|c| c.field(field)).collect())
    }

    /// The final row's candle for a symbol.
    pub fn last_candle(&self, symbol: &str) -> Option<Candle> {
        self.columns.get(symbol).and_then(|c| c.last().copied())
    }

    /// Sub-window covering `[start, end)` by row index.
    pub fn slice_rows(&self, lower: usize, upper: usize) -> CandleWindow {
        let upper = upper.min(self.index.len());
        let lower = lower.min(upper);
        CandleWindow {
            index: self.index[lower..upper].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|(symbol, column)| (symbol.clone(), column[lower..upper].to_vec()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(n: i64) -> Moment {
        Moment::try_from_ms(n * 10_000).unwrap()
    }

    #[test]
    fn test_set_get_roundtrip() {
        let mut grid = CandleGrid::new();
        grid.set(m(1), "BTCUSDT", Candle::flat(100.0));

        let candle = grid.get(m(1), "BTCUSDT").unwrap();
        assert_eq!(candle.close, 100.0);
        assert_eq!(candle.volume, 0.0);
        assert!(grid.get(m(2), "BTCUSDT").is_none());
    }

    #[test]
    fn test_index_unique_and_sorted_after_out_of_order_write() {
        let mut grid = CandleGrid::new();
        grid.set(m(3), "BTCUSDT", Candle::flat(3.0));
        grid.set(m(1), "BTCUSDT", Candle::flat(1.0));
        grid.set(m(2), "BTCUSDT", Candle::flat(2.0));
        grid.set(m(2), "BTCUSDT", Candle::flat(2.5));

        let index = grid.index();
        assert_eq!(index.len(), 3);
        assert!(index.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(grid.get(m(2), "BTCUSDT").unwrap().close, 2.5);
    }

    #[test]
    fn test_new_symbol_backfills_empty() {
        let mut grid = CandleGrid::new();
        grid.set(m(1), "BTCUSDT", Candle::flat(1.0));
        grid.set(m(2), "ETHUSDT", Candle::flat(2.0));

        assert!(grid.get(m(1), "ETHUSDT").unwrap().is_empty());
        assert!(grid.get(m(2), "BTCUSDT").unwrap().is_empty());
    }

    #[test]
    fn test_inherited_close_within_lookback() {
        let mut grid = CandleGrid::new();
        grid.set(m(0), "BTCUSDT", Candle::flat(50.0));
        for i in 1..5 {
            grid.set(m(i), "BTCUSDT", Candle::EMPTY);
        }

        assert_eq!(grid.inherited_close("BTCUSDT", m(5), 60), Some(50.0));
        assert_eq!(grid.inherited_close("BTCUSDT", m(5), 3), None);
    }

    #[test]
    fn test_first_missing_moment_sees_absent_rows() {
        let mut grid = CandleGrid::new();
        grid.set(m(0), "BTCUSDT", Candle::flat(1.0));
        grid.set(m(2), "BTCUSDT", Candle::flat(1.0));

        assert_eq!(grid.first_missing_moment("BTCUSDT", m(0), m(3)), Some(m(1)));
        assert_eq!(grid.first_missing_moment("BTCUSDT", m(0), m(1)), None);
    }

    #[test]
    fn test_window_bounds() {
        let mut grid = CandleGrid::new();
        for i in 0..10 {
            grid.set(m(i), "BTCUSDT", Candle::flat(i as f32));
        }

        let window = grid.window(m(2), m(5));
        assert_eq!(window.len(), 3);
        assert_eq!(window.last_candle("BTCUSDT").unwrap().close, 4.0);
    }

    #[test]
    fn test_year_partition_and_merge() {
        let mut grid = CandleGrid::new();
        // 2021-01-01T00:00:00Z = 1609459200s
        let y2021 = Moment::try_from_ms(1_609_459_200_000).unwrap();
        let y2020 = y2021.offset_rows(-10);
        grid.set(y2020, "BTCUSDT", Candle::flat(1.0));
        grid.set(y2021, "BTCUSDT", Candle::flat(2.0));

        let partition = grid.year_partition(2021);
        assert_eq!(partition.len(), 1);
        assert_eq!(partition.first_moment(), Some(y2021));

        let mut target = CandleGrid::new();
        target.set(y2021, "BTCUSDT", Candle::EMPTY);
        target.merge(&partition);
        assert_eq!(target.get(y2021, "BTCUSDT").unwrap().close, 2.0);
    }

    #[test]
    fn test_cumulation_rate_counts_min_across_symbols() {
        let mut grid = CandleGrid::new();
        let now = m(8640);
        for i in 0..8640 {
            grid.set(m(i), "BTCUSDT", Candle::flat(1.0));
            if i % 2 == 0 {
                grid.set(m(i), "ETHUSDT", Candle::flat(1.0));
            }
        }

        let rate_btc = grid.cumulation_rate(&["BTCUSDT"], now);
        assert!((rate_btc - 1.0).abs() < 1e-9);

        let rate_both = grid.cumulation_rate(&["BTCUSDT", "ETHUSDT"], now);
        assert!(rate_both < 0.55);
    }
}

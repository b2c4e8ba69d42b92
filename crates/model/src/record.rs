//! Time-indexed records of fills, unrealized profit, and auto-order ids.

use crate::moment::Moment;
use serde::{Deserialize, Serialize};

/// Why an asset-record row exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordCause {
    /// A fill of an order this platform placed.
    AutoTrade,
    /// A fill of an order placed outside the platform.
    ManualTrade,
    /// Funding fee, transfer, or referral adjustment without a trade side.
    Other,
}

/// Side of a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillSide {
    Buy,
    Sell,
}

/// Liquidity role of a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillRole {
    Maker,
    Taker,
}

/// One asset-record row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetEntry {
    /// Fill instant, epoch milliseconds, unique within the record.
    pub ts_ms: i64,
    pub cause: RecordCause,
    /// Empty for `Other` rows.
    pub symbol: String,
    /// `None` for `Other` rows.
    pub side: Option<FillSide>,
    pub fill_price: f64,
    pub role: Option<FillRole>,
    /// Fraction of the wallet consumed at fill.
    pub margin_ratio: f64,
    pub order_id: u64,
    /// Post-fill wallet balance.
    pub result_asset: f64,
}

/// Time-ordered record of fills and balance adjustments.
///
/// Timestamps are strictly increasing after every append; an appended row
/// whose timestamp collides is bumped forward by 1 ms until unique.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetRecord {
    entries: Vec<AssetEntry>,
}

impl AssetRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[AssetEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&AssetEntry> {
        self.entries.last()
    }

    pub fn last_result_asset(&self) -> Option<f64> {
        self.entries.last().map(|e| e.result_asset)
    }

    /// Append one row, bumping the timestamp by 1 ms until unique, then
    /// restoring the sort invariant.
    pub fn append(&mut self, mut entry: AssetEntry) {
        while self.entries.iter().any(|e| e.ts_ms == entry.ts_ms) {
            entry.ts_ms += 1;
        }
        self.entries.push(entry);
        let sorted = self.entries.windows(2).all(|w| w[0].ts_ms < w[1].ts_ms);
        if !sorted {
            self.entries.sort_by_key(|e| e.ts_ms);
        }
    }

    /// Mutate the row holding `order_id`, if present.
    ///
    /// Partial fills of the same order accumulate into one row.
    pub fn update_by_order_id(
        &mut self,
        order_id: u64,
        update: impl FnOnce(&mut AssetEntry),
    ) -> bool {
        if order_id == 0 {
            return false;
        }
        match self.entries.iter_mut().find(|e| e.order_id == order_id) {
            Some(entry) => {
                update(entry);
                true
            }
            None => false,
        }
    }

    /// Overwrite the newest row's `result_asset` (watchdog clamp).
    pub fn clamp_last_result_asset(&mut self, authoritative: f64) {
        if let Some(entry) = self.entries.last_mut() {
            entry.result_asset = authoritative;
        }
    }

    /// Extend with rows of another record (chunk concatenation).
    pub fn extend_from(&mut self, other: &AssetRecord) {
        for entry in &other.entries {
            self.append(entry.clone());
        }
    }
}

/// Moment-indexed series of `unrealized_profit / wallet_balance`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnrealizedChanges {
    points: Vec<(Moment, f32)>,
}

impl UnrealizedChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[(Moment, f32)] {
        &self.points
    }

    /// Append or overwrite the value at a moment, keeping the index sorted.
    pub fn record(&mut self, moment: Moment, ratio: f32) {
        match self.points.binary_search_by_key(&moment, |(m, _)| *m) {
            Ok(i) => self.points[i].1 = ratio,
            Err(i) => self.points.insert(i, (moment, ratio)),
        }
    }

    /// Multiply every value by a factor into a new series (leverage overlay).
    pub fn scaled(&self, factor: f32) -> UnrealizedChanges {
        UnrealizedChanges {
            points: self.points.iter().map(|(m, v)| (*m, v * factor)).collect(),
        }
    }

    pub fn extend_from(&mut self, other: &UnrealizedChanges) {
        for (moment, ratio) in &other.points {
            self.record(*moment, *ratio);
        }
    }
}

/// Millisecond-indexed record of `(symbol, order_id)` rows for every order
/// this platform placed. The sole ground truth for classifying later fills
/// as auto-originated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoOrderRecord {
    rows: Vec<(i64, String, u64)>,
}

impl AutoOrderRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn append(&mut self, ts_ms: i64, symbol: &str, order_id: u64) {
        self.rows.push((ts_ms, symbol.to_string(), order_id));
    }

    pub fn contains(&self, symbol: &str, order_id: u64) -> bool {
        self.rows
            .iter()
            .any(|(_, s, id)| *id == order_id && s == symbol)
    }

    /// Drop rows older than `cutoff_ms`.
    pub fn prune_before(&mut self, cutoff_ms: i64) {
        self.rows.retain(|(ts, _, _)| *ts >= cutoff_ms);
    }
}

//! Indicator series produced by the indicators script.

use model::Moment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which plot family an indicator belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndicatorCategory {
    Price,
    Volume,
    Abstract,
}

impl IndicatorCategory {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PRICE" => Some(Self::Price),
            "VOLUME" => Some(Self::Volume),
            "ABSTRACT" => Some(Self::Abstract),
            _ => None,
        }
    }
}

/// Indicator columns keyed by `(symbol, category, label)`, aligned to a
/// moment index. A `(color)` substring inside the label controls line color
/// in the GUI; the kernel treats labels as opaque.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorPack {
    index: Vec<Moment>,
    columns: BTreeMap<(String, IndicatorCategory, String), Vec<f32>>,
}

impl IndicatorPack {
    pub fn new(index: Vec<Moment>) -> Self {
        Self {
            index,
            columns: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[Moment] {
        &self.index
    }

    pub fn columns(
        &self,
    ) -> impl Iterator<Item = (&(String, IndicatorCategory, String), &Vec<f32>)> {
        self.columns.iter()
    }

    /// Insert one column; the series must be aligned to the index.
    pub fn insert(
        &mut self,
        symbol: &str,
        category: IndicatorCategory,
        label: &str,
        mut series: Vec<f32>,
    ) {
        series.resize(self.index.len(), f32::NAN);
        self.columns
            .insert((symbol.to_string(), category, label.to_string()), series);
    }

    pub fn series(
        &self,
        symbol: &str,
        category: IndicatorCategory,
        label: &str,
    ) -> Option<&[f32]> {
        self.columns
            .get(&(symbol.to_string(), category, label.to_string()))
            .map(|v| v.as_slice())
    }

    /// One cell of the final row.
    pub fn last_value(
        &self,
        symbol: &str,
        category: IndicatorCategory,
        label: &str,
    ) -> Option<f32> {
        self.series(symbol, category, label)
            .and_then(|s| s.last().copied())
    }

    /// One cell at a row index.
    pub fn value_at(
        &self,
        row: usize,
        symbol: &str,
        category: IndicatorCategory,
        label: &str,
    ) -> Option<f32> {
        self.series(symbol, category, label)
            .and_then(|s| s.get(row).copied())
    }

    /// Cloned sub-pack covering rows `[lower, upper)`.
    pub fn slice_rows(&self, lower: usize, upper: usize) -> IndicatorPack {
        let upper = upper.min(self.index.len());
        let lower = lower.min(upper);
        IndicatorPack {
            index: self.index[lower..upper].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|(key, series)| (key.clone(), series[lower..upper].to_vec()))
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
    fn test_insert_aligns_length() {
        let mut pack = IndicatorPack::new(vec![m(0), m(1), m(2)]);
        pack.insert("BTCUSDT", IndicatorCategory::Price, "MA (#ff8888)", vec![1.0]);

        let series = pack
            .series("BTCUSDT", IndicatorCategory::Price, "MA (#ff8888)")
            .unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series[0], 1.0);
        assert!(series[2].is_nan());
    }

    #[test]
    fn test_last_value() {
        let mut pack = IndicatorPack::new(vec![m(0), m(1)]);
        pack.insert(
            "BTCUSDT",
            IndicatorCategory::Abstract,
            "signal",
            vec![0.0, 7.5],
        );
        assert_eq!(
            pack.last_value("BTCUSDT", IndicatorCategory::Abstract, "signal"),
            Some(7.5)
        );
        assert_eq!(
            pack.last_value("BTCUSDT", IndicatorCategory::Price, "signal"),
            None
        );
    }

    #[test]
    fn test_category_parse() {
        assert_eq!(IndicatorCategory::parse("price"), Some(IndicatorCategory::Price));
        assert_eq!(IndicatorCategory::parse("VOLUME"), Some(IndicatorCategory::Volume));
        assert_eq!(IndicatorCategory::parse("weird"), None);
    }
}

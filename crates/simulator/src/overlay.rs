//! Presentation overlay.
//!
//! The raw simulation runs lossless at unit leverage with zero fees. The
//! GUI applies fee and leverage assumptions afterwards: every asset-record
//! row becomes a growth factor, scaled by leverage and discounted by the
//! fee on its committed margin, and the presented curve is the cumulative
//! product of those factors starting at 1.0. The raw outputs are never
//! mutated.

use model::{AssetRecord, FillRole, UnrealizedChanges};

/// Fee and leverage assumptions for presentation.
#[derive(Debug, Clone, Copy)]
pub struct PresentationSettings {
    /// Maker fee in percent (0.02 means 0.02%).
    pub maker_fee_percent: f64,
    /// Taker fee in percent.
    pub taker_fee_percent: f64,
    pub leverage: f64,
}

impl Default for PresentationSettings {
    fn default() -> Self {
        Self {
            maker_fee_percent: 0.02,
            taker_fee_percent: 0.04,
            leverage: 1.0,
        }
    }
}

/// Rewrite `RESULT_ASSET` as the levered, fee-discounted cumulative product.
///
/// With unit leverage and zero fees the output equals the raw curve (which
/// starts at the blank state's 1.0 balance).
pub fn present_asset_record(
    record: &AssetRecord,
    settings: PresentationSettings,
) -> AssetRecord {
    let mut previous: Option<f64> = None;
    let mut cumulative = 1.0_f64;
    let mut presented = AssetRecord::new();

    for entry in record.entries() {
        let factor = match previous {
            None => 1.0,
            Some(prev) if prev != 0.0 => {
                let delta = (entry.result_asset - prev) / prev;
                let fee_fraction = match entry.role {
                    Some(FillRole::Maker) => settings.maker_fee_percent / 100.0,
                    Some(FillRole::Taker) => settings.taker_fee_percent / 100.0,
                    None => 0.0,
                };
                (1.0 + delta * settings.leverage)
                    * (1.0 - fee_fraction * entry.margin_ratio * settings.leverage)
            }
            Some(_) => 1.0,
        };
        cumulative *= factor;
        previous = Some(entry.result_asset);

        let mut shown = entry.clone();
        shown.result_asset = cumulative;
        presented.append(shown);
    }

    presented
}

/// Scale the unrealized series by leverage.
pub fn present_unrealized(
    series: &UnrealizedChanges,
    settings: PresentationSettings,
) -> UnrealizedChanges {
    series.scaled(settings.leverage as f32)
}

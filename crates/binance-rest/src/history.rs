//! Public historical-data archive of aggregate trades.
//!
//! Binance serves per-symbol ZIP files of aggregate trades, one CSV inside
//! each: daily files under `futures/um/daily/aggTrades`, monthly files under
//! `futures/um/monthly/aggTrades`. Downloading is async (the client fetches
//! bytes); decoding is CPU-bound and runs on the blocking pool.

use crate::error::BinanceRestError;
use model::AggregateTrade;
use std::io::Read;

/// Which archive granularity to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchivePeriod {
    /// One calendar day.
    Day { year: i32, month: u32, day: u32 },
    /// One calendar month.
    Month { year: i32, month: u32 },
}

/// URL path of the archive for a symbol and period.
pub fn archive_path(symbol: &str, period: ArchivePeriod) -> String {
    match period {
        ArchivePeriod::Day { year, month, day } => format!(
            "/data/futures/um/daily/aggTrades/{symbol}/{symbol}-aggTrades-{year}-{month:02}-{day:02}.zip"
        ),
        ArchivePeriod::Month { year, month } => format!(
            "/data/futures/um/monthly/aggTrades/{symbol}/{symbol}-aggTrades-{year}-{month:02}.zip"
        ),
    }
}

/// Decode one archive ZIP into aggregate trades.
///
/// The CSV columns are `agg_trade_id, price, quantity, first_trade_id,
/// last_trade_id, transact_time, is_buyer_maker`; some archive years carry
/// a header row, which is skipped by inspecting the first field.
pub fn parse_aggtrade_archive(
    symbol: &str,
    bytes: &[u8],
) -> Result<Vec<AggregateTrade>, BinanceRestError> {
    let cursor = std::io::Cursor::new(bytes);
    let mut zip = zip::ZipArchive::new(cursor)
        .map_err(|e| BinanceRestError::Archive(format!("bad zip: {e}")))?;

    if zip.is_empty() {
        return Err(BinanceRestError::Archive("empty zip".into()));
    }

    let mut file = zip
        .by_index(0)
        .map_err(|e| BinanceRestError::Archive(format!("bad zip entry: {e}")))?;
    let mut csv_bytes = Vec::new();
    file.read_to_end(&mut csv_bytes)
        .map_err(|e| BinanceRestError::Archive(format!("read failed: {e}")))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(csv_bytes.as_slice());

    let mut trades = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| BinanceRestError::Archive(format!("bad csv: {e}")))?;
        if record.len() < 6 {
            continue;
        }
        // Header rows fail the numeric parse of the first field.
        let Ok(_agg_id) = record[0].parse::<u64>() else {
            continue;
        };
        let price: f64 = record[1]
            .parse()
            .map_err(|e| BinanceRestError::Archive(format!("bad price: {e}")))?;
        let volume: f64 = record[2]
            .parse()
            .map_err(|e| BinanceRestError::Archive(format!("bad quantity: {e}")))?;
        let ts_ms: i64 = record[5]
            .parse()
            .map_err(|e| BinanceRestError::Archive(format!("bad timestamp: {e}")))?;

        trades.push(AggregateTrade {
            ts_ms,
            symbol: symbol.to_string(),
            price,
            volume,
        });
    }

    Ok(trades)
}

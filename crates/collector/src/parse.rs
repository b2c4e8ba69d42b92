//! Raw market-stream payloads.
//!
//! Futures streams use single-letter field names; each raw struct maps onto
//! a ring event. Handlers are fixed-time: parse, construct, append.

use model::{AggregateTrade, BookTicker, MarkPrice};
use serde::Deserialize;

fn de_f64<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let s: String = Deserialize::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

/// One entry of the `!markPrice@arr@1s` array.
#[derive(Debug, Deserialize)]
pub struct MarkPriceRaw {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p", deserialize_with = "de_f64")]
    pub price: f64,
}

/// A `{symbol}@bookTicker` event.
#[derive(Debug, Deserialize)]
pub struct BookTickerRaw {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "b", deserialize_with = "de_f64")]
    pub best_bid: f64,
    #[serde(rename = "a", deserialize_with = "de_f64")]
    pub best_ask: f64,
    #[serde(rename = "T", default)]
    pub transaction_time: i64,
    #[serde(rename = "E", default)]
    pub event_time: i64,
}

/// A `{symbol}@aggTrade` event.
#[derive(Debug, Deserialize)]
pub struct AggTradeRaw {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p", deserialize_with = "de_f64")]
    pub price: f64,
    #[serde(rename = "q", deserialize_with = "de_f64")]
    pub qty: f64,
    #[serde(rename = "T")]
    pub trade_time: i64,
}

impl From<MarkPriceRaw> for MarkPrice {
    fn from(raw: MarkPriceRaw) -> Self {
        MarkPrice {
            ts_ms: raw.event_time,
            symbol: raw.symbol,
            price: raw.price,
        }
    }
}

impl From<BookTickerRaw> for BookTicker {
    fn from(raw: BookTickerRaw) -> Self {
        BookTicker {
            // The futures stream stamps both transaction and event time;
            // prefer the exchange-side transaction time when present.
            ts_ms: if raw.transaction_time > 0 {
                raw.transaction_time
            } else {
                raw.event_time
            },
            symbol: raw.symbol,
            best_bid: raw.best_bid,
            best_ask: raw.best_ask,
        }
    }
}

impl From<AggTradeRaw> for AggregateTrade {
    fn from(raw: AggTradeRaw) -> Self {
        AggregateTrade {
            ts_ms: raw.trade_time,
            symbol: raw.symbol,
            price: raw.price,
            volume: raw.qty,
        }
    }
}

/// Parse a `!markPrice@arr` message (a JSON array of mark prices).
pub fn parse_mark_price_array(text: &str) -> Result<Vec<MarkPrice>, serde_json::Error> {
    let raws: Vec<MarkPriceRaw> = serde_json::from_str(text)?;
    Ok(raws.into_iter().map(Into::into).collect())
}

/// Parse a `@bookTicker` message.
pub fn parse_book_ticker(text: &str) -> Result<BookTicker, serde_json::Error> {
    let raw: BookTickerRaw = serde_json::from_str(text)?;
    Ok(raw.into())
}

/// Parse an `@aggTrade` message.
pub fn parse_agg_trade(text: &str) -> Result<AggregateTrade, serde_json::Error> {
    let raw: AggTradeRaw = serde_json::from_str(text)?;
    Ok(raw.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mark_price_array() {
        let json = r#"[
            {"e":"markPriceUpdate","E":1591261234000,"s":"BTCUSDT","p":"60000.10","i":"60000.00","P":"60010.00","r":"0.0001","T":1591262000000},
            {"e":"markPriceUpdate","E":1591261234000,"s":"ETHUSDT","p":"3000.25","i":"3000.00","P":"3001.00","r":"0.0001","T":1591262000000}
        ]"#;
        let prices = parse_mark_price_array(json).unwrap();
        assert_eq!(prices.len(), 2);
        assert_eq!(prices[0].symbol, "BTCUSDT");
        assert_eq!(prices[0].price, 60000.10);
        assert_eq!(prices[1].price, 3000.25);
    }

    #[test]
    fn test_parse_book_ticker() {
        let json = r#"{"e":"bookTicker","u":400900217,"E":1568014460893,"T":1568014460891,"s":"BNBUSDT","b":"25.35190000","B":"31.21000000","a":"25.36520000","A":"40.66000000"}"#;
        let ticker = parse_book_ticker(json).unwrap();
        assert_eq!(ticker.symbol, "BNBUSDT");
        assert_eq!(ticker.best_bid, 25.3519);
        assert_eq!(ticker.best_ask, 25.3652);
        assert_eq!(ticker.ts_ms, 1568014460891);
    }

    #[test]
    fn test_parse_agg_trade() {
        let json = r#"{"e":"aggTrade","E":1591261234000,"s":"BTCUSDT","a":26129,"p":"60000.5","q":"0.5","f":100,"l":105,"T":1591261233900,"m":true}"#;
        let trade = parse_agg_trade(json).unwrap();
        assert_eq!(trade.symbol, "BTCUSDT");
        assert_eq!(trade.price, 60000.5);
        assert_eq!(trade.volume, 0.5);
        assert_eq!(trade.ts_ms, 1591261233900);
    }
}

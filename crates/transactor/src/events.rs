//! User-data stream payloads.
//!
//! The stream emits three event types the mirror cares about:
//! `listenKeyExpired`, `ACCOUNT_UPDATE`, and `ORDER_TRADE_UPDATE`.

use serde::{Deserialize, Deserializer};

fn de_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let s: String = Deserialize::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

/// One balance row inside ACCOUNT_UPDATE.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceRaw {
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "wb", deserialize_with = "de_f64")]
    pub wallet_balance: f64,
}

/// One position row inside ACCOUNT_UPDATE.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionRaw {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "pa", deserialize_with = "de_f64")]
    pub position_amount: f64,
    #[serde(rename = "ep", deserialize_with = "de_f64")]
    pub entry_price: f64,
}

/// ACCOUNT_UPDATE body (the `a` object).
#[derive(Debug, Clone, Deserialize)]
pub struct AccountUpdateRaw {
    #[serde(rename = "B", default)]
    pub balances: Vec<BalanceRaw>,
    #[serde(rename = "P", default)]
    pub positions: Vec<PositionRaw>,
}

/// ORDER_TRADE_UPDATE body (the `o` object).
#[derive(Debug, Clone, Deserialize)]
pub struct OrderUpdateRaw {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "i")]
    pub order_id: u64,
    /// Order status: NEW, PARTIALLY_FILLED, FILLED, CANCELED, ...
    #[serde(rename = "X")]
    pub status: String,
    /// Exchange order type string.
    #[serde(rename = "o")]
    pub order_type: String,
    #[serde(rename = "S")]
    pub side: String,
    #[serde(rename = "cp", default)]
    pub close_position: bool,
    #[serde(rename = "R", default)]
    pub reduce_only: bool,
    #[serde(rename = "sp", default, deserialize_with = "de_f64_opt")]
    pub stop_price: f64,
    #[serde(rename = "p", deserialize_with = "de_f64")]
    pub price: f64,
    #[serde(rename = "q", deserialize_with = "de_f64")]
    pub orig_qty: f64,
    #[serde(rename = "z", deserialize_with = "de_f64")]
    pub filled_qty: f64,
    /// Execution type; `TRADE` marks an actual fill.
    #[serde(rename = "x")]
    pub execution_type: String,
    #[serde(rename = "l", deserialize_with = "de_f64")]
    pub last_filled_qty: f64,
    #[serde(rename = "L", deserialize_with = "de_f64")]
    pub last_filled_price: f64,
    #[serde(rename = "n", default, deserialize_with = "de_f64_opt")]
    pub commission: f64,
    #[serde(rename = "rp", default, deserialize_with = "de_f64_opt")]
    pub realized_profit: f64,
    #[serde(rename = "m", default)]
    pub is_maker: bool,
    #[serde(rename = "T")]
    pub trade_time_ms: i64,
}

fn de_f64_opt<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let s: Option<String> = Deserialize::deserialize(deserializer)?;
    match s {
        Some(s) => s.parse().map_err(serde::de::Error::custom),
        None => Ok(0.0),
    }
}

/// A parsed user-data event.
#[derive(Debug, Clone)]
pub enum UserEvent {
    /// The exchange dropped the listen key; refresh immediately.
    ListenKeyExpired,
    AccountUpdate {
        event_time_ms: i64,
        update: AccountUpdateRaw,
    },
    OrderUpdate {
        event_time_ms: i64,
        update: OrderUpdateRaw,
    },
    Unknown,
}

/// Parse one stream message.
pub fn parse_user_event(text: &str) -> Result<UserEvent, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let event_time_ms = value.get("E").and_then(|v| v.as_i64()).unwrap_or(0);

    match value.get("e").and_then(|v| v.as_str()) {
        Some("listenKeyExpired") => Ok(UserEvent::ListenKeyExpired),
        Some("ACCOUNT_UPDATE") => {
            let update = serde_json::from_value(
                value.get("a").cloned().unwrap_or(serde_json::Value::Null),
            )?;
            Ok(UserEvent::AccountUpdate {
                event_time_ms,
                update,
            })
        }
        Some("ORDER_TRADE_UPDATE") => {
            let update = serde_json::from_value(
                value.get("o").cloned().unwrap_or(serde_json::Value::Null),
            )?;
            Ok(UserEvent::OrderUpdate {
                event_time_ms,
                update,
            })
        }
        _ => Ok(UserEvent::Unknown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_account_update() {
        let json = r#"{
            "e": "ACCOUNT_UPDATE",
            "E": 1591274595442,
            "T": 1591274595453,
            "a": {
                "m": "ORDER",
                "B": [
                    {"a": "USDT", "wb": "122624.12345678", "cw": "100.12345678"},
                    {"a": "BUSD", "wb": "50.00000000", "cw": "50.00000000"}
                ],
                "P": [
                    {"s": "BTCUSDT", "pa": "0.001", "ep": "60000.5", "cr": "200", "up": "0.5", "mt": "isolated", "iw": "0.6", "ps": "BOTH"}
                ]
            }
        }"#;
        let event = parse_user_event(json).unwrap();
        match event {
            UserEvent::AccountUpdate {
                event_time_ms,
                update,
            } => {
                assert_eq!(event_time_ms, 1591274595442);
                assert_eq!(update.balances[0].asset, "USDT");
                assert_eq!(update.balances[0].wallet_balance, 122624.12345678);
                assert_eq!(update.positions[0].position_amount, 0.001);
            }
            other => panic!("expected AccountUpdate, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_order_update() {
        let json = r#"{
            "e": "ORDER_TRADE_UPDATE",
            "E": 1591274595442,
            "T": 1591274595453,
            "o": {
                "s": "BTCUSDT", "c": "TEST", "S": "SELL", "o": "TAKE_PROFIT_MARKET",
                "f": "GTC", "q": "0.001", "p": "0", "ap": "0", "sp": "61000.5",
                "x": "TRADE", "X": "FILLED", "i": 8886774, "l": "0.001",
                "z": "0.001", "L": "61000.5", "N": "USDT", "n": "0.014",
                "T": 1591274595442, "t": 1741, "b": "0", "a": "0", "m": true,
                "R": false, "wt": "MARK_PRICE", "ot": "TAKE_PROFIT_MARKET",
                "ps": "BOTH", "cp": true, "rp": "12.5"
            }
        }"#;
        let event = parse_user_event(json).unwrap();
        match event {
            UserEvent::OrderUpdate { update, .. } => {
                assert_eq!(update.order_id, 8886774);
                assert_eq!(update.status, "FILLED");
                assert_eq!(update.execution_type, "TRADE");
                assert!(update.close_position);
                assert_eq!(update.stop_price, 61000.5);
                assert_eq!(update.realized_profit, 12.5);
                assert!(update.is_maker);
            }
            other => panic!("expected OrderUpdate, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_listen_key_expired() {
        let json = r#"{"e": "listenKeyExpired", "E": 1591274595442}"#;
        assert!(matches!(
            parse_user_event(json).unwrap(),
            UserEvent::ListenKeyExpired
        ));
    }

    #[test]
    fn test_parse_unknown() {
        let json = r#"{"e": "MARGIN_CALL", "E": 1}"#;
        assert!(matches!(parse_user_event(json).unwrap(), UserEvent::Unknown));
    }
}

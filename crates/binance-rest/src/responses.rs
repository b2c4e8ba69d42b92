//! Futures API response types.
//!
//! Numeric fields arrive as JSON strings; they deserialize through
//! `Decimal`/`f64` helpers below.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use std::str::FromStr;

fn de_f64_from_str<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let s: String = Deserialize::deserialize(deserializer)?;
    f64::from_str(&s).map_err(serde::de::Error::custom)
}

fn de_decimal_from_str<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
    let s: String = Deserialize::deserialize(deserializer)?;
    Decimal::from_str(&s).map_err(serde::de::Error::custom)
}

/// Response from GET /fapi/v1/time.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerTimeResponse {
    #[serde(rename = "serverTime")]
    pub server_time: i64,
}

/// Response from POST /fapi/v1/listenKey.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenKeyResponse {
    #[serde(rename = "listenKey")]
    pub listen_key: String,
}

/// One aggregate trade from GET /fapi/v1/aggTrades.
#[derive(Debug, Clone, Deserialize)]
pub struct AggTrade {
    #[serde(rename = "a")]
    pub agg_trade_id: u64,
    #[serde(rename = "p", deserialize_with = "de_f64_from_str")]
    pub price: f64,
    #[serde(rename = "q", deserialize_with = "de_f64_from_str")]
    pub qty: f64,
    #[serde(rename = "T")]
    pub timestamp_ms: i64,
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
}

/// Response from GET /fapi/v1/exchangeInfo.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

/// One symbol's metadata inside exchange info.
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub status: String,
    #[serde(rename = "pricePrecision")]
    pub price_precision: u32,
    #[serde(rename = "quantityPrecision")]
    pub quantity_precision: u32,
    #[serde(default)]
    pub filters: Vec<SymbolFilter>,
}

/// Filters are a tagged union keyed by `filterType`; unknown kinds are kept
/// as `Other` so new exchange filters never break parsing.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "filterType")]
pub enum SymbolFilter {
    #[serde(rename = "LOT_SIZE")]
    LotSize {
        #[serde(rename = "stepSize", deserialize_with = "de_decimal_from_str")]
        step_size: Decimal,
        #[serde(rename = "maxQty", deserialize_with = "de_decimal_from_str")]
        max_qty: Decimal,
        #[serde(rename = "minQty", deserialize_with = "de_decimal_from_str")]
        min_qty: Decimal,
    },
    #[serde(rename = "MIN_NOTIONAL")]
    MinNotional {
        #[serde(rename = "notional", deserialize_with = "de_decimal_from_str")]
        notional: Decimal,
    },
    #[serde(rename = "PRICE_FILTER")]
    PriceFilter {
        #[serde(rename = "tickSize", deserialize_with = "de_decimal_from_str")]
        tick_size: Decimal,
    },
    #[serde(other)]
    Other,
}

/// The order-rounding rules extracted from one [`SymbolInfo`].
#[derive(Debug, Clone, Copy)]
pub struct SymbolRules {
    pub price_precision: u32,
    pub quantity_precision: u32,
    pub step_size: Decimal,
    pub max_quantity: Decimal,
    pub min_notional: Decimal,
}

impl SymbolInfo {
    /// Collapse the filter list into the rounding rules order placement uses.
    pub fn rules(&self) -> SymbolRules {
        let mut rules = SymbolRules {
            price_precision: self.price_precision,
            quantity_precision: self.quantity_precision,
            step_size: Decimal::ONE,
            max_quantity: Decimal::MAX,
            min_notional: Decimal::ZERO,
        };
        for filter in &self.filters {
            match filter {
                SymbolFilter::LotSize {
                    step_size, max_qty, ..
                } => {
                    rules.step_size = *step_size;
                    rules.max_quantity = *max_qty;
                }
                SymbolFilter::MinNotional { notional } => {
                    rules.min_notional = *notional;
                }
                _ => {}
            }
        }
        rules
    }
}

/// One entry from GET /fapi/v1/leverageBracket.
#[derive(Debug, Clone, Deserialize)]
pub struct LeverageBrackets {
    pub symbol: String,
    pub brackets: Vec<LeverageBracket>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeverageBracket {
    pub bracket: u32,
    #[serde(rename = "initialLeverage")]
    pub initial_leverage: u32,
    #[serde(rename = "notionalCap")]
    pub notional_cap: f64,
}

/// Response from GET /fapi/v2/account.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountSnapshot {
    #[serde(rename = "totalWalletBalance", deserialize_with = "de_f64_from_str")]
    pub total_wallet_balance: f64,
    #[serde(
        rename = "totalUnrealizedProfit",
        deserialize_with = "de_f64_from_str"
    )]
    pub total_unrealized_profit: f64,
    #[serde(rename = "multiAssetsMargin", default)]
    pub multi_assets_margin: bool,
    pub assets: Vec<AccountAsset>,
    pub positions: Vec<AccountPosition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountAsset {
    pub asset: String,
    #[serde(rename = "walletBalance", deserialize_with = "de_f64_from_str")]
    pub wallet_balance: f64,
    #[serde(rename = "unrealizedProfit", deserialize_with = "de_f64_from_str")]
    pub unrealized_profit: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountPosition {
    pub symbol: String,
    #[serde(rename = "positionAmt", deserialize_with = "de_f64_from_str")]
    pub position_amt: f64,
    #[serde(rename = "entryPrice", deserialize_with = "de_f64_from_str")]
    pub entry_price: f64,
    #[serde(rename = "leverage", deserialize_with = "de_f64_from_str")]
    pub leverage: f64,
    pub isolated: bool,
    /// `BOTH` in one-way mode; `LONG`/`SHORT` only in hedge mode.
    #[serde(rename = "positionSide", default)]
    pub position_side: String,
    #[serde(rename = "updateTime")]
    pub update_time_ms: i64,
}

/// One row from GET /fapi/v1/openOrders.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenOrderInfo {
    pub symbol: String,
    #[serde(rename = "orderId")]
    pub order_id: u64,
    #[serde(rename = "type")]
    pub order_type: String,
    pub side: String,
    #[serde(rename = "closePosition", default)]
    pub close_position: bool,
    #[serde(rename = "reduceOnly", default)]
    pub reduce_only: bool,
    #[serde(rename = "stopPrice", deserialize_with = "de_f64_from_str")]
    pub stop_price: f64,
    #[serde(deserialize_with = "de_f64_from_str")]
    pub price: f64,
    #[serde(rename = "origQty", deserialize_with = "de_f64_from_str")]
    pub orig_qty: f64,
    #[serde(rename = "executedQty", deserialize_with = "de_f64_from_str")]
    pub executed_qty: f64,
    #[serde(rename = "updateTime")]
    pub update_time_ms: i64,
}

impl OpenOrderInfo {
    /// Trigger price for conditional orders, limit price otherwise.
    pub fn boundary(&self) -> f64 {
        if self.stop_price > 0.0 {
            self.stop_price
        } else {
            self.price
        }
    }

    /// Quantity still unfilled.
    pub fn left_qty(&self) -> f64 {
        self.orig_qty - self.executed_qty
    }
}

/// Response from POST /fapi/v1/order and DELETE /fapi/v1/order.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrderResponse {
    pub symbol: String,
    #[serde(rename = "orderId")]
    pub order_id: u64,
    pub status: String,
    #[serde(rename = "updateTime")]
    pub update_time_ms: i64,
}

/// Response from DELETE /fapi/v1/allOpenOrders.
#[derive(Debug, Clone, Deserialize)]
pub struct CancelAllResponse {
    pub code: i64,
    pub msg: String,
}

/// Response from GET /sapi/v1/account/apiRestrictions.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiRestrictions {
    #[serde(rename = "enableFutures")]
    pub enable_futures: bool,
    #[serde(rename = "enableReading", default)]
    pub enable_reading: bool,
    #[serde(rename = "ipRestrict", default)]
    pub ip_restrict: bool,
}

//! Typed Binance USDT-M futures REST client.
//!
//! Covers the endpoints the platform consumes: server time, exchange info,
//! aggregate trades, leverage brackets, account snapshot, open orders,
//! listen-key lifecycle, order placement/cancellation, account-mode
//! switches, the spot key-restriction probe, and the public historical
//! archive of aggregate trades.
//!
//! Signed endpoints sign the urlencoded query with HMAC-SHA256 over the API
//! secret and attach `X-MBX-APIKEY` (see the `auth` crate).

mod client;
mod error;
mod history;
mod responses;

pub use client::{ceil_to_step, BinanceFuturesClient, RequestCounters};
pub use error::BinanceRestError;
pub use history::{archive_path, parse_aggtrade_archive, ArchivePeriod};
pub use responses::{
    AccountAsset, AccountPosition, AccountSnapshot, AggTrade, ApiRestrictions, CancelAllResponse,
    ExchangeInfo, LeverageBracket, LeverageBrackets, ListenKeyResponse, NewOrderResponse,
    OpenOrderInfo, ServerTimeResponse, SymbolFilter, SymbolInfo, SymbolRules,
};

//! Futures REST API client.

use crate::error::BinanceRestError;
use crate::responses::{
    AccountSnapshot, AggTrade, ApiRestrictions, CancelAllResponse, ExchangeInfo,
    LeverageBrackets, ListenKeyResponse, NewOrderResponse, OpenOrderInfo, ServerTimeResponse,
};
use auth::{ApiCredentials, RequestSigner};
use common::{BinanceEnvironment, SharedClock};
use rest_client::RestClient;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Request timeout for API calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// recvWindow attached to signed requests.
const RECV_WINDOW_MS: u32 = 5_000;

/// Request telemetry, owned by the client itself.
#[derive(Debug, Default)]
pub struct RequestCounters {
    requests_sent: AtomicU64,
    request_errors: AtomicU64,
    rate_limit_hits: AtomicU64,
}

impl RequestCounters {
    pub fn requests_sent(&self) -> u64 {
        self.requests_sent.load(Ordering::Relaxed)
    }

    pub fn request_errors(&self) -> u64 {
        self.request_errors.load(Ordering::Relaxed)
    }

    pub fn rate_limit_hits(&self) -> u64 {
        self.rate_limit_hits.load(Ordering::Relaxed)
    }
}

/// USDT-M futures REST client with authentication support.
pub struct BinanceFuturesClient {
    futures: RestClient,
    spot: RestClient,
    data: RestClient,
    credentials: ApiCredentials,
    environment: BinanceEnvironment,
    clock: SharedClock,
    counters: RequestCounters,
}

impl BinanceFuturesClient {
    /// Create a client for the given environment.
    ///
    /// Timestamps on signed requests come from `clock`, which the manager
    /// keeps aligned to server time.
    ///
    /// # Errors
    /// Returns an error if an HTTP client cannot be built.
    pub fn new(
        credentials: ApiCredentials,
        environment: BinanceEnvironment,
        clock: SharedClock,
    ) -> Result<Self, BinanceRestError> {
        Ok(Self {
            futures: RestClient::new(environment.futures_rest_base_url(), REQUEST_TIMEOUT)?,
            spot: RestClient::new(environment.spot_rest_base_url(), REQUEST_TIMEOUT)?,
            data: RestClient::new(environment.data_base_url(), REQUEST_TIMEOUT)?,
            credentials,
            environment,
            clock,
            counters: RequestCounters::default(),
        })
    }

    pub fn environment(&self) -> BinanceEnvironment {
        self.environment
    }

    pub fn counters(&self) -> &RequestCounters {
        &self.counters
    }

    fn api_key_header(&self) -> [(&str, &str); 1] {
        [("X-MBX-APIKEY", self.credentials.api_key())]
    }

    fn signed(&self, params: &[(&str, &str)]) -> String {
        let signer = RequestSigner::new(&self.credentials);
        signer.signed_query(params, self.clock.now_ms(), Some(RECV_WINDOW_MS))
    }

    fn track<T>(&self, result: Result<T, BinanceRestError>) -> Result<T, BinanceRestError> {
        self.counters.requests_sent.fetch_add(1, Ordering::Relaxed);
        if let Err(ref e) = result {
            self.counters.request_errors.fetch_add(1, Ordering::Relaxed);
            if matches!(e, BinanceRestError::Rest(rest_client::RestError::RateLimited { .. })) {
                self.counters.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    // ========================================================================
    // Public market data
    // ========================================================================

    /// GET /fapi/v1/time — server time plus measured round trip.
    pub async fn server_time(&self) -> Result<(i64, i64), BinanceRestError> {
        let before = std::time::Instant::now();
        let result: Result<ServerTimeResponse, BinanceRestError> = self
            .futures
            .get("/fapi/v1/time", None, None)
            .await
            .map_err(Into::into);
        let response = self.track(result)?;
        let rtt_ms = before.elapsed().as_millis() as i64;
        Ok((response.server_time, rtt_ms))
    }

    /// GET /fapi/v1/exchangeInfo.
    pub async fn exchange_info(&self) -> Result<ExchangeInfo, BinanceRestError> {
        let result = self
            .futures
            .get("/fapi/v1/exchangeInfo", None, None)
            .await
            .map_err(Into::into);
        self.track(result)
    }

    /// GET /fapi/v1/aggTrades — up to `limit` trades from `start_time_ms`.
    pub async fn agg_trades(
        &self,
        symbol: &str,
        start_time_ms: i64,
        limit: u32,
    ) -> Result<Vec<AggTrade>, BinanceRestError> {
        let query = format!(
            "symbol={}&startTime={}&limit={}",
            symbol, start_time_ms, limit
        );
        let result = self
            .futures
            .get("/fapi/v1/aggTrades", Some(&query), None)
            .await
            .map_err(Into::into);
        self.track(result)
    }

    /// GET a historical-archive ZIP from the public data endpoint.
    pub async fn download_archive(&self, path: &str) -> Result<Vec<u8>, BinanceRestError> {
        let result = self.data.get_bytes(path, None).await.map_err(Into::into);
        self.track(result)
    }

    // ========================================================================
    // Signed account data
    // ========================================================================

    /// GET /fapi/v1/leverageBracket.
    pub async fn leverage_brackets(&self) -> Result<Vec<LeverageBrackets>, BinanceRestError> {
        let query = self.signed(&[]);
        let result = self
            .futures
            .get(
                "/fapi/v1/leverageBracket",
                Some(&query),
                Some(&self.api_key_header()),
            )
            .await
            .map_err(Into::into);
        self.track(result)
    }

    /// GET /fapi/v2/account.
    pub async fn account_snapshot(&self) -> Result<AccountSnapshot, BinanceRestError> {
        let query = self.signed(&[]);
        let result = self
            .futures
            .get("/fapi/v2/account", Some(&query), Some(&self.api_key_header()))
            .await
            .map_err(Into::into);
        self.track(result)
    }

    /// GET /fapi/v1/openOrders for one symbol.
    pub async fn open_orders(&self, symbol: &str) -> Result<Vec<OpenOrderInfo>, BinanceRestError> {
        let query = self.signed(&[("symbol", symbol)]);
        let result = self
            .futures
            .get(
                "/fapi/v1/openOrders",
                Some(&query),
                Some(&self.api_key_header()),
            )
            .await
            .map_err(Into::into);
        self.track(result)
    }

    /// GET /sapi/v1/account/apiRestrictions (spot base URL).
    pub async fn api_restrictions(&self) -> Result<ApiRestrictions, BinanceRestError> {
        let query = self.signed(&[]);
        let result = self
            .spot
            .get(
                "/sapi/v1/account/apiRestrictions",
                Some(&query),
                Some(&self.api_key_header()),
            )
            .await
            .map_err(Into::into);
        self.track(result)
    }

    // ========================================================================
    // Listen key lifecycle
    // ========================================================================

    /// POST /fapi/v1/listenKey.
    ///
    /// Creating a key while one is active extends it and returns the same
    /// key, so this doubles as the periodic refresh.
    pub async fn create_listen_key(&self) -> Result<String, BinanceRestError> {
        let result: Result<ListenKeyResponse, BinanceRestError> = self
            .futures
            .post("/fapi/v1/listenKey", None, Some(&self.api_key_header()))
            .await
            .map_err(Into::into);
        let response = self.track(result)?;
        tracing::info!("created listen key");
        Ok(response.listen_key)
    }

    // ========================================================================
    // Orders
    // ========================================================================

    /// POST /fapi/v1/order.
    ///
    /// `params` carry the exchange-native fields assembled by order
    /// placement (type, side, quantity, prices, flags).
    pub async fn place_order(
        &self,
        params: &[(&str, &str)],
    ) -> Result<NewOrderResponse, BinanceRestError> {
        let query = self.signed(params);
        tracing::info!(params = ?params, "placing order");
        let result: Result<NewOrderResponse, BinanceRestError> = self
            .futures
            .post("/fapi/v1/order", Some(&query), Some(&self.api_key_header()))
            .await
            .map_err(Into::into);
        let response = self.track(result)?;
        tracing::info!(
            order_id = response.order_id,
            status = %response.status,
            "order placed"
        );
        Ok(response)
    }

    /// DELETE /fapi/v1/order.
    pub async fn cancel_order(
        &self,
        symbol: &str,
        order_id: u64,
    ) -> Result<NewOrderResponse, BinanceRestError> {
        let order_id = order_id.to_string();
        let query = self.signed(&[("symbol", symbol), ("orderId", &order_id)]);
        let result = self
            .futures
            .delete("/fapi/v1/order", Some(&query), Some(&self.api_key_header()))
            .await
            .map_err(Into::into);
        self.track(result)
    }

    /// DELETE /fapi/v1/allOpenOrders for one symbol.
    pub async fn cancel_all_orders(&self, symbol: &str) -> Result<(), BinanceRestError> {
        let query = self.signed(&[("symbol", symbol)]);
        let result: Result<CancelAllResponse, BinanceRestError> = self
            .futures
            .delete(
                "/fapi/v1/allOpenOrders",
                Some(&query),
                Some(&self.api_key_header()),
            )
            .await
            .map_err(Into::into);
        self.track(result)?;
        Ok(())
    }

    // ========================================================================
    // Account mode switches
    // ========================================================================

    /// POST /fapi/v1/leverage.
    pub async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), BinanceRestError> {
        let leverage = leverage.to_string();
        let query = self.signed(&[("symbol", symbol), ("leverage", &leverage)]);
        let result: Result<serde_json::Value, BinanceRestError> = self
            .futures
            .post("/fapi/v1/leverage", Some(&query), Some(&self.api_key_header()))
            .await
            .map_err(Into::into);
        self.track(result)?;
        Ok(())
    }

    /// POST /fapi/v1/marginType — `ISOLATED` or `CROSSED`.
    pub async fn set_margin_type(
        &self,
        symbol: &str,
        margin_type: &str,
    ) -> Result<(), BinanceRestError> {
        let query = self.signed(&[("symbol", symbol), ("marginType", margin_type)]);
        let result: Result<CancelAllResponse, BinanceRestError> = self
            .futures
            .post(
                "/fapi/v1/marginType",
                Some(&query),
                Some(&self.api_key_header()),
            )
            .await
            .map_err(Into::into);
        self.track(result)?;
        Ok(())
    }

    /// POST /fapi/v1/multiAssetsMargin.
    pub async fn set_multi_assets_margin(&self, enabled: bool) -> Result<(), BinanceRestError> {
        let flag = if enabled { "true" } else { "false" };
        let query = self.signed(&[("multiAssetsMargin", flag)]);
        let result: Result<CancelAllResponse, BinanceRestError> = self
            .futures
            .post(
                "/fapi/v1/multiAssetsMargin",
                Some(&query),
                Some(&self.api_key_header()),
            )
            .await
            .map_err(Into::into);
        self.track(result)?;
        Ok(())
    }

    /// POST /fapi/v1/positionSide/dual — hedge mode on/off.
    pub async fn set_hedge_mode(&self, enabled: bool) -> Result<(), BinanceRestError> {
        let flag = if enabled { "true" } else { "false" };
        let query = self.signed(&[("dualSidePosition", flag)]);
        let result: Result<CancelAllResponse, BinanceRestError> = self
            .futures
            .post(
                "/fapi/v1/positionSide/dual",
                Some(&query),
                Some(&self.api_key_header()),
            )
            .await
            .map_err(Into::into);
        self.track(result)?;
        Ok(())
    }
}

impl std::fmt::Debug for BinanceFuturesClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceFuturesClient")
            .field("environment", &self.environment)
            .field("base_url", &self.futures.base_url())
            .field("api_key", &self.credentials.api_key())
            .field("requests_sent", &self.counters.requests_sent())
            .finish()
    }
}

/// Tolerance used by [`ceil_to_step`], in step units.
const CEIL_BALL: Decimal = Decimal::from_parts(1, 0, 0, false, 6); // 1e-6

/// Round a quantity up to the exchange step, capped at `precision` decimals.
///
/// A "ball ceil": a quantity sitting a hair above a step boundary from
/// float margin math (e.g. `0.010000000001`) stays on that boundary instead
/// of ceiling to the next step, while anything meaningfully above it still
/// rounds up so the notional never drops below the requested margin.
pub fn ceil_to_step(quantity: Decimal, step: Decimal, precision: u32) -> Decimal {
    if step <= Decimal::ZERO {
        return quantity.round_dp_with_strategy(
            precision,
            rust_decimal::RoundingStrategy::AwayFromZero,
        );
    }
    let steps = quantity / step - CEIL_BALL;
    (steps.ceil() * step).round_dp(precision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ceil_to_step_exact_boundary() {
        assert_eq!(ceil_to_step(dec!(0.010), dec!(0.001), 3), dec!(0.010));
    }

    #[test]
    fn test_ceil_to_step_dust_above_boundary_stays() {
        assert_eq!(
            ceil_to_step(dec!(0.0100000000001), dec!(0.001), 3),
            dec!(0.010)
        );
    }

    #[test]
    fn test_ceil_to_step_rounds_up() {
        assert_eq!(ceil_to_step(dec!(0.009999), dec!(0.001), 3), dec!(0.010));
        assert_eq!(ceil_to_step(dec!(0.0104), dec!(0.001), 3), dec!(0.011));
    }

    #[test]
    fn test_ceil_to_step_degenerate_step() {
        assert_eq!(ceil_to_step(dec!(1.2301), Decimal::ZERO, 2), dec!(1.24));
    }
}

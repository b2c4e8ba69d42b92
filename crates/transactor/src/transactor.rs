//! The transactor component: account mirror, decision cycle, order flush.

use crate::error::{CycleError, TransactorError};
use crate::events::{OrderUpdateRaw, UserEvent};
use crate::placement::{build_order_params, OrderContext, PlacementError};
use crate::settings::TransactionSettings;
use binance_rest::{BinanceFuturesClient, SymbolRules};
use common::{DataPaths, SharedClock};
use futures_util::future::join_all;
use model::{
    AccountState, AssetEntry, AssetRecord, AutoOrderRecord, Candle, CandleWindow, DecisionSet,
    FillRole, FillSide, Moment, OpenOrder, OrderType, Position, PositionDirection, RecordCause,
    Scribbles, UnrealizedChanges,
};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strategist::{DecisionInputs, StrategyKernel, StrategyStore};
use tracing::{debug, info, warn};

/// How long the cycle waits for the collector's row before proceeding with
/// stale data.
const CANDLE_WAIT: Duration = Duration::from_secs(5);

/// Poll interval of the candle wait.
const CANDLE_POLL: Duration = Duration::from_millis(100);

/// Candle history handed to the strategy each tick.
const DECISION_WINDOW_ROWS: i64 = 28 * 8640;

/// Narrow read surface onto the collector's candle grid.
///
/// The transactor never owns the grid; it reads through this handle so the
/// two components stay decoupled.
pub trait CandleSource: Send + Sync {
    /// Cloned window over `[start, end)`.
    fn window(&self, start: Moment, end: Moment) -> CandleWindow;

    /// Whether the row at `moment` holds data for the symbol.
    fn has_row(&self, moment: Moment, symbol: &str) -> bool;

    /// Latest known close for a symbol.
    fn latest_close(&self, symbol: &str) -> Option<f64>;

    /// Trailing-24h cumulation rate.
    fn cumulation_rate(&self) -> f64;
}

/// Owns the account mirror, live records, and the decision loop.
pub struct Transactor {
    symbols: Vec<String>,
    paths: DataPaths,
    client: Arc<BinanceFuturesClient>,
    clock: SharedClock,
    kernel: Arc<StrategyKernel>,
    store: Arc<StrategyStore>,
    source: Arc<dyn CandleSource>,
    /// Internet probe outcome, maintained by the manager.
    connected: Arc<AtomicBool>,
    settings: RwLock<TransactionSettings>,
    account: Arc<RwLock<AccountState>>,
    scribbles: Arc<RwLock<Scribbles>>,
    asset_record: Arc<RwLock<AssetRecord>>,
    unrealized: Arc<RwLock<UnrealizedChanges>>,
    auto_orders: Arc<RwLock<AutoOrderRecord>>,
    pub(crate) rules: RwLock<HashMap<String, SymbolRules>>,
    pub(crate) max_leverage: RwLock<HashMap<String, u32>>,
    pub(crate) key_ok: AtomicBool,
    cycle_running: AtomicBool,
}

fn load_table<T: DeserializeOwned + Default>(path: &Path) -> Result<T, TransactorError> {
    match std::fs::read(path) {
        Ok(bytes) => bincode::deserialize(&bytes)
            .map_err(|e| TransactorError::Decode(format!("{}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

fn save_table<T: Serialize>(path: &Path, value: &T) -> Result<(), TransactorError> {
    let bytes = bincode::serialize(value)
        .map_err(|e| TransactorError::Decode(format!("{}: {e}", path.display())))?;
    std::fs::write(path, bytes)?;
    Ok(())
}

impl Transactor {
    /// Create the transactor, loading persisted state from `paths`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbols: Vec<String>,
        paths: DataPaths,
        client: Arc<BinanceFuturesClient>,
        clock: SharedClock,
        kernel: Arc<StrategyKernel>,
        store: Arc<StrategyStore>,
        source: Arc<dyn CandleSource>,
        connected: Arc<AtomicBool>,
    ) -> Result<Self, TransactorError> {
        let settings = TransactionSettings::load(&paths.transaction_settings())?;
        let scribbles: Scribbles = load_table(&paths.scribbles())?;
        let asset_record: AssetRecord = load_table(&paths.asset_record())?;
        let unrealized: UnrealizedChanges = load_table(&paths.unrealized_changes())?;
        let auto_orders: AutoOrderRecord = load_table(&paths.auto_order_record())?;

        info!(
            fills = asset_record.len(),
            auto_orders = auto_orders.len(),
            "transactor state loaded"
        );

        Ok(Self {
            symbols,
            paths,
            client,
            clock,
            kernel,
            store,
            source,
            connected,
            settings: RwLock::new(settings),
            account: Arc::new(RwLock::new(AccountState::new())),
            scribbles: Arc::new(RwLock::new(scribbles)),
            asset_record: Arc::new(RwLock::new(asset_record)),
            unrealized: Arc::new(RwLock::new(unrealized)),
            auto_orders: Arc::new(RwLock::new(auto_orders)),
            rules: RwLock::new(HashMap::new()),
            max_leverage: RwLock::new(HashMap::new()),
            key_ok: AtomicBool::new(false),
            cycle_running: AtomicBool::new(false),
        })
    }

    // ------------------------------------------------------------------
    // Accessors (GUI contract)
    // ------------------------------------------------------------------

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn client(&self) -> &Arc<BinanceFuturesClient> {
        &self.client
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn account(&self) -> Arc<RwLock<AccountState>> {
        self.account.clone()
    }

    pub fn asset_record(&self) -> Arc<RwLock<AssetRecord>> {
        self.asset_record.clone()
    }

    pub fn unrealized_changes(&self) -> Arc<RwLock<UnrealizedChanges>> {
        self.unrealized.clone()
    }

    pub fn scribbles(&self) -> Arc<RwLock<Scribbles>> {
        self.scribbles.clone()
    }

    pub(crate) fn account_lock(&self) -> &Arc<RwLock<AccountState>> {
        &self.account
    }

    pub(crate) fn asset_record_lock(&self) -> &Arc<RwLock<AssetRecord>> {
        &self.asset_record
    }

    pub(crate) fn unrealized_lock(&self) -> &Arc<RwLock<UnrealizedChanges>> {
        &self.unrealized
    }

    pub fn settings_snapshot(&self) -> TransactionSettings {
        self.settings.read().clone()
    }

    /// Replace settings and persist them.
    pub fn update_settings(&self, settings: TransactionSettings) -> Result<(), TransactorError> {
        settings.save(&self.paths.transaction_settings())?;
        *self.settings.write() = settings;
        Ok(())
    }

    pub fn is_key_restrictions_satisfied(&self) -> bool {
        self.key_ok.load(Ordering::Relaxed)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Persist scribbles, records, and the auto-order index (hourly job and
    /// shutdown).
    pub fn save_state(&self) -> Result<(), TransactorError> {
        save_table(&self.paths.scribbles(), &*self.scribbles.read())?;
        save_table(&self.paths.asset_record(), &*self.asset_record.read())?;
        save_table(&self.paths.unrealized_changes(), &*self.unrealized.read())?;
        save_table(&self.paths.auto_order_record(), &*self.auto_orders.read())?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // User-data event application
    // ------------------------------------------------------------------

    /// Fold one user-data event into the mirror.
    pub fn apply_user_event(&self, event: UserEvent) {
        match event {
            UserEvent::AccountUpdate {
                event_time_ms,
                update,
            } => {
                let (token, leverage) = {
                    let settings = self.settings.read();
                    (settings.asset_token.clone(), settings.leverage.max(1) as f64)
                };
                let mut account = self.account.write();
                for balance in &update.balances {
                    if balance.asset == token {
                        account.wallet_balance = balance.wallet_balance;
                    }
                }
                for position in &update.positions {
                    account.positions.insert(
                        position.symbol.clone(),
                        Position {
                            margin: position.position_amount.abs() * position.entry_price
                                / leverage,
                            direction: PositionDirection::from_amount(position.position_amount),
                            entry_price: position.entry_price,
                            update_time_ms: event_time_ms,
                        },
                    );
                }
                account.observed_until = Moment::floor_ms(event_time_ms);
            }
            UserEvent::OrderUpdate { update, .. } => self.apply_order_update(update),
            UserEvent::ListenKeyExpired | UserEvent::Unknown => {}
        }
    }

    fn apply_order_update(&self, update: OrderUpdateRaw) {
        let classified = OrderType::classify(
            &update.order_type,
            &update.side,
            update.close_position,
            update.reduce_only,
        );
        let leverage = self.settings.read().leverage.max(1) as f64;
        let boundary = if update.stop_price > 0.0 {
            update.stop_price
        } else {
            update.price
        };

        {
            let mut account = self.account.write();
            if update.status == "NEW" || update.status == "PARTIALLY_FILLED" {
                let left_margin = (update.orig_qty - update.filled_qty) * boundary / leverage;
                account.record_open_order(
                    &update.symbol,
                    update.order_id,
                    OpenOrder {
                        order_type: classified,
                        boundary,
                        left_margin: Some(left_margin),
                    },
                );
            } else {
                account.remove_open_order(&update.symbol, update.order_id);
            }
        }

        if update.execution_type == "TRADE" {
            self.record_fill(&update);
        }
    }

    /// Append or fold one fill into the live asset record.
    fn record_fill(&self, update: &OrderUpdateRaw) {
        let cause = if self
            .auto_orders
            .read()
            .contains(&update.symbol, update.order_id)
        {
            RecordCause::AutoTrade
        } else {
            RecordCause::ManualTrade
        };

        let wallet = self.account.read().wallet_balance;
        let margin_ratio = if wallet > 0.0 {
            update.last_filled_qty * update.last_filled_price / wallet
        } else {
            0.0
        };
        let profit = update.realized_profit - update.commission;

        let mut record = self.asset_record.write();
        let folded = record.update_by_order_id(update.order_id, |entry| {
            entry.margin_ratio += margin_ratio;
        });
        if folded {
            // Later fill of a known order: only the tail balance moves.
            let tail = record.last_result_asset().unwrap_or(wallet);
            record.clamp_last_result_asset(tail + profit);
        } else {
            let base = record.last_result_asset().unwrap_or(wallet);
            record.append(AssetEntry {
                ts_ms: update.trade_time_ms,
                cause,
                symbol: update.symbol.clone(),
                side: Some(if update.side == "BUY" {
                    FillSide::Buy
                } else {
                    FillSide::Sell
                }),
                fill_price: update.last_filled_price,
                role: Some(if update.is_maker {
                    FillRole::Maker
                } else {
                    FillRole::Taker
                }),
                margin_ratio,
                order_id: update.order_id,
                result_asset: base + profit,
            });
        }
    }

    // ------------------------------------------------------------------
    // Decision cycle
    // ------------------------------------------------------------------

    /// One 10-second decision tick.
    ///
    /// The cycle never overlaps itself: if the previous one is still
    /// running, this tick is skipped.
    pub async fn on_tick(&self) {
        if self.cycle_running.swap(true, Ordering::SeqCst) {
            debug!("previous decision cycle still running, skipping tick");
            return;
        }
        let result = self.run_cycle().await;
        self.cycle_running.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => {}
            Err(TransactorError::Script(e)) => {
                warn!(error = %e, "strategy script failed, no orders placed");
            }
            Err(e) => warn!(error = %e, "decision cycle failed"),
        }
    }

    fn check_preconditions(&self) -> Result<(), CycleError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(CycleError::NotConnected);
        }
        if !self.settings.read().auto_transact {
            return Err(CycleError::AutoTransactOff);
        }
        if !self.key_ok.load(Ordering::Relaxed) {
            return Err(CycleError::KeyRestrictionUnsatisfied);
        }
        if self.source.cumulation_rate() < 1.0 {
            return Err(CycleError::CumulationIncomplete);
        }
        Ok(())
    }

    async fn run_cycle(&self) -> Result<(), TransactorError> {
        if let Err(reason) = self.check_preconditions() {
            debug!(reason = %reason, "decision cycle refused");
            return Ok(());
        }

        let code = self.settings.read().strategy_code.clone();
        let Some(strategy) = self.store.get(&code) else {
            debug!(code = %code, "no such strategy, cycle skipped");
            return Ok(());
        };

        let tick = Moment::floor(self.clock.now());
        let previous = tick.prev();

        // Give the collector up to five seconds to write the row for the
        // previous moment, then proceed with what exists.
        let deadline = std::time::Instant::now() + CANDLE_WAIT;
        while std::time::Instant::now() < deadline {
            if self
                .symbols
                .iter()
                .all(|s| self.source.has_row(previous, s))
            {
                break;
            }
            tokio::time::sleep(CANDLE_POLL).await;
        }

        let window = self
            .source
            .window(tick.offset_rows(-DECISION_WINDOW_ROWS), tick);

        // Indicators over the full window, computed off the runtime thread.
        let kernel = self.kernel.clone();
        let symbols = self.symbols.clone();
        let indicators = {
            let strategy = strategy.clone();
            let window = window.clone();
            let kernel = kernel.clone();
            let symbols = symbols.clone();
            tokio::task::spawn_blocking(move || {
                kernel.make_indicators(&strategy, &symbols, &window)
            })
            .await
            .map_err(|e| TransactorError::Decode(format!("indicator task died: {e}")))??
        };

        let mut candles: HashMap<String, Candle> = HashMap::new();
        for symbol in &self.symbols {
            if let Some(candle) = window.last_candle(symbol) {
                candles.insert(symbol.clone(), candle);
            }
        }

        let account_copy = self.account.read().clone();
        let mut scribbles_copy = self.scribbles.read().clone();

        let (decisions, new_scribbles) = {
            let strategy = strategy.clone();
            tokio::task::spawn_blocking(move || {
                let decisions = kernel.decide(
                    &strategy,
                    DecisionInputs {
                        symbols: &symbols,
                        current_moment: tick,
                        candles: &candles,
                        indicators: &indicators,
                        indicator_row: indicators.len().saturating_sub(1),
                        account: account_copy,
                        scribbles: &mut scribbles_copy,
                    },
                )?;
                Ok::<_, strategist::ScriptError>((decisions, scribbles_copy))
            })
            .await
            .map_err(|e| TransactorError::Decode(format!("decision task died: {e}")))??
        };

        *self.scribbles.write() = new_scribbles;

        if !decisions.is_empty() {
            self.place_decisions(decisions).await;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Order flush
    // ------------------------------------------------------------------

    /// Flush a decision set in three sequential phases: cancels, market
    /// orders, then conditional orders. Orders within a phase fire
    /// concurrently.
    pub async fn place_decisions(&self, decisions: DecisionSet) {
        // Phase one: cancel-all.
        let cancel_symbols: Vec<&String> = decisions
            .iter()
            .filter(|(_, orders)| orders.contains_key(&OrderType::CancelAll))
            .map(|(symbol, _)| symbol)
            .collect();
        let cancels = cancel_symbols
            .iter()
            .map(|symbol| self.client.cancel_all_orders(symbol));
        for (symbol, result) in cancel_symbols.iter().zip(join_all(cancels).await) {
            if let Err(e) = result {
                warn!(symbol = %symbol, error = %e, "cancel-all failed");
            }
        }

        // Phase two and three share the context construction.
        self.flush_phase(&decisions, |t| t.is_now()).await;
        self.flush_phase(&decisions, |t| t.is_book() || t.is_later()).await;
    }

    async fn flush_phase(&self, decisions: &DecisionSet, phase: impl Fn(&OrderType) -> bool) {
        let mut prepared: Vec<(String, Vec<(&'static str, String)>)> = Vec::new();

        for (symbol, orders) in decisions {
            let Some(rules) = self.rules.read().get(symbol).copied() else {
                warn!(symbol = %symbol, "no exchange rules yet, decisions dropped");
                continue;
            };
            let Some(current_price) = self.source.latest_close(symbol) else {
                warn!(symbol = %symbol, "no price reference yet, decisions dropped");
                continue;
            };

            // A NOW_BUY/NOW_SELL in this same tick implies the direction a
            // later close should assume when no position exists yet.
            let assumed_direction = if orders.contains_key(&OrderType::NowBuy) {
                PositionDirection::Long
            } else if orders.contains_key(&OrderType::NowSell) {
                PositionDirection::Short
            } else {
                PositionDirection::None
            };

            let position = self.account.read().position(symbol);
            let ctx = OrderContext {
                leverage: self.settings.read().leverage.max(1),
                rules,
                current_price,
                direction: position.direction,
                position_margin: position.margin,
                entry_price: position.entry_price,
                assumed_direction,
            };

            for (&order_type, decision) in orders {
                if order_type == OrderType::CancelAll || !phase(&order_type) {
                    continue;
                }
                match build_order_params(symbol, order_type, decision, &ctx) {
                    Ok(params) => prepared.push((symbol.clone(), params)),
                    Err(PlacementError::ZeroQuantity) => {}
                    Err(e) => {
                        warn!(symbol = %symbol, order_type = ?order_type, error = %e, "decision dropped");
                    }
                }
            }
        }

        let sends = prepared.iter().map(|(_, params)| {
            let refs: Vec<(&str, &str)> =
                params.iter().map(|(k, v)| (*k, v.as_str())).collect();
            async move { self.client.place_order(&refs).await }
        });

        for ((symbol, _), result) in prepared.iter().zip(join_all(sends).await) {
            match result {
                Ok(response) => {
                    // The auto-order record is the sole ground truth used to
                    // classify later fills as auto-originated.
                    self.auto_orders.write().append(
                        response.update_time_ms,
                        symbol,
                        response.order_id,
                    );
                }
                Err(e) => warn!(symbol = %symbol, error = %e, "order placement failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::parse_user_event;
    use auth::ApiCredentials;
    use common::{BinanceEnvironment, ServerClock};

    struct EmptySource;

    impl CandleSource for EmptySource {
        fn window(&self, _start: Moment, _end: Moment) -> CandleWindow {
            CandleWindow::default()
        }
        fn has_row(&self, _moment: Moment, _symbol: &str) -> bool {
            true
        }
        fn latest_close(&self, _symbol: &str) -> Option<f64> {
            Some(50_000.0)
        }
        fn cumulation_rate(&self) -> f64 {
            1.0
        }
    }

    fn test_transactor() -> Transactor {
        let dir = std::env::temp_dir().join(format!(
            "transactor_test_{}_{:?}",
            std::process::id(),
            std::thread::current().id()
        ));
        let paths = DataPaths::new(&dir);
        paths.ensure_dirs().unwrap();
        let clock: SharedClock = Arc::new(ServerClock::new());
        let client = Arc::new(
            BinanceFuturesClient::new(
                ApiCredentials::new("key".into(), "secret".into()),
                BinanceEnvironment::Testnet,
                clock.clone(),
            )
            .unwrap(),
        );
        let store = Arc::new(StrategyStore::load(paths.strategies()).unwrap());
        Transactor::new(
            vec!["BTCUSDT".into()],
            paths,
            client,
            clock,
            Arc::new(StrategyKernel::new()),
            store,
            Arc::new(EmptySource),
            Arc::new(AtomicBool::new(true)),
        )
        .unwrap()
    }

    fn order_update_json(
        order_id: u64,
        status: &str,
        exec: &str,
        last_qty: &str,
        rp: &str,
    ) -> String {
        format!(
            r#"{{
                "e": "ORDER_TRADE_UPDATE", "E": 1591274595442, "T": 1591274595453,
                "o": {{
                    "s": "BTCUSDT", "c": "x", "S": "BUY", "o": "MARKET", "f": "GTC",
                    "q": "0.010", "p": "0", "ap": "50000", "sp": "0", "x": "{exec}",
                    "X": "{status}", "i": {order_id}, "l": "{last_qty}", "z": "{last_qty}",
                    "L": "50000", "N": "USDT", "n": "0.02", "T": 1591274595442, "t": 1,
                    "b": "0", "a": "0", "m": false, "R": false, "wt": "CONTRACT_PRICE",
                    "ot": "MARKET", "ps": "BOTH", "cp": false, "rp": "{rp}"
                }}
            }}"#
        )
    }

    #[test]
    fn test_account_update_event() {
        let transactor = test_transactor();
        let mut settings = transactor.settings_snapshot();
        settings.leverage = 5;
        transactor.update_settings(settings).unwrap();

        let json = r#"{
            "e": "ACCOUNT_UPDATE", "E": 1591274590000, "T": 1591274590000,
            "a": {
                "B": [{"a": "USDT", "wb": "1000.0", "cw": "1000.0"}],
                "P": [{"s": "BTCUSDT", "pa": "-0.010", "ep": "50000", "cr": "0", "up": "0", "mt": "cross", "iw": "0", "ps": "BOTH"}]
            }
        }"#;
        transactor.apply_user_event(parse_user_event(json).unwrap());

        let account = transactor.account.read();
        assert_eq!(account.wallet_balance, 1000.0);
        let position = account.position("BTCUSDT");
        assert_eq!(position.direction, PositionDirection::Short);
        // |pa| * ep / leverage = 0.01 * 50000 / 5
        assert!((position.margin - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_order_update_lifecycle_and_fill_classification() {
        let transactor = test_transactor();
        transactor.account.write().wallet_balance = 1000.0;
        transactor.auto_orders.write().append(1, "BTCUSDT", 42);

        // NEW keeps the order in the mirror.
        let json = order_update_json(42, "NEW", "NEW", "0", "0");
        transactor.apply_user_event(parse_user_event(&json).unwrap());
        assert_eq!(transactor.account.read().open_order_count("BTCUSDT"), 1);

        // FILLED trade drops it and appends an AUTO_TRADE row.
        let json = order_update_json(42, "FILLED", "TRADE", "0.010", "2.5");
        transactor.apply_user_event(parse_user_event(&json).unwrap());
        assert_eq!(transactor.account.read().open_order_count("BTCUSDT"), 0);

        let record = transactor.asset_record.read();
        assert_eq!(record.len(), 1);
        let entry = &record.entries()[0];
        assert_eq!(entry.cause, RecordCause::AutoTrade);
        assert_eq!(entry.order_id, 42);
        // rp - commission = 2.5 - 0.02 on top of the wallet base.
        assert!((entry.result_asset - 1002.48).abs() < 1e-9);
        // margin_ratio = 0.010 * 50000 / 1000
        assert!((entry.margin_ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_manual_fill_classification() {
        let transactor = test_transactor();
        transactor.account.write().wallet_balance = 1000.0;

        let json = order_update_json(77, "FILLED", "TRADE", "0.010", "0");
        transactor.apply_user_event(parse_user_event(&json).unwrap());

        let record = transactor.asset_record.read();
        assert_eq!(record.entries()[0].cause, RecordCause::ManualTrade);
    }

    #[test]
    fn test_partial_fills_fold_into_one_row() {
        let transactor = test_transactor();
        transactor.account.write().wallet_balance = 1000.0;

        let json = order_update_json(9, "PARTIALLY_FILLED", "TRADE", "0.005", "0");
        transactor.apply_user_event(parse_user_event(&json).unwrap());
        let json = order_update_json(9, "FILLED", "TRADE", "0.005", "1.0");
        transactor.apply_user_event(parse_user_event(&json).unwrap());

        let record = transactor.asset_record.read();
        assert_eq!(record.len(), 1);
        // Two fills of 0.005 * 50000 / 1000 = 0.25 each.
        assert!((record.entries()[0].margin_ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_cycle_preconditions() {
        let transactor = test_transactor();
        // auto_transact defaults to off.
        assert_eq!(
            transactor.check_preconditions(),
            Err(CycleError::AutoTransactOff)
        );

        let mut settings = transactor.settings_snapshot();
        settings.auto_transact = true;
        transactor.update_settings(settings).unwrap();
        assert_eq!(
            transactor.check_preconditions(),
            Err(CycleError::KeyRestrictionUnsatisfied)
        );

        transactor.key_ok.store(true, Ordering::Relaxed);
        assert_eq!(transactor.check_preconditions(), Ok(()));

        transactor.connected.store(false, Ordering::Relaxed);
        assert_eq!(
            transactor.check_preconditions(),
            Err(CycleError::NotConnected)
        );
    }
}

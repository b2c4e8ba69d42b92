//! Reconciliation watchdog and conflicting-order cancellation.
//!
//! Every 10 seconds the watchdog rebuilds the account mirror from REST
//! snapshots so WebSocket drift can never accumulate, appends to the
//! unrealized-changes series, reconciles the asset record tail with the
//! authoritative wallet, and corrects per-symbol leverage and margin mode.
//! Every second, conflicting open orders are pruned.

use crate::error::TransactorError;
use crate::transactor::Transactor;
use futures_util::future::join_all;
use model::{
    AssetEntry, Moment, OpenOrder, OrderType, Position, PositionDirection, RecordCause,
};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

/// Relative tolerance between the API wallet and the asset record tail.
const WALLET_TOLERANCE: f64 = 1e-9;

impl Transactor {
    /// One reconciliation pass. Runs every 10 seconds.
    pub async fn reconcile(&self) -> Result<(), TransactorError> {
        if !self.is_connected() {
            return Ok(());
        }

        let settings = self.settings_snapshot();
        let now = Moment::floor(self.clock().now());

        // Exchange rules for order rounding.
        let info = self.client().exchange_info().await?;
        {
            let mut rules = self.rules.write();
            for symbol_info in &info.symbols {
                if self.symbols().contains(&symbol_info.symbol) {
                    rules.insert(symbol_info.symbol.clone(), symbol_info.rules());
                }
            }
        }

        // Highest allowed initial leverage per symbol.
        let brackets = self.client().leverage_brackets().await?;
        {
            let mut max_leverage = self.max_leverage.write();
            for entry in &brackets {
                let cap = entry
                    .brackets
                    .iter()
                    .map(|b| b.initial_leverage)
                    .max()
                    .unwrap_or(1);
                max_leverage.insert(entry.symbol.clone(), cap);
            }
        }

        // Account snapshot rebuilds wallet and positions from scratch.
        let snapshot = self.client().account_snapshot().await?;
        let wallet = snapshot
            .assets
            .iter()
            .find(|a| a.asset == settings.asset_token)
            .map(|a| a.wallet_balance)
            .unwrap_or(snapshot.total_wallet_balance);

        let leverage = settings.leverage.max(1) as f64;
        let mut positions: HashMap<String, Position> = HashMap::new();
        for position in &snapshot.positions {
            if !self.symbols().contains(&position.symbol) {
                continue;
            }
            positions.insert(
                position.symbol.clone(),
                Position {
                    margin: position.position_amt.abs() * position.entry_price / leverage,
                    direction: PositionDirection::from_amount(position.position_amt),
                    entry_price: position.entry_price,
                    update_time_ms: position.update_time_ms,
                },
            );
        }

        // Open orders per symbol, fetched concurrently.
        let fetches = self
            .symbols()
            .iter()
            .map(|symbol| self.client().open_orders(symbol));
        let mut open_orders: HashMap<String, HashMap<u64, OpenOrder>> = HashMap::new();
        for (symbol, result) in self.symbols().iter().zip(join_all(fetches).await) {
            match result {
                Ok(orders) => {
                    let mapped: HashMap<u64, OpenOrder> = orders
                        .iter()
                        .map(|order| {
                            (
                                order.order_id,
                                OpenOrder {
                                    order_type: OrderType::classify(
                                        &order.order_type,
                                        &order.side,
                                        order.close_position,
                                        order.reduce_only,
                                    ),
                                    boundary: order.boundary(),
                                    left_margin: Some(
                                        order.left_qty() * order.boundary() / leverage,
                                    ),
                                },
                            )
                        })
                        .collect();
                    if !mapped.is_empty() {
                        open_orders.insert(symbol.clone(), mapped);
                    }
                }
                Err(e) => {
                    debug!(symbol = %symbol, error = %e, "open-order snapshot failed");
                }
            }
        }

        {
            let mut account = self.account_lock().write();
            account.wallet_balance = wallet;
            account.positions = positions;
            account.open_orders = open_orders;
            account.observed_until = now;
        }

        // Unrealized ratio for the live curve.
        if wallet > 0.0 {
            let ratio = (snapshot.total_unrealized_profit / wallet) as f32;
            self.unrealized_lock().write().record(now, ratio);
        }

        self.reconcile_asset_tail(wallet, now);

        if settings.auto_transact {
            self.correct_account_modes(&snapshot, &settings).await;
        }

        // The key-restriction probe gates auto-transact.
        match self.client().api_restrictions().await {
            Ok(restrictions) => self
                .key_ok
                .store(restrictions.enable_futures, Ordering::Relaxed),
            Err(e) => {
                debug!(error = %e, "key restriction probe failed");
                self.key_ok.store(false, Ordering::Relaxed);
            }
        }

        Ok(())
    }

    fn reconcile_asset_tail(&self, wallet: f64, now: Moment) {
        let mut record = self.asset_record_lock().write();
        align_record_tail(&mut record, wallet, now.as_ms());
    }

    /// Push per-symbol leverage/margin mode toward the settings, and turn
    /// off multi-asset margin and hedge mode whenever they appear.
    async fn correct_account_modes(
        &self,
        snapshot: &binance_rest::AccountSnapshot,
        settings: &crate::settings::TransactionSettings,
    ) {
        for position in &snapshot.positions {
            if !self.symbols().contains(&position.symbol) {
                continue;
            }

            let wanted = {
                let caps = self.max_leverage.read();
                caps.get(&position.symbol)
                    .copied()
                    .unwrap_or(u32::MAX)
                    .min(settings.leverage)
            };
            if position.leverage as u32 != wanted {
                if let Err(e) = self.client().set_leverage(&position.symbol, wanted).await {
                    warn!(symbol = %position.symbol, error = %e, "leverage correction failed");
                }
            }

            if !settings.margin_mode.matches_isolated_flag(position.isolated) {
                if let Err(e) = self
                    .client()
                    .set_margin_type(&position.symbol, settings.margin_mode.as_exchange_str())
                    .await
                {
                    // Rejected while a position is open; the next pass retries.
                    debug!(symbol = %position.symbol, error = %e, "margin mode correction failed");
                }
            }
        }

        if snapshot.multi_assets_margin {
            if let Err(e) = self.client().set_multi_assets_margin(false).await {
                warn!(error = %e, "failed to disable multi-asset margin");
            }
        }
        let hedge_on = snapshot
            .positions
            .iter()
            .any(|p| !p.position_side.is_empty() && p.position_side != "BOTH");
        if hedge_on {
            if let Err(e) = self.client().set_hedge_mode(false).await {
                warn!(error = %e, "failed to disable hedge mode");
            }
        }
    }

    /// Cancel conflicting open orders. Runs every second.
    ///
    /// Orders of an unrecognized type are cancelled outright; for each
    /// recognized type with more than one open id the newest survives.
    /// 4xx rejections stay silent: the order usually just filled.
    pub async fn cancel_conflicting_orders(&self) {
        let snapshot = self.account_lock().read().open_orders.clone();
        let mut to_cancel: Vec<(String, u64)> = Vec::new();

        for (symbol, orders) in &snapshot {
            for order_id in Self::conflicting_order_ids(orders) {
                to_cancel.push((symbol.clone(), order_id));
            }
        }

        if to_cancel.is_empty() {
            return;
        }

        let cancels = to_cancel
            .iter()
            .map(|(symbol, order_id)| self.client().cancel_order(symbol, *order_id));
        for ((symbol, order_id), result) in to_cancel.iter().zip(join_all(cancels).await) {
            match result {
                Ok(_) => {
                    info!(symbol = %symbol, order_id, "conflicting order cancelled");
                    self.account_lock().write().remove_open_order(symbol, *order_id);
                }
                Err(e) if e.is_client_rejection() => {
                    debug!(symbol = %symbol, order_id, "cancel rejected, order likely gone");
                }
                Err(e) => warn!(symbol = %symbol, order_id, error = %e, "cancel failed"),
            }
        }
    }

    /// Pick which conflicting orders to cancel.
    pub fn conflicting_order_ids(
        orders: &HashMap<u64, OpenOrder>,
    ) -> Vec<u64> {
        let mut by_type: HashMap<Option<OrderType>, Vec<u64>> = HashMap::new();
        for (&order_id, order) in orders {
            by_type.entry(order.order_type).or_default().push(order_id);
        }

        let mut doomed = Vec::new();
        for (order_type, mut ids) in by_type {
            match order_type {
                None => doomed.extend(ids),
                Some(_) if ids.len() > 1 => {
                    ids.sort_unstable();
                    ids.pop();
                    doomed.extend(ids);
                }
                Some(_) => {}
            }
        }
        doomed.sort_unstable();
        doomed
    }
}

/// Align the asset record tail with the authoritative wallet balance.
///
/// A disagreement beyond tolerance means a funding fee, transfer, or
/// referral credit happened outside trading; it becomes an `OTHER` row.
/// Within tolerance the tail is clamped to the authoritative value.
pub(crate) fn align_record_tail(record: &mut model::AssetRecord, wallet: f64, now_ms: i64) {
    let adjustment = |result_asset: f64| AssetEntry {
        ts_ms: now_ms,
        cause: RecordCause::Other,
        symbol: String::new(),
        side: None,
        fill_price: 0.0,
        role: None,
        margin_ratio: 0.0,
        order_id: 0,
        result_asset,
    };

    match record.last_result_asset() {
        None => record.append(adjustment(wallet)),
        Some(last) => {
            let scale = wallet.abs().max(last.abs()).max(f64::MIN_POSITIVE);
            if ((wallet - last) / scale).abs() > WALLET_TOLERANCE {
                info!(
                    recorded = last,
                    authoritative = wallet,
                    "wallet moved outside trading, appending adjustment row"
                );
                record.append(adjustment(wallet));
            } else {
                record.clamp_last_result_asset(wallet);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{AssetRecord, FillRole, FillSide};

    fn order(order_type: Option<OrderType>) -> OpenOrder {
        OpenOrder {
            order_type,
            boundary: 50_000.0,
            left_margin: Some(10.0),
        }
    }

    #[test]
    fn test_duplicate_type_keeps_max_id() {
        let mut orders = HashMap::new();
        orders.insert(10, order(Some(OrderType::BookBuy)));
        orders.insert(20, order(Some(OrderType::BookBuy)));

        assert_eq!(Transactor::conflicting_order_ids(&orders), vec![10]);
    }

    #[test]
    fn test_unknown_type_cancelled_entirely() {
        let mut orders = HashMap::new();
        orders.insert(5, order(None));
        orders.insert(6, order(None));
        orders.insert(7, order(Some(OrderType::LaterUpClose)));

        assert_eq!(Transactor::conflicting_order_ids(&orders), vec![5, 6]);
    }

    #[test]
    fn test_distinct_types_untouched() {
        let mut orders = HashMap::new();
        orders.insert(1, order(Some(OrderType::BookBuy)));
        orders.insert(2, order(Some(OrderType::BookSell)));
        orders.insert(3, order(Some(OrderType::LaterUpClose)));

        assert!(Transactor::conflicting_order_ids(&orders).is_empty());
    }

    fn fill_row(ts_ms: i64, result_asset: f64) -> AssetEntry {
        AssetEntry {
            ts_ms,
            cause: RecordCause::AutoTrade,
            symbol: "BTCUSDT".into(),
            side: Some(FillSide::Buy),
            fill_price: 100.0,
            role: Some(FillRole::Taker),
            margin_ratio: 0.1,
            order_id: ts_ms as u64,
            result_asset,
        }
    }

    #[test]
    fn test_tail_clamped_within_tolerance() {
        let mut record = AssetRecord::new();
        record.append(fill_row(1_000, 1000.0));

        // Tiny float drift: clamp, no new row.
        align_record_tail(&mut record, 1000.0 + 1e-8, 2_000);
        assert_eq!(record.len(), 1);
        assert_eq!(record.last_result_asset(), Some(1000.0 + 1e-8));
    }

    #[test]
    fn test_external_wallet_move_appends_other_row() {
        let mut record = AssetRecord::new();
        record.append(fill_row(1_000, 1000.0));

        // A funding fee moved the wallet outside trading.
        align_record_tail(&mut record, 999.5, 2_000);
        assert_eq!(record.len(), 2);
        let tail = record.last().unwrap();
        assert_eq!(tail.cause, RecordCause::Other);
        assert_eq!(tail.side, None);
        assert_eq!(tail.result_asset, 999.5);
    }

    #[test]
    fn test_empty_record_seeds_genesis_row() {
        let mut record = AssetRecord::new();
        align_record_tail(&mut record, 500.0, 1_000);
        assert_eq!(record.len(), 1);
        assert_eq!(record.entries()[0].cause, RecordCause::Other);
        assert_eq!(record.last_result_asset(), Some(500.0));
    }
}

//! Local mirror of the exchange account.

use crate::moment::Moment;
use crate::order::OrderType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Side of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PositionDirection {
    Long,
    Short,
    #[default]
    None,
}

impl PositionDirection {
    /// Derive from the sign of a position amount.
    pub fn from_amount(amount: f64) -> Self {
        if amount > 0.0 {
            Self::Long
        } else if amount < 0.0 {
            Self::Short
        } else {
            Self::None
        }
    }

    /// `+1` for long, `-1` for short, `0` for flat.
    pub fn signum(&self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
            Self::None => 0.0,
        }
    }
}

/// One symbol's position in the mirror.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Position {
    /// Committed margin: `|amount| * entry_price / leverage`.
    pub margin: f64,
    pub direction: PositionDirection,
    pub entry_price: f64,
    /// Exchange update time, epoch milliseconds.
    pub update_time_ms: i64,
}

/// One open order in the mirror.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OpenOrder {
    /// `None` for orders this platform did not place (cancelled on sight).
    pub order_type: Option<OrderType>,
    /// Trigger price for `LATER_*`, limit price for `BOOK_*`.
    pub boundary: f64,
    /// Margin still represented by the unfilled remainder.
    pub left_margin: Option<f64>,
}

/// The account mirror the strategy reads and the watchdog rebuilds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountState {
    /// The newest moment whose events are reflected here.
    pub observed_until: Moment,
    /// Wallet balance in the asset token.
    pub wallet_balance: f64,
    pub positions: HashMap<String, Position>,
    /// symbol → order id → open order.
    pub open_orders: HashMap<String, HashMap<u64, OpenOrder>>,
}

impl AccountState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position for a symbol, flat if unknown.
    pub fn position(&self, symbol: &str) -> Position {
        self.positions.get(symbol).copied().unwrap_or_default()
    }

    /// Number of open orders on a symbol.
    pub fn open_order_count(&self, symbol: &str) -> usize {
        self.open_orders.get(symbol).map_or(0, |m| m.len())
    }

    /// Upsert an open order.
    pub fn record_open_order(&mut self, symbol: &str, order_id: u64, order: OpenOrder) {
        self.open_orders
            .entry(symbol.to_string())
            .or_default()
            .insert(order_id, order);
    }

    /// Drop an order that reached a terminal status.
    pub fn remove_open_order(&mut self, symbol: &str, order_id: u64) {
        if let Some(orders) = self.open_orders.get_mut(symbol) {
            orders.remove(&order_id);
            if orders.is_empty() {
                self.open_orders.remove(symbol);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_from_amount() {
        assert_eq!(PositionDirection::from_amount(0.5), PositionDirection::Long);
        assert_eq!(PositionDirection::from_amount(-0.5), PositionDirection::Short);
        assert_eq!(PositionDirection::from_amount(0.0), PositionDirection::None);
    }

    #[test]
    fn test_open_order_bookkeeping() {
        let mut state = AccountState::new();
        let order = OpenOrder {
            order_type: Some(OrderType::BookBuy),
            boundary: 50_000.0,
            left_margin: Some(10.0),
        };

        state.record_open_order("BTCUSDT", 7, order);
        assert_eq!(state.open_order_count("BTCUSDT"), 1);

        state.remove_open_order("BTCUSDT", 7);
        assert_eq!(state.open_order_count("BTCUSDT"), 0);
        assert!(!state.open_orders.contains_key("BTCUSDT"));
    }

    #[test]
    fn test_unknown_position_is_flat() {
        let state = AccountState::new();
        let position = state.position("BTCUSDT");
        assert_eq!(position.direction, PositionDirection::None);
        assert_eq!(position.margin, 0.0);
    }
}

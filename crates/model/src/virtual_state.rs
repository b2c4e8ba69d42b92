//! The simulator's position and pending-order bookkeeping, distinct from
//! the account-state mirror.

use crate::order::OrderType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Signed holding in one symbol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualLocation {
    /// Signed amount; positive = long, negative = short.
    pub amount: f64,
    pub entry_price: f64,
}

/// A pending order recorded in the virtual state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VirtualPlacement {
    pub order_id: u64,
    pub margin: f64,
    pub boundary: Option<f64>,
}

/// The simulator's bookkeeping of notional position and pending placements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualState {
    pub available_balance: f64,
    pub locations: HashMap<String, VirtualLocation>,
    pub placements: HashMap<String, BTreeMap<OrderType, VirtualPlacement>>,
}

impl VirtualState {
    /// The blank state a simulation starts from: unit balance, no holdings.
    pub fn blank() -> Self {
        Self {
            available_balance: 1.0,
            locations: HashMap::new(),
            placements: HashMap::new(),
        }
    }

    pub fn location(&self, symbol: &str) -> VirtualLocation {
        self.locations.get(symbol).copied().unwrap_or_default()
    }

    /// Wallet balance: available plus invested margin at entry price.
    pub fn wallet_balance(&self) -> f64 {
        let invested: f64 = self
            .locations
            .values()
            .map(|l| l.amount.abs() * l.entry_price)
            .sum();
        self.available_balance + invested
    }

    /// Drop all placements for a symbol.
    pub fn cancel_all(&mut self, symbol: &str) {
        self.placements.remove(symbol);
    }
}

impl Default for VirtualState {
    fn default() -> Self {
        Self::blank()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_state() {
        let state = VirtualState::blank();
        assert_eq!(state.available_balance, 1.0);
        assert_eq!(state.wallet_balance(), 1.0);
        assert_eq!(state.location("BTCUSDT").amount, 0.0);
    }

    #[test]
    fn test_wallet_balance_includes_invested_margin() {
        let mut state = VirtualState::blank();
        state.available_balance = 0.4;
        state.locations.insert(
            "BTCUSDT".into(),
            VirtualLocation {
                amount: -0.00001,
                entry_price: 50_000.0,
            },
        );

        assert!((state.wallet_balance() - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_cancel_all_clears_symbol() {
        let mut state = VirtualState::blank();
        state
            .placements
            .entry("BTCUSDT".into())
            .or_default()
            .insert(
                OrderType::BookBuy,
                VirtualPlacement {
                    order_id: 1,
                    margin: 0.1,
                    boundary: Some(49_000.0),
                },
            );

        state.cancel_all("BTCUSDT");
        assert!(state.placements.get("BTCUSDT").is_none());
    }
}

//! Virtual fill detection and position math.

use crate::error::SimulationError;
use model::{Candle, OrderType, VirtualLocation, VirtualState};

/// Seconds between a decision and its market fill inside a candle.
const DECISION_LAG_SECS: f64 = 3.0;

/// Where inside the candle a placement would fill.
///
/// `NOW_*` fills on the open-to-close path after the decision lag;
/// `BOOK_*`/`LATER_*` fill exactly at their boundary iff the candle's range
/// strictly straddles it.
pub fn fill_price(order_type: OrderType, boundary: Option<f64>, candle: &Candle) -> Option<f64> {
    if candle.is_empty() {
        return None;
    }
    if order_type.is_now() {
        let open = candle.open as f64;
        let close = candle.close as f64;
        return Some(open + (close - open) / 10.0 * DECISION_LAG_SECS);
    }
    let boundary = boundary?;
    if (candle.low as f64) < boundary && boundary < (candle.high as f64) {
        Some(boundary)
    } else {
        None
    }
}

/// What one virtual trade did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeOutcome {
    /// Signed change of the holding.
    pub amount_shift: f64,
    pub fill_price: f64,
    pub realized_profit: f64,
}

/// Apply a signed amount shift at a fill price.
///
/// Covers the five position cases: open from zero, close to zero, flip
/// direction, grow, and shrink. Raises when the available balance would go
/// negative or the invested margin is negative or NaN.
pub fn apply_trade(
    state: &mut VirtualState,
    symbol: &str,
    amount_shift: f64,
    price: f64,
) -> Result<TradeOutcome, SimulationError> {
    if !amount_shift.is_finite() || amount_shift == 0.0 {
        return Err(SimulationError::new(format!(
            "bad amount shift {amount_shift} on {symbol}"
        )));
    }
    if !price.is_finite() || price <= 0.0 {
        return Err(SimulationError::new(format!(
            "bad fill price {price} on {symbol}"
        )));
    }

    let location = state.location(symbol);
    let old_amount = location.amount;
    let new_amount = old_amount + amount_shift;
    let mut realized_profit = 0.0;

    if old_amount == 0.0 {
        // Open from zero.
        let invested = amount_shift.abs() * price;
        state.available_balance -= invested;
        state
            .locations
            .insert(symbol.to_string(), VirtualLocation {
                amount: new_amount,
                entry_price: price,
            });
    } else if new_amount == 0.0 {
        // Close to zero.
        realized_profit = (price - location.entry_price) * old_amount;
        state.available_balance += old_amount.abs() * location.entry_price + realized_profit;
        state.locations.remove(symbol);
    } else if old_amount.signum() != new_amount.signum() {
        // Flip: close everything, open the remainder the other way.
        realized_profit = (price - location.entry_price) * old_amount;
        state.available_balance += old_amount.abs() * location.entry_price + realized_profit;
        let invested = new_amount.abs() * price;
        state.available_balance -= invested;
        state
            .locations
            .insert(symbol.to_string(), VirtualLocation {
                amount: new_amount,
                entry_price: price,
            });
    } else if new_amount.abs() > old_amount.abs() {
        // Grow the same direction: weighted-average entry.
        let invested = amount_shift.abs() * price;
        state.available_balance -= invested;
        let entry_price = (old_amount.abs() * location.entry_price
            + amount_shift.abs() * price)
            / new_amount.abs();
        state
            .locations
            .insert(symbol.to_string(), VirtualLocation {
                amount: new_amount,
                entry_price,
            });
    } else {
        // Shrink: return the closed part's margin plus its profit.
        let closed = amount_shift.abs();
        realized_profit = (price - location.entry_price) * old_amount.signum() * closed;
        state.available_balance += closed * location.entry_price + realized_profit;
        state
            .locations
            .insert(symbol.to_string(), VirtualLocation {
                amount: new_amount,
                entry_price: location.entry_price,
            });
    }

    if !state.available_balance.is_finite() {
        return Err(SimulationError::new(format!(
            "balance became non-finite on {symbol}"
        )));
    }
    if state.available_balance < 0.0 {
        return Err(SimulationError::new(format!(
            "available balance went negative on {symbol}: {}",
            state.available_balance
        )));
    }

    Ok(TradeOutcome {
        amount_shift,
        fill_price: price,
        realized_profit,
    })
}

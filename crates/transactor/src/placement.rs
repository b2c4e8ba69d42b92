//! Decision → exchange-order translation.
//!
//! Pure parameter assembly: quantity derivation with the exchange's step
//! and precision rules, boundary rounding, and the mapping from the
//! twelve-variant taxonomy onto exchange order primitives. The async
//! three-phase flush lives on the transactor.

use binance_rest::{ceil_to_step, SymbolRules};
use model::{Decision, OrderType, PositionDirection};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

/// Everything symbol-specific the translation needs.
#[derive(Debug, Clone, Copy)]
pub struct OrderContext {
    pub leverage: u32,
    pub rules: SymbolRules,
    /// Latest traded price, the reference for `NOW_*` quantities.
    pub current_price: f64,
    pub direction: PositionDirection,
    pub position_margin: f64,
    pub entry_price: f64,
    /// Direction implied by a `NOW_BUY`/`NOW_SELL` issued earlier in the
    /// same tick, consulted when no position exists yet.
    pub assumed_direction: PositionDirection,
}

/// Why a single decision could not be turned into an order.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlacementError {
    /// A close decision with no position and no same-tick assumption.
    #[error("no resolvable side for close order")]
    NoResolvableSide,

    /// A book or later decision without a boundary price.
    #[error("missing boundary price")]
    MissingBoundary,

    /// Quantity degenerated to zero after rounding.
    #[error("zero quantity")]
    ZeroQuantity,

    /// A price was NaN or non-positive.
    #[error("unusable price")]
    BadPrice,
}

/// Side of the close order that flattens `direction`.
fn closing_side(ctx: &OrderContext) -> Result<&'static str, PlacementError> {
    let direction = match ctx.direction {
        PositionDirection::None => ctx.assumed_direction,
        held => held,
    };
    match direction {
        PositionDirection::Long => Ok("SELL"),
        PositionDirection::Short => Ok("BUY"),
        PositionDirection::None => Err(PlacementError::NoResolvableSide),
    }
}

fn to_decimal(value: f64) -> Result<Decimal, PlacementError> {
    if !value.is_finite() {
        return Err(PlacementError::BadPrice);
    }
    Decimal::from_f64(value).ok_or(PlacementError::BadPrice)
}

/// Derive the order quantity from margin and the reference price.
///
/// `notional = max(min_notional, margin * leverage)`, then
/// `quantity = min(max_quantity, notional / price_reference)` rounded up
/// to the step.
fn derive_quantity(
    margin: f64,
    price_reference: f64,
    ctx: &OrderContext,
) -> Result<Decimal, PlacementError> {
    if price_reference <= 0.0 || !price_reference.is_finite() {
        return Err(PlacementError::BadPrice);
    }
    let margin = to_decimal(margin)?;
    let price = to_decimal(price_reference)?;
    let notional = (margin * Decimal::from(ctx.leverage)).max(ctx.rules.min_notional);
    let quantity = (notional / price).min(ctx.rules.max_quantity);
    let quantity = ceil_to_step(
        quantity,
        ctx.rules.step_size,
        ctx.rules.quantity_precision,
    );
    if quantity <= Decimal::ZERO {
        return Err(PlacementError::ZeroQuantity);
    }
    Ok(quantity)
}

/// Quantity that flattens the current position.
fn closing_quantity(ctx: &OrderContext) -> Result<Decimal, PlacementError> {
    if ctx.entry_price <= 0.0 {
        return Err(PlacementError::BadPrice);
    }
    let amount = ctx.position_margin * ctx.leverage as f64 / ctx.entry_price;
    let quantity = ceil_to_step(
        to_decimal(amount)?,
        ctx.rules.step_size,
        ctx.rules.quantity_precision,
    );
    if quantity <= Decimal::ZERO {
        return Err(PlacementError::ZeroQuantity);
    }
    Ok(quantity)
}

fn rounded_boundary(decision: &Decision, ctx: &OrderContext) -> Result<Decimal, PlacementError> {
    let boundary = decision.boundary.ok_or(PlacementError::MissingBoundary)?;
    if boundary <= 0.0 || !boundary.is_finite() {
        return Err(PlacementError::BadPrice);
    }
    Ok(to_decimal(boundary)?.round_dp(ctx.rules.price_precision))
}

/// Assemble the POST /fapi/v1/order parameters for one decision.
///
/// `CANCEL_ALL` never reaches this function; it maps to the dedicated
/// cancel endpoint in phase one.
pub fn build_order_params(
    symbol: &str,
    order_type: OrderType,
    decision: &Decision,
    ctx: &OrderContext,
) -> Result<Vec<(&'static str, String)>, PlacementError> {
    let mut params: Vec<(&'static str, String)> = vec![("symbol", symbol.to_string())];

    match order_type {
        OrderType::CancelAll => unreachable!("cancel-all is phase one"),
        OrderType::NowClose => {
            params.push(("side", closing_side(ctx)?.into()));
            params.push(("type", "MARKET".into()));
            params.push(("quantity", closing_quantity(ctx)?.to_string()));
            params.push(("reduceOnly", "true".into()));
        }
        OrderType::NowBuy | OrderType::NowSell => {
            let side = if order_type == OrderType::NowBuy {
                "BUY"
            } else {
                "SELL"
            };
            let quantity = derive_quantity(decision.margin, ctx.current_price, ctx)?;
            params.push(("side", side.into()));
            params.push(("type", "MARKET".into()));
            params.push(("quantity", quantity.to_string()));
        }
        OrderType::BookBuy | OrderType::BookSell => {
            let side = if order_type == OrderType::BookBuy {
                "BUY"
            } else {
                "SELL"
            };
            let boundary = rounded_boundary(decision, ctx)?;
            let quantity =
                derive_quantity(decision.margin, decision.boundary.unwrap_or(0.0), ctx)?;
            params.push(("side", side.into()));
            params.push(("type", "LIMIT".into()));
            params.push(("timeInForce", "GTC".into()));
            params.push(("quantity", quantity.to_string()));
            params.push(("price", boundary.to_string()));
        }
        OrderType::LaterUpBuy
        | OrderType::LaterUpSell
        | OrderType::LaterDownBuy
        | OrderType::LaterDownSell => {
            // Up + buy-side and down + sell-side arm on a stop; the other
            // two arm on a take-profit.
            let (side, kind) = match order_type {
                OrderType::LaterUpBuy => ("BUY", "STOP_MARKET"),
                OrderType::LaterDownSell => ("SELL", "STOP_MARKET"),
                OrderType::LaterUpSell => ("SELL", "TAKE_PROFIT_MARKET"),
                _ => ("BUY", "TAKE_PROFIT_MARKET"),
            };
            let boundary = rounded_boundary(decision, ctx)?;
            let quantity =
                derive_quantity(decision.margin, decision.boundary.unwrap_or(0.0), ctx)?;
            params.push(("side", side.into()));
            params.push(("type", kind.into()));
            params.push(("quantity", quantity.to_string()));
            params.push(("stopPrice", boundary.to_string()));
        }
        OrderType::LaterUpClose | OrderType::LaterDownClose => {
            let side = closing_side(ctx)?;
            let kind = match (order_type, side) {
                (OrderType::LaterUpClose, "SELL") => "TAKE_PROFIT_MARKET",
                (OrderType::LaterUpClose, _) => "STOP_MARKET",
                (_, "SELL") => "STOP_MARKET",
                (_, _) => "TAKE_PROFIT_MARKET",
            };
            let boundary = rounded_boundary(decision, ctx)?;
            params.push(("side", side.into()));
            params.push(("type", kind.into()));
            params.push(("stopPrice", boundary.to_string()));
            params.push(("closePosition", "true".into()));
        }
    }

    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ctx() -> OrderContext {
        OrderContext {
            leverage: 5,
            rules: SymbolRules {
                price_precision: 2,
                quantity_precision: 3,
                step_size: dec!(0.001),
                max_quantity: dec!(100),
                min_notional: dec!(5),
            },
            current_price: 50_000.0,
            direction: PositionDirection::None,
            position_margin: 0.0,
            entry_price: 0.0,
            assumed_direction: PositionDirection::None,
        }
    }

    fn param<'a>(params: &'a [(&'static str, String)], key: &str) -> &'a str {
        params
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or_else(|| panic!("missing param {key}"))
    }

    #[test]
    fn test_now_buy_quantity_derivation() {
        let decision = Decision {
            margin: 100.0,
            boundary: None,
        };
        let params =
            build_order_params("BTCUSDT", OrderType::NowBuy, &decision, &ctx()).unwrap();

        assert_eq!(param(&params, "symbol"), "BTCUSDT");
        assert_eq!(param(&params, "side"), "BUY");
        assert_eq!(param(&params, "type"), "MARKET");
        assert_eq!(param(&params, "quantity"), "0.010");
    }

    #[test]
    fn test_min_notional_floor() {
        // 0.2 margin * 5 = 1 notional, below the 5 minimum.
        let decision = Decision {
            margin: 0.2,
            boundary: None,
        };
        let params =
            build_order_params("BTCUSDT", OrderType::NowSell, &decision, &ctx()).unwrap();
        // 5 / 50000 = 0.0001, ceiled to the 0.001 step.
        assert_eq!(param(&params, "quantity"), "0.001");
        assert_eq!(param(&params, "side"), "SELL");
    }

    #[test]
    fn test_book_order_uses_boundary_reference() {
        let decision = Decision {
            margin: 100.0,
            boundary: Some(40_000.004),
        };
        let params =
            build_order_params("BTCUSDT", OrderType::BookBuy, &decision, &ctx()).unwrap();
        assert_eq!(param(&params, "type"), "LIMIT");
        assert_eq!(param(&params, "timeInForce"), "GTC");
        assert_eq!(param(&params, "price"), "40000.00");
        // 500 / 40000 = 0.0125 -> 0.013 after the step ceil.
        assert_eq!(param(&params, "quantity"), "0.013");
    }

    #[test]
    fn test_later_primitive_mapping() {
        let decision = Decision {
            margin: 100.0,
            boundary: Some(60_000.0),
        };
        let cases = [
            (OrderType::LaterUpBuy, "BUY", "STOP_MARKET"),
            (OrderType::LaterDownSell, "SELL", "STOP_MARKET"),
            (OrderType::LaterUpSell, "SELL", "TAKE_PROFIT_MARKET"),
            (OrderType::LaterDownBuy, "BUY", "TAKE_PROFIT_MARKET"),
        ];
        for (order_type, side, kind) in cases {
            let params = build_order_params("BTCUSDT", order_type, &decision, &ctx()).unwrap();
            assert_eq!(param(&params, "side"), side, "{order_type:?}");
            assert_eq!(param(&params, "type"), kind, "{order_type:?}");
            assert_eq!(param(&params, "stopPrice"), "60000");
        }
    }

    #[test]
    fn test_close_variants_derive_side_from_direction() {
        let mut long_ctx = ctx();
        long_ctx.direction = PositionDirection::Long;
        long_ctx.position_margin = 100.0;
        long_ctx.entry_price = 50_000.0;

        let decision = Decision {
            margin: 0.0,
            boundary: Some(61_000.0),
        };
        let params =
            build_order_params("BTCUSDT", OrderType::LaterUpClose, &decision, &long_ctx)
                .unwrap();
        assert_eq!(param(&params, "side"), "SELL");
        assert_eq!(param(&params, "type"), "TAKE_PROFIT_MARKET");
        assert_eq!(param(&params, "closePosition"), "true");
        assert!(params.iter().all(|(k, _)| *k != "quantity"));

        let params =
            build_order_params("BTCUSDT", OrderType::LaterDownClose, &decision, &long_ctx)
                .unwrap();
        assert_eq!(param(&params, "side"), "SELL");
        assert_eq!(param(&params, "type"), "STOP_MARKET");
    }

    #[test]
    fn test_now_close_uses_position_amount() {
        let mut short_ctx = ctx();
        short_ctx.direction = PositionDirection::Short;
        short_ctx.position_margin = 100.0;
        short_ctx.entry_price = 50_000.0;

        let decision = Decision {
            margin: 0.0,
            boundary: None,
        };
        let params =
            build_order_params("BTCUSDT", OrderType::NowClose, &decision, &short_ctx).unwrap();
        assert_eq!(param(&params, "side"), "BUY");
        assert_eq!(param(&params, "reduceOnly"), "true");
        // 100 * 5 / 50000 = 0.01
        assert_eq!(param(&params, "quantity"), "0.010");
    }

    #[test]
    fn test_close_without_direction_uses_same_tick_assumption() {
        let mut assumed = ctx();
        assumed.assumed_direction = PositionDirection::Long;

        let decision = Decision {
            margin: 0.0,
            boundary: Some(61_000.0),
        };
        let params =
            build_order_params("BTCUSDT", OrderType::LaterUpClose, &decision, &assumed).unwrap();
        assert_eq!(param(&params, "side"), "SELL");

        let bare = ctx();
        assert_eq!(
            build_order_params("BTCUSDT", OrderType::LaterUpClose, &decision, &bare),
            Err(PlacementError::NoResolvableSide)
        );
    }

    #[test]
    fn test_classification_round_trip() {
        // An ORDER_TRADE_UPDATE derived from a placed order re-classifies
        // to the order type it was placed as, for every variant.
        let mut long_ctx = ctx();
        long_ctx.direction = PositionDirection::Long;
        long_ctx.position_margin = 100.0;
        long_ctx.entry_price = 50_000.0;

        let decision = Decision {
            margin: 100.0,
            boundary: Some(60_000.0),
        };

        for order_type in OrderType::ALL {
            if order_type == OrderType::CancelAll {
                continue; // maps to the cancel endpoint, not an order
            }
            let params =
                build_order_params("BTCUSDT", order_type, &decision, &long_ctx).unwrap();

            let kind = param(&params, "type");
            let side = param(&params, "side");
            let close_position = params.iter().any(|(k, v)| *k == "closePosition" && v == "true");
            let reduce_only = params.iter().any(|(k, v)| *k == "reduceOnly" && v == "true");

            assert_eq!(
                OrderType::classify(kind, side, close_position, reduce_only),
                Some(order_type),
                "{order_type:?} did not survive the round trip"
            );
        }
    }

    #[test]
    fn test_missing_boundary_is_error() {
        let decision = Decision {
            margin: 100.0,
            boundary: None,
        };
        assert_eq!(
            build_order_params("BTCUSDT", OrderType::BookBuy, &decision, &ctx()),
            Err(PlacementError::MissingBoundary)
        );
    }
}

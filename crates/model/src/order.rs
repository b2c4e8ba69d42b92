//! The twelve-variant order taxonomy shared by the live transactor and the
//! simulator, and the strategy decision payload.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// What a strategy can ask for on one symbol.
///
/// `Now*` fill immediately at market, `Book*` rest on the book as limit
/// orders, `Later*` trigger when the price crosses the boundary from below
/// (`Up`) or above (`Down`). `Close` variants flatten the position.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    CancelAll,
    NowClose,
    NowBuy,
    NowSell,
    BookBuy,
    BookSell,
    LaterUpClose,
    LaterUpBuy,
    LaterUpSell,
    LaterDownClose,
    LaterDownBuy,
    LaterDownSell,
}

impl OrderType {
    /// All variants, in phase order.
    pub const ALL: [OrderType; 12] = [
        OrderType::CancelAll,
        OrderType::NowClose,
        OrderType::NowBuy,
        OrderType::NowSell,
        OrderType::BookBuy,
        OrderType::BookSell,
        OrderType::LaterUpClose,
        OrderType::LaterUpBuy,
        OrderType::LaterUpSell,
        OrderType::LaterDownClose,
        OrderType::LaterDownBuy,
        OrderType::LaterDownSell,
    ];

    /// Classify an exchange order into the taxonomy.
    ///
    /// `kind` is the exchange order type string, `side` is `BUY`/`SELL`,
    /// `close_position` and `reduce_only` come from the same payload.
    /// Returns `None` for orders that were not placed by this taxonomy
    /// (manual limit-maker orders, trailing stops, ...).
    pub fn classify(
        kind: &str,
        side: &str,
        close_position: bool,
        reduce_only: bool,
    ) -> Option<Self> {
        match (kind, side) {
            ("MARKET", _) if reduce_only || close_position => Some(Self::NowClose),
            ("MARKET", "BUY") => Some(Self::NowBuy),
            ("MARKET", "SELL") => Some(Self::NowSell),
            ("LIMIT", "BUY") => Some(Self::BookBuy),
            ("LIMIT", "SELL") => Some(Self::BookSell),
            ("STOP_MARKET", "BUY") if close_position => Some(Self::LaterUpClose),
            ("STOP_MARKET", "SELL") if close_position => Some(Self::LaterDownClose),
            ("STOP_MARKET", "BUY") => Some(Self::LaterUpBuy),
            ("STOP_MARKET", "SELL") => Some(Self::LaterDownSell),
            ("TAKE_PROFIT_MARKET", "SELL") if close_position => Some(Self::LaterUpClose),
            ("TAKE_PROFIT_MARKET", "BUY") if close_position => Some(Self::LaterDownClose),
            ("TAKE_PROFIT_MARKET", "SELL") => Some(Self::LaterUpSell),
            ("TAKE_PROFIT_MARKET", "BUY") => Some(Self::LaterDownBuy),
            _ => None,
        }
    }

    /// Parse a script-facing name (`NOW_BUY`, `LATER_UP_CLOSE`, ...).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CANCEL_ALL" => Some(Self::CancelAll),
            "NOW_CLOSE" => Some(Self::NowClose),
            "NOW_BUY" => Some(Self::NowBuy),
            "NOW_SELL" => Some(Self::NowSell),
            "BOOK_BUY" => Some(Self::BookBuy),
            "BOOK_SELL" => Some(Self::BookSell),
            "LATER_UP_CLOSE" => Some(Self::LaterUpClose),
            "LATER_UP_BUY" => Some(Self::LaterUpBuy),
            "LATER_UP_SELL" => Some(Self::LaterUpSell),
            "LATER_DOWN_CLOSE" => Some(Self::LaterDownClose),
            "LATER_DOWN_BUY" => Some(Self::LaterDownBuy),
            "LATER_DOWN_SELL" => Some(Self::LaterDownSell),
            _ => None,
        }
    }

    /// Whether the order flattens the position.
    pub fn is_close(&self) -> bool {
        matches!(
            self,
            Self::NowClose | Self::LaterUpClose | Self::LaterDownClose
        )
    }

    /// Whether the order fills immediately at market.
    pub fn is_now(&self) -> bool {
        matches!(self, Self::NowClose | Self::NowBuy | Self::NowSell)
    }

    /// Whether the order rests on the book as a limit order.
    pub fn is_book(&self) -> bool {
        matches!(self, Self::BookBuy | Self::BookSell)
    }

    /// Whether the order waits for a boundary crossing.
    pub fn is_later(&self) -> bool {
        matches!(
            self,
            Self::LaterUpClose
                | Self::LaterUpBuy
                | Self::LaterUpSell
                | Self::LaterDownClose
                | Self::LaterDownBuy
                | Self::LaterDownSell
        )
    }
}

/// One strategy decision for one order type on one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Decision {
    /// Margin to commit, in the asset token.
    pub margin: f64,
    /// Trigger or limit price; `None` for market and cancel decisions.
    pub boundary: Option<f64>,
}

/// The full output of one decision evaluation: symbol → order type → decision.
///
/// `BTreeMap` keeps per-symbol iteration deterministic across the order
/// placement phases.
pub type DecisionSet = HashMap<String, BTreeMap<OrderType, Decision>>;

/// Remove symbols whose decision map came back empty.
pub fn strip_empty_decisions(decisions: &mut DecisionSet) {
    decisions.retain(|_, orders| !orders.is_empty());
}

//! Domain model for the trading platform.
//!
//! - **Moment**: a UTC instant aligned to a 10-second boundary, the primary
//!   time unit of the candle grid
//! - **Candle grid**: dense time-indexed OHLCV table over all target symbols
//! - **Realtime rings**: bounded FIFO deques of WebSocket events
//! - **Order taxonomy**: the twelve-variant [`OrderType`] and [`Decision`]
//! - **Account state**: the local mirror of the exchange account
//! - **Records**: asset record, unrealized-changes series, auto-order record
//! - **Virtual state**: the simulator's position/placement bookkeeping
//!
//! Ownership of the mutable instances lives with the components (collector,
//! transactor, simulator); this crate defines the types and their invariants.

mod account;
mod candle;
mod moment;
mod order;
mod record;
mod ring;
mod scribbles;
mod virtual_state;

pub use account::{AccountState, OpenOrder, Position, PositionDirection};
pub use candle::{Candle, CandleField, CandleGrid, CandleWindow, IDEAL_DAY_ROWS};
pub use moment::{Moment, MomentError, TICK_SECS};
pub use record::{
    AssetEntry, AssetRecord, AutoOrderRecord, FillRole, FillSide, RecordCause,
    UnrealizedChanges,
};
pub use order::{strip_empty_decisions, Decision, DecisionSet, OrderType};
pub use ring::{
    AggregateTrade, BookTicker, EventRing, MarkPrice, QuoteEvent, QUOTE_RING_CAPACITY,
    TRADE_RING_CAPACITY,
};
pub use scribbles::{ScribbleValue, Scribbles};
pub use virtual_state::{VirtualLocation, VirtualPlacement, VirtualState};

//! Live transactor.
//!
//! Maintains an accurate local mirror of the exchange account through the
//! user-data WebSocket stream, runs the strategy each 10-second tick,
//! emits orders with exchange-specific rounding, and appends every fill to
//! the live asset record.

mod error;
mod events;
mod placement;
mod settings;
mod transactor;
mod user_stream;
mod watchdog;

pub use error::{CycleError, TransactorError};
pub use events::{parse_user_event, UserEvent};
pub use placement::{build_order_params, OrderContext};
pub use settings::{MarginMode, TransactionSettings};
pub use transactor::{CandleSource, Transactor};
pub use user_stream::run_user_stream;

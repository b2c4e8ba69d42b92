//! Market-data collector.
//!
//! Produces a gap-free 10-second candle grid over every target symbol:
//!
//! - **Streams**: three WebSocket subscriptions feed the realtime rings
//!   (`!markPrice@arr@1s`, per-symbol `@bookTicker` and `@aggTrade`)
//! - **Synthesis**: every 10 seconds the aggregate-trade ring is folded
//!   into one candle row per symbol
//! - **Gap filler**: REST `aggTrades` paging repairs holes in the last 24 h
//! - **Backfill**: historical archive ZIPs rebuild whole months and years
//! - **Persistence**: yearly partitions rewritten atomically every hour

mod backfill;
mod collector;
mod error;
mod parse;
mod persist;
mod stream;
mod synthesis;

pub use backfill::{BackfillProgress, BackfillRange};
pub use collector::{Collector, CollectorStatus};
pub use error::CollectorError;
pub use persist::{load_partition, save_partition};
pub use stream::{run_market_stream, StreamKind};
pub use synthesis::{bucket_candles, synthesize_candle};

//! Simulator.
//!
//! Deterministic replay of a strategy over one year of candle data under
//! lossless, zero-fee, unit-leverage execution. The raw outputs (asset
//! record, unrealized changes, scribbles, account state, virtual state)
//! have the same shape as the live ones; fees and leverage are applied
//! afterwards as a presentation overlay that never mutates the raw data.

mod engine;
mod error;
mod fill;
mod output;
mod overlay;
mod progress;

pub use engine::{run_simulation, SimulationConfig, SimulationOutput};
pub use error::{SimulationError, SimulatorError};
pub use fill::{apply_trade, fill_price, TradeOutcome};
pub use output::{load_outputs, save_outputs};
pub use overlay::{present_asset_record, present_unrealized, PresentationSettings};
pub use progress::SimulationProgress;

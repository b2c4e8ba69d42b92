//! Strategy storage and the script kernel.
//!
//! A strategy is two user-authored scripts evaluated in a controlled
//! namespace: an **indicators script** that derives per-symbol series from
//! the candle window, and a **decision script** that reads the latest row
//! and writes order decisions. The kernel compiles each script once per
//! `(code_name, version)` and caches the compiled program.
//!
//! The script language exposes only numeric/boolean/string operations,
//! duration helpers, candle and indicator row access, scribble mutation,
//! and decision placement. No file or network access exists in the
//! evaluator.

mod error;
mod indicators;
mod kernel;
pub mod script;
mod store;
mod strategy;

pub use error::{ScriptError, StrategistError};
pub use indicators::{IndicatorCategory, IndicatorPack};
pub use kernel::{DecisionInputs, StrategyKernel};
pub use store::StrategyStore;
pub use strategy::Strategy;

//! Shared infrastructure for the trading platform.
//!
//! - **Environment**: production/testnet URL sets for the futures API
//! - **DataPaths**: the on-disk layout every component persists under
//! - **ServerClock**: offset-corrected clock aligned to exchange time
//! - **ExponentialBackoff**: reconnection delays with jitter

mod backoff;
mod clock;
mod environment;
mod paths;

pub use backoff::ExponentialBackoff;
pub use clock::{ServerClock, SharedClock};
pub use environment::{BinanceEnvironment, ParseEnvironmentError};
pub use paths::{atomic_replace, DataPaths};

use tracing_subscriber::EnvFilter;

/// Initialize process-wide tracing.
///
/// Reads `RUST_LOG` for filtering; defaults to `info`.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}

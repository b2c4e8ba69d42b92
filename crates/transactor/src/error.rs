use strategist::ScriptError;
use thiserror::Error;

/// Errors from the transactor component.
#[derive(Debug, Error)]
pub enum TransactorError {
    #[error("REST error: {0}")]
    Rest(#[from] binance_rest::BinanceRestError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state decode error: {0}")]
    Decode(String),

    #[error(transparent)]
    Script(#[from] ScriptError),
}

/// Why a decision cycle refused to run or was abandoned.
///
/// All variants are recoverable: the cycle is skipped, logged, and the next
/// tick tries again.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CycleError {
    #[error("internet probe failed")]
    NotConnected,

    #[error("auto-transact is off")]
    AutoTransactOff,

    #[error("API key restrictions unsatisfied")]
    KeyRestrictionUnsatisfied,

    #[error("24h candle cumulation incomplete")]
    CumulationIncomplete,

    #[error("no strategy selected")]
    NoStrategy,

    #[error("previous cycle still running")]
    Overlap,
}

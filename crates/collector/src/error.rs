use thiserror::Error;

/// Errors from the collector.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("REST error: {0}")]
    Rest(#[from] binance_rest::BinanceRestError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("partition decode error: {0}")]
    Decode(String),

    /// The exchange has no trades at all for a symbol; it is marked gone
    /// and excluded from filling henceforth.
    #[error("no historical data for symbol {0}")]
    MissingHistoricalData(String),
}

//! Binance USDT-M futures environment configuration.
//!
//! Supports production and testnet environments with appropriate URLs.

use std::fmt;
use std::str::FromStr;

/// Binance environment (production or testnet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinanceEnvironment {
    /// Production environment (real money).
    #[default]
    Production,
    /// Testnet environment (fake money for testing).
    Testnet,
}

impl BinanceEnvironment {
    /// Futures REST API base URL.
    pub fn futures_rest_base_url(&self) -> &'static str {
        match self {
            Self::Production => "https://fapi.binance.com",
            Self::Testnet => "https://testnet.binancefuture.com",
        }
    }

    /// Spot REST API base URL (the key-restriction probe lives there).
    pub fn spot_rest_base_url(&self) -> &'static str {
        match self {
            Self::Production => "https://api.binance.com",
            Self::Testnet => "https://testnet.binance.vision",
        }
    }

    /// WebSocket base URL for futures market and user-data streams.
    pub fn futures_ws_base_url(&self) -> &'static str {
        match self {
            Self::Production => "wss://fstream.binance.com",
            Self::Testnet => "wss://stream.binancefuture.com",
        }
    }

    /// Public historical-data archive base URL.
    ///
    /// Daily and monthly aggregate-trade ZIPs are served from here; the
    /// archive has no testnet counterpart.
    pub fn data_base_url(&self) -> &'static str {
        "https://data.binance.vision"
    }

    /// Returns true if this is the production environment.
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Load environment from `BINANCE_ENVIRONMENT` env var.
    ///
    /// Returns `Production` if not set or invalid.
    pub fn from_env() -> Self {
        std::env::var("BINANCE_ENVIRONMENT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }
}

impl fmt::Display for BinanceEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Testnet => write!(f, "testnet"),
        }
    }
}

impl FromStr for BinanceEnvironment {
    type Err = ParseEnvironmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" | "prod" | "mainnet" | "main" => Ok(Self::Production),
            "testnet" | "test" | "sandbox" => Ok(Self::Testnet),
            _ => Err(ParseEnvironmentError(s.to_string())),
        }
    }
}

/// Error parsing environment string.
#[derive(Debug, Clone)]
pub struct ParseEnvironmentError(String);

impl fmt::Display for ParseEnvironmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid environment '{}', expected 'production' or 'testnet'",
            self.0
        )
    }
}

impl std::error::Error for ParseEnvironmentError {}

//! Transaction settings persisted as JSON.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Margin mode applied to every target symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarginMode {
    #[default]
    Crossed,
    Isolated,
}

impl MarginMode {
    /// Exchange parameter value.
    pub fn as_exchange_str(&self) -> &'static str {
        match self {
            Self::Crossed => "CROSSED",
            Self::Isolated => "ISOLATED",
        }
    }

    /// Whether an account position row matches this mode.
    pub fn matches_isolated_flag(&self, isolated: bool) -> bool {
        match self {
            Self::Crossed => !isolated,
            Self::Isolated => isolated,
        }
    }
}

/// User-facing transactor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSettings {
    /// Leverage applied to every target symbol.
    pub leverage: u32,
    pub margin_mode: MarginMode,
    /// Master switch for the decision cycle.
    pub auto_transact: bool,
    /// Code name of the strategy to run; empty selects none.
    pub strategy_code: String,
    /// Quote token the account is denominated in.
    pub asset_token: String,
}

impl Default for TransactionSettings {
    fn default() -> Self {
        Self {
            leverage: 1,
            margin_mode: MarginMode::Crossed,
            auto_transact: false,
            strategy_code: String::new(),
            asset_token: "USDT".into(),
        }
    }
}

impl TransactionSettings {
    /// Load from JSON, defaulting when the file does not exist.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = TransactionSettings::default();
        assert_eq!(settings.leverage, 1);
        assert!(!settings.auto_transact);
        assert_eq!(settings.asset_token, "USDT");
    }

    #[test]
    fn test_margin_mode_strings() {
        assert_eq!(MarginMode::Crossed.as_exchange_str(), "CROSSED");
        assert_eq!(MarginMode::Isolated.as_exchange_str(), "ISOLATED");
        assert!(MarginMode::Crossed.matches_isolated_flag(false));
        assert!(!MarginMode::Crossed.matches_isolated_flag(true));
    }

    #[test]
    fn test_load_save_roundtrip() {
        let dir = std::env::temp_dir().join(format!("transactor_settings_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("transaction_settings.json");

        let mut settings = TransactionSettings::default();
        settings.leverage = 5;
        settings.strategy_code = "ABCDEF".into();
        settings.save(&path).unwrap();

        let loaded = TransactionSettings::load(&path).unwrap();
        assert_eq!(loaded.leverage, 5);
        assert_eq!(loaded.strategy_code, "ABCDEF");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}

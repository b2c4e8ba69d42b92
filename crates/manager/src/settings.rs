//! Management settings persisted as JSON.

use common::BinanceEnvironment;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Process-level configuration.
///
/// The target-symbol set is fixed at first run; changing it requires a new
/// data folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagementSettings {
    pub target_symbols: Vec<String>,
    /// `production` or `testnet`.
    pub environment: String,
}

impl Default for ManagementSettings {
    fn default() -> Self {
        Self {
            target_symbols: vec!["BTCUSDT".into()],
            environment: "production".into(),
        }
    }
}

impl ManagementSettings {
    /// Load from JSON; on first run the defaults are written back.
    pub fn load_or_init(path: &Path) -> std::io::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let settings = Self::default();
                settings.save(path)?;
                Ok(settings)
            }
            Err(e) => Err(e),
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, text)
    }

    pub fn parsed_environment(&self) -> BinanceEnvironment {
        self.environment.parse().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_run_writes_defaults() {
        let dir = std::env::temp_dir().join(format!("manager_settings_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("management_settings.json");
        let _ = std::fs::remove_file(&path);

        let settings = ManagementSettings::load_or_init(&path).unwrap();
        assert_eq!(settings.target_symbols, vec!["BTCUSDT".to_string()]);
        assert!(path.exists());

        let again = ManagementSettings::load_or_init(&path).unwrap();
        assert_eq!(again.target_symbols, settings.target_symbols);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_environment_parsing() {
        let mut settings = ManagementSettings::default();
        assert!(settings.parsed_environment().is_production());
        settings.environment = "testnet".into();
        assert!(!settings.parsed_environment().is_production());
        settings.environment = "garbage".into();
        assert!(settings.parsed_environment().is_production());
    }
}

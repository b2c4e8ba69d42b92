//! Strategy persistence: a JSON array at `{datapath}/strategist/strategies.json`.

use crate::error::StrategistError;
use crate::strategy::{parse_version, Strategy};
use parking_lot::RwLock;
use std::path::PathBuf;

/// CRUD over the strategy file with the store invariants:
/// code names are unique and versions never decrease on save.
pub struct StrategyStore {
    path: PathBuf,
    strategies: RwLock<Vec<Strategy>>,
}

impl StrategyStore {
    /// Load the store, or start empty when the file does not exist yet.
    pub fn load(path: PathBuf) -> Result<Self, StrategistError> {
        let strategies = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            strategies: RwLock::new(strategies),
        })
    }

    fn persist(&self, strategies: &[Strategy]) -> Result<(), StrategistError> {
        let text = serde_json::to_string_pretty(strategies)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }

    pub fn list(&self) -> Vec<Strategy> {
        self.strategies.read().clone()
    }

    pub fn get(&self, code_name: &str) -> Option<Strategy> {
        self.strategies
            .read()
            .iter()
            .find(|s| s.code_name == code_name)
            .cloned()
    }

    /// Add a new strategy; the code name must be unused.
    pub fn create(&self, strategy: Strategy) -> Result<(), StrategistError> {
        strategy.validate()?;
        let mut strategies = self.strategies.write();
        if strategies.iter().any(|s| s.code_name == strategy.code_name) {
            return Err(StrategistError::DuplicateCodeName(strategy.code_name));
        }
        strategies.push(strategy);
        self.persist(&strategies)
    }

    /// Replace an existing strategy; the version may only increase or stay.
    pub fn update(&self, strategy: Strategy) -> Result<(), StrategistError> {
        strategy.validate()?;
        let mut strategies = self.strategies.write();
        let slot = strategies
            .iter_mut()
            .find(|s| s.code_name == strategy.code_name)
            .ok_or_else(|| StrategistError::UnknownCodeName(strategy.code_name.clone()))?;

        let stored = parse_version(&slot.version)
            .ok_or_else(|| StrategistError::BadVersion(slot.version.clone()))?;
        let given = parse_version(&strategy.version)
            .ok_or_else(|| StrategistError::BadVersion(strategy.version.clone()))?;
        if given < stored {
            return Err(StrategistError::VersionDecreased {
                stored: slot.version.clone(),
                given: strategy.version,
            });
        }

        *slot = strategy;
        self.persist(&strategies)
    }

    pub fn remove(&self, code_name: &str) -> Result<(), StrategistError> {
        let mut strategies = self.strategies.write();
        let before = strategies.len();
        strategies.retain(|s| s.code_name != code_name);
        if strategies.len() == before {
            return Err(StrategistError::UnknownCodeName(code_name.into()));
        }
        self.persist(&strategies)
    }
}

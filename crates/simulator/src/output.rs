//! Simulation output persistence.
//!
//! Five files per `(code, version, year)` under `{datapath}/simulator/`,
//! mirroring the live transactor's state layout.

use crate::engine::SimulationOutput;
use crate::error::SimulatorError;
use common::DataPaths;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

fn save_one<T: Serialize>(path: &Path, value: &T) -> Result<(), SimulatorError> {
    let bytes =
        bincode::serialize(value).map_err(|e| SimulatorError::Codec(e.to_string()))?;
    std::fs::write(path, bytes)?;
    Ok(())
}

fn load_one<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, SimulatorError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    bincode::deserialize(&bytes)
        .map(Some)
        .map_err(|e| SimulatorError::Codec(e.to_string()))
}

/// Write all five outputs.
pub fn save_outputs(
    paths: &DataPaths,
    code: &str,
    version: &str,
    year: i32,
    output: &SimulationOutput,
) -> Result<(), SimulatorError> {
    let path = |kind: &str| paths.simulation_output(code, version, year, kind);
    save_one(&path("asset_record"), &output.asset_record)?;
    save_one(&path("unrealized_changes"), &output.unrealized_changes)?;
    save_one(&path("scribbles"), &output.scribbles)?;
    save_one(&path("account_state"), &output.account_state)?;
    save_one(&path("virtual_state"), &output.virtual_state)?;
    Ok(())
}

/// Load all five outputs; `None` if any file is missing.
pub fn load_outputs(
    paths: &DataPaths,
    code: &str,
    version: &str,
    year: i32,
) -> Result<Option<SimulationOutput>, SimulatorError> {
    let path = |kind: &str| paths.simulation_output(code, version, year, kind);
    let (Some(asset_record), Some(unrealized_changes), Some(scribbles), Some(account_state), Some(virtual_state)) = (
        load_one(&path("asset_record"))?,
        load_one(&path("unrealized_changes"))?,
        load_one(&path("scribbles"))?,
        load_one(&path("account_state"))?,
        load_one(&path("virtual_state"))?,
    ) else {
        return Ok(None);
    };

    Ok(Some(SimulationOutput {
        asset_record,
        unrealized_changes,
        scribbles,
        account_state,
        virtual_state,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{AccountState, AssetRecord, Scribbles, UnrealizedChanges, VirtualState};

    #[test]
    fn test_outputs_roundtrip() {
        let dir = std::env::temp_dir().join(format!("simulator_output_{}", std::process::id()));
        let paths = DataPaths::new(&dir);
        paths.ensure_dirs().unwrap();

        let mut output = SimulationOutput {
            asset_record: AssetRecord::new(),
            unrealized_changes: UnrealizedChanges::new(),
            scribbles: Scribbles::new(),
            account_state: AccountState::new(),
            virtual_state: VirtualState::blank(),
        };
        output.virtual_state.available_balance = 1.25;

        save_outputs(&paths, "ABCDEF", "1.0", 2024, &output).unwrap();
        let loaded = load_outputs(&paths, "ABCDEF", "1.0", 2024).unwrap().unwrap();
        assert_eq!(loaded.virtual_state.available_balance, 1.25);

        assert!(load_outputs(&paths, "GHIJKL", "1.0", 2024).unwrap().is_none());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}

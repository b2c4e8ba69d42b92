//! On-disk layout of persisted state.
//!
//! Every component derives its file paths from one `DataPaths` so the
//! layout is defined in a single place:
//!
//! ```text
//! {datapath}/collector/candle_data_{YYYY}.bin(+.new/.backup)
//! {datapath}/transactor/transaction_settings.json
//! {datapath}/transactor/{scribbles,unrealized_changes,asset_record,auto_order_record}.bin
//! {datapath}/simulator/{code}_{version}_{year}_*.bin
//! {datapath}/strategist/strategies.json
//! {datapath}/manager/management_settings.json
//! ```

use std::io;
use std::path::{Path, PathBuf};

/// Root of the data folder plus helpers for every persisted artifact.
#[derive(Debug, Clone)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the component subdirectories if missing.
    pub fn ensure_dirs(&self) -> io::Result<()> {
        for sub in ["collector", "transactor", "simulator", "strategist", "manager"] {
            std::fs::create_dir_all(self.root.join(sub))?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn candle_partition(&self, year: i32) -> PathBuf {
        self.root
            .join("collector")
            .join(format!("candle_data_{year}.bin"))
    }

    pub fn transaction_settings(&self) -> PathBuf {
        self.root.join("transactor").join("transaction_settings.json")
    }

    pub fn scribbles(&self) -> PathBuf {
        self.root.join("transactor").join("scribbles.bin")
    }

    pub fn unrealized_changes(&self) -> PathBuf {
        self.root.join("transactor").join("unrealized_changes.bin")
    }

    pub fn asset_record(&self) -> PathBuf {
        self.root.join("transactor").join("asset_record.bin")
    }

    pub fn auto_order_record(&self) -> PathBuf {
        self.root.join("transactor").join("auto_order_record.bin")
    }

    /// One of the five per-run simulator outputs.
    pub fn simulation_output(&self, code: &str, version: &str, year: i32, kind: &str) -> PathBuf {
        self.root
            .join("simulator")
            .join(format!("{code}_{version}_{year}_{kind}.bin"))
    }

    pub fn strategies(&self) -> PathBuf {
        self.root.join("strategist").join("strategies.json")
    }

    pub fn management_settings(&self) -> PathBuf {
        self.root.join("manager").join("management_settings.json")
    }
}

/// Atomically replace `target` with `bytes`.
///
/// Writes `target.new`, rotates the existing file to `target.backup`, then
/// renames `.new` into place. A crash at any point leaves either the old or
/// the new complete file on disk.
pub fn atomic_replace(target: &Path, bytes: &[u8]) -> io::Result<()> {
    let new_path = with_suffix(target, ".new");
    let backup_path = with_suffix(target, ".backup");

    std::fs::write(&new_path, bytes)?;
    if target.exists() {
        std::fs::rename(target, &backup_path)?;
    }
    std::fs::rename(&new_path, target)?;
    Ok(())
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

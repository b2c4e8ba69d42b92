//! Yearly partition persistence.
//!
//! Partitions serialize with bincode and replace their file atomically:
//! write `.new`, rotate the old file to `.backup`, rename into place.

use crate::error::CollectorError;
use common::{atomic_replace, DataPaths};
use model::CandleGrid;

/// Write one year's rows of `grid` to its partition file.
pub fn save_partition(
    paths: &DataPaths,
    grid: &CandleGrid,
    year: i32,
) -> Result<(), CollectorError> {
    let partition = grid.year_partition(year);
    let bytes = bincode::serialize(&partition)
        .map_err(|e| CollectorError::Decode(format!("encode failed: {e}")))?;
    atomic_replace(&paths.candle_partition(year), &bytes)?;
    tracing::debug!(year, rows = partition.len(), "candle partition saved");
    Ok(())
}

/// Write an already-sliced partition grid directly (backfill path).
pub fn save_partition_grid(
    paths: &DataPaths,
    partition: &CandleGrid,
    year: i32,
) -> Result<(), CollectorError> {
    let bytes = bincode::serialize(partition)
        .map_err(|e| CollectorError::Decode(format!("encode failed: {e}")))?;
    atomic_replace(&paths.candle_partition(year), &bytes)?;
    Ok(())
}

/// Load one year's partition; `None` when the file does not exist.
pub fn load_partition(
    paths: &DataPaths,
    year: i32,
) -> Result<Option<CandleGrid>, CollectorError> {
    let path = paths.candle_partition(year);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let grid = bincode::deserialize(&bytes)
        .map_err(|e| CollectorError::Decode(format!("decode failed: {e}")))?;
    Ok(Some(grid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{Candle, Moment};

    #[test]
    fn test_partition_roundtrip() {
        let dir = std::env::temp_dir().join(format!("collector_persist_{}", std::process::id()));
        std::fs::create_dir_all(dir.join("collector")).unwrap();
        let paths = DataPaths::new(&dir);

        let mut grid = CandleGrid::new();
        // 2024-01-01T00:00:00Z
        let moment = Moment::try_from_ms(1_704_067_200_000).unwrap();
        grid.set(moment, "BTCUSDT", Candle::flat(42_000.0));

        save_partition(&paths, &grid, 2024).unwrap();
        let loaded = load_partition(&paths, 2024).unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get(moment, "BTCUSDT").unwrap().close, 42_000.0);

        assert!(load_partition(&paths, 1999).unwrap().is_none());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}

//! Historical backfill from the public archive.
//!
//! The user picks one of four ranges; each expands to (symbol, period)
//! work items. Items download their ZIP, decode it on the blocking pool,
//! and synthesize 10-second candles. Current-year data merges into the
//! live grid; completed previous years stream straight to their partition
//! file and are never all held in memory at once.

use crate::collector::Collector;
use crate::error::CollectorError;
use crate::persist::save_partition_grid;
use crate::synthesis::bucket_candles;
use binance_rest::{archive_path, parse_aggtrade_archive, ArchivePeriod};
use chrono::{Datelike, Duration, NaiveDate};
use model::CandleGrid;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Earliest year the archive is fetched from.
const FIRST_ARCHIVE_YEAR: i32 = 2020;

/// Concurrent downloads.
const DOWNLOAD_CONCURRENCY: usize = 4;

/// Which span of history to rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillRange {
    /// All complete months, 2020 through the last full year.
    PastYears,
    /// All complete months of the current year.
    CurrentYearMonths,
    /// This month, day by day, up to yesterday.
    CurrentMonthDays,
    /// Yesterday and the day before.
    RecentTwoDays,
}

/// Shared progress counters feeding the progress bar.
#[derive(Debug, Default)]
pub struct BackfillProgress {
    pub completed: AtomicUsize,
    pub total: AtomicUsize,
}

impl BackfillProgress {
    /// Completed fraction in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        let total = self.total.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.completed.load(Ordering::Relaxed) as f64 / total as f64
    }
}

/// Expand a range into archive periods given today's date.
pub fn expand_periods(range: BackfillRange, today: NaiveDate) -> Vec<ArchivePeriod> {
    match range {
        BackfillRange::PastYears => {
            let mut periods = Vec::new();
            for year in FIRST_ARCHIVE_YEAR..today.year() {
                for month in 1..=12 {
                    periods.push(ArchivePeriod::Month { year, month });
                }
            }
            periods
        }
        BackfillRange::CurrentYearMonths => (1..today.month())
            .map(|month| ArchivePeriod::Month {
                year: today.year(),
                month,
            })
            .collect(),
        BackfillRange::CurrentMonthDays => (1..today.day())
            .map(|day| ArchivePeriod::Day {
                year: today.year(),
                month: today.month(),
                day,
            })
            .collect(),
        BackfillRange::RecentTwoDays => [1i64, 2]
            .iter()
            .map(|&back| {
                let date = today - Duration::days(back);
                ArchivePeriod::Day {
                    year: date.year(),
                    month: date.month(),
                    day: date.day(),
                }
            })
            .collect(),
    }
}

fn period_year(period: ArchivePeriod) -> i32 {
    match period {
        ArchivePeriod::Day { year, .. } => year,
        ArchivePeriod::Month { year, .. } => year,
    }
}

impl Collector {
    /// Download and merge historical candles for `range`.
    ///
    /// Cancellation-safe: aborting the task drops the in-flight downloads
    /// and leaves already-written partitions intact.
    pub async fn backfill(
        &self,
        range: BackfillRange,
        progress: Arc<BackfillProgress>,
    ) -> Result<(), CollectorError> {
        let today = self.clock().now().date_naive();
        let periods = expand_periods(range, today);
        let current_year = today.year();

        progress.total.store(
            periods.len() * self.symbols().len(),
            Ordering::Relaxed,
        );
        progress.completed.store(0, Ordering::Relaxed);

        // Group by year so completed previous years write straight to
        // their partition and drop out of memory.
        let mut years: Vec<i32> = periods.iter().map(|p| period_year(*p)).collect();
        years.dedup();

        for year in years {
            let year_periods: Vec<ArchivePeriod> = periods
                .iter()
                .copied()
                .filter(|p| period_year(*p) == year)
                .collect();

            let year_grid = self
                .backfill_year(&year_periods, progress.clone())
                .await?;

            if year == current_year {
                self.grid().write().merge(&year_grid);
            } else {
                save_partition_grid(self.paths(), &year_grid, year)?;
            }
            info!(year, rows = year_grid.len(), "backfill year merged");
        }

        Ok(())
    }

    /// Fetch one year's periods with bounded concurrency.
    async fn backfill_year(
        &self,
        periods: &[ArchivePeriod],
        progress: Arc<BackfillProgress>,
    ) -> Result<CandleGrid, CollectorError> {
        let semaphore = Arc::new(Semaphore::new(DOWNLOAD_CONCURRENCY));
        let mut tasks = Vec::new();

        for &period in periods {
            for symbol in self.symbols() {
                let permit = semaphore.clone().acquire_owned();
                let client = self.client().clone();
                let symbol = symbol.clone();
                let progress = progress.clone();

                tasks.push(tokio::spawn(async move {
                    let _permit = permit.await.expect("semaphore closed");
                    let path = archive_path(&symbol, period);

                    let result = match client.download_archive(&path).await {
                        Ok(bytes) => {
                            let decode_symbol = symbol.clone();
                            tokio::task::spawn_blocking(move || {
                                parse_aggtrade_archive(&decode_symbol, &bytes)
                            })
                            .await
                            .map_err(|e| {
                                CollectorError::Decode(format!("decode task failed: {e}"))
                            })
                            .and_then(|r| r.map_err(Into::into))
                        }
                        Err(e) => Err(e.into()),
                    };

                    progress.completed.fetch_add(1, Ordering::Relaxed);

                    match result {
                        Ok(trades) => {
                            // Archives cover their whole period, so every
                            // bucket inside is complete.
                            Some((symbol, bucket_candles(&trades, Some(i64::MAX))))
                        }
                        Err(e) => {
                            warn!(symbol = %symbol, path = %path, error = %e, "archive fetch failed");
                            None
                        }
                    }
                }));
            }
        }

        let mut grid = CandleGrid::new();
        for task in tasks {
            let Ok(Some((symbol, candles))) = task.await else {
                continue;
            };
            for (moment, candle) in candles {
                grid.set(moment, &symbol, candle);
            }
        }
        Ok(grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_expand_past_years() {
        let periods = expand_periods(BackfillRange::PastYears, date(2024, 6, 15));
        // 2020..=2023, twelve months each.
        assert_eq!(periods.len(), 4 * 12);
        assert_eq!(periods[0], ArchivePeriod::Month { year: 2020, month: 1 });
        assert_eq!(
            periods.last(),
            Some(&ArchivePeriod::Month {
                year: 2023,
                month: 12
            })
        );
    }

    #[test]
    fn test_expand_current_year_months() {
        let periods = expand_periods(BackfillRange::CurrentYearMonths, date(2024, 6, 15));
        assert_eq!(periods.len(), 5);
        assert_eq!(periods[4], ArchivePeriod::Month { year: 2024, month: 5 });
    }

    #[test]
    fn test_expand_current_month_days() {
        let periods = expand_periods(BackfillRange::CurrentMonthDays, date(2024, 6, 3));
        assert_eq!(
            periods,
            vec![
                ArchivePeriod::Day { year: 2024, month: 6, day: 1 },
                ArchivePeriod::Day { year: 2024, month: 6, day: 2 },
            ]
        );
    }

    #[test]
    fn test_expand_recent_two_days_crosses_month() {
        let periods = expand_periods(BackfillRange::RecentTwoDays, date(2024, 7, 1));
        assert_eq!(
            periods,
            vec![
                ArchivePeriod::Day { year: 2024, month: 6, day: 30 },
                ArchivePeriod::Day { year: 2024, month: 6, day: 29 },
            ]
        );
    }

    #[test]
    fn test_progress_fraction() {
        let progress = BackfillProgress::default();
        assert_eq!(progress.fraction(), 0.0);
        progress.total.store(4, Ordering::Relaxed);
        progress.completed.store(1, Ordering::Relaxed);
        assert_eq!(progress.fraction(), 0.25);
    }
}

//! The root `Core` struct.
//!
//! Owns every component behind shared handles and hands each one narrow
//! views of its peers: the transactor reads candles through a
//! [`transactor::CandleSource`] adapter rather than holding the collector.

use crate::settings::ManagementSettings;
use crate::tasks::UniqueTaskRegistry;
use auth::ApiCredentials;
use binance_rest::BinanceFuturesClient;
use collector::{BackfillProgress, BackfillRange, Collector};
use common::{DataPaths, ServerClock, SharedClock};
use model::{CandleGrid, CandleWindow, Moment};
use parking_lot::RwLock;
use simulator::{
    run_simulation, save_outputs, SimulationConfig, SimulationProgress, SimulatorError,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use strategist::{Strategy, StrategyKernel, StrategyStore};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};
use transactor::{run_user_stream, CandleSource, Transactor};

/// Errors while assembling the core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("REST error: {0}")]
    Rest(#[from] binance_rest::BinanceRestError),

    #[error("collector error: {0}")]
    Collector(#[from] collector::CollectorError),

    #[error("transactor error: {0}")]
    Transactor(#[from] transactor::TransactorError),

    #[error("strategist error: {0}")]
    Strategist(#[from] strategist::StrategistError),
}

/// Adapter giving the transactor read access to the collector's grid.
struct CollectorSource {
    grid: Arc<RwLock<CandleGrid>>,
    collector: Arc<Collector>,
}

impl CandleSource for CollectorSource {
    fn window(&self, start: Moment, end: Moment) -> CandleWindow {
        self.grid.read().window(start, end)
    }

    fn has_row(&self, moment: Moment, symbol: &str) -> bool {
        self.grid
            .read()
            .get(moment, symbol)
            .is_some_and(|c| !c.is_empty())
    }

    fn latest_close(&self, symbol: &str) -> Option<f64> {
        let grid = self.grid.read();
        let last = grid.last_moment()?;
        grid.inherited_close(symbol, last.next(), 8640)
            .map(f64::from)
    }

    fn cumulation_rate(&self) -> f64 {
        self.collector.cumulation_rate()
    }
}

/// The process root: one of each component plus the shared clock, the
/// internet-probe flag, and the named-task registry.
pub struct Core {
    pub paths: DataPaths,
    pub clock: SharedClock,
    pub client: Arc<BinanceFuturesClient>,
    pub collector: Arc<Collector>,
    pub transactor: Arc<Transactor>,
    pub kernel: Arc<StrategyKernel>,
    pub store: Arc<StrategyStore>,
    pub connected: Arc<AtomicBool>,
    pub tasks: UniqueTaskRegistry,
}

impl Core {
    /// Assemble all components from settings and credentials.
    pub fn new(
        datapath: impl Into<std::path::PathBuf>,
        credentials: ApiCredentials,
    ) -> Result<Self, CoreError> {
        let paths = DataPaths::new(datapath);
        paths.ensure_dirs()?;

        let settings = ManagementSettings::load_or_init(&paths.management_settings())?;
        let environment = settings.parsed_environment();
        let symbols = settings.target_symbols.clone();

        let clock: SharedClock = Arc::new(ServerClock::new());
        let client = Arc::new(BinanceFuturesClient::new(
            credentials,
            environment,
            clock.clone(),
        )?);
        let kernel = Arc::new(StrategyKernel::new());
        let store = Arc::new(StrategyStore::load(paths.strategies())?);
        let connected = Arc::new(AtomicBool::new(false));

        let collector = Arc::new(Collector::new(
            symbols.clone(),
            environment,
            paths.clone(),
            client.clone(),
            clock.clone(),
        )?);

        let source: Arc<dyn CandleSource> = Arc::new(CollectorSource {
            grid: collector.grid(),
            collector: collector.clone(),
        });

        let transactor = Arc::new(Transactor::new(
            symbols,
            paths.clone(),
            client.clone(),
            clock.clone(),
            kernel.clone(),
            store.clone(),
            source,
            connected.clone(),
        )?);

        info!(environment = %environment, "core assembled");

        Ok(Self {
            paths,
            clock,
            client,
            collector,
            transactor,
            kernel,
            store,
            connected,
            tasks: UniqueTaskRegistry::new(),
        })
    }

    /// Spawn the long-lived stream tasks.
    pub fn spawn_streams(&self, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = self.collector.spawn_streams(shutdown_rx.clone());
        handles.push(tokio::spawn(run_user_stream(
            self.transactor.clone(),
            shutdown_rx,
        )));
        handles
    }

    /// Launch (or relaunch) a historical backfill.
    ///
    /// Returns the shared progress counters; an already-running backfill is
    /// cancelled first.
    pub fn start_backfill(self: &Arc<Self>, range: BackfillRange) -> Arc<BackfillProgress> {
        let progress = Arc::new(BackfillProgress::default());
        let core = self.clone();
        let task_progress = progress.clone();
        self.tasks.launch("download-fill", async move {
            if let Err(e) = core.collector.backfill(range, task_progress).await {
                error!(error = %e, "backfill failed");
            } else if let Err(e) = core.collector.persist_current_year() {
                error!(error = %e, "partition save after backfill failed");
            }
        });
        progress
    }

    /// Launch (or relaunch) a simulation for a strategy over a year.
    ///
    /// Raw outputs are persisted under the simulator directory when the run
    /// completes; failures surface through the returned progress handle's
    /// task and the log.
    pub fn start_simulation(
        self: &Arc<Self>,
        strategy: Strategy,
        year: i32,
        range: Option<(Moment, Moment)>,
    ) -> Arc<SimulationProgress> {
        let progress = Arc::new(SimulationProgress::new());
        let core = self.clone();
        let task_progress = progress.clone();

        self.tasks.launch("calculate-simulation", async move {
            // Prefer the persisted yearly partition; fall back to the live
            // grid for a year that has not been written out yet.
            let grid = match collector::load_partition(&core.paths, year) {
                Ok(Some(partition)) => partition,
                _ => {
                    let live = core.collector.grid();
                    let grid = live.read();
                    grid.year_partition(year)
                }
            };
            let config = SimulationConfig {
                year,
                symbols: core.collector.symbols().to_vec(),
                range,
                strategy: strategy.clone(),
            };

            let result: Result<(), SimulatorError> = async {
                let output =
                    run_simulation(config, grid, core.kernel.clone(), task_progress).await?;
                save_outputs(
                    &core.paths,
                    &strategy.code_name,
                    &strategy.version,
                    year,
                    &output,
                )?;
                Ok(())
            }
            .await;

            if let Err(e) = result {
                error!(error = %e, "simulation failed");
            }
        });
        progress
    }
}

//! The replay engine.
//!
//! A simulation walks one year of candle rows moment by moment. Pending
//! placements are checked against each candle's price envelope, fills
//! mutate the virtual state, the account mirror is re-derived, a
//! conservative unrealized extreme is recorded, and the decision script
//! runs against the fresh state.
//!
//! Chunking: when a strategy declares `parallel_simulation_chunk_days`,
//! the calculation range splits at epoch-origin chunk boundaries.
//! Indicator packs for all chunks are computed in parallel on the blocking
//! pool; the per-moment replay then chains chunk by chunk, each chunk
//! seeded with the previous chunk's ending state (the blank state for the
//! first). The overlay's cumulative product relies on this continuity.

use crate::error::{SimulationError, SimulatorError};
use crate::fill::{apply_trade, fill_price};
use crate::progress::SimulationProgress;
use model::{
    AccountState, AssetEntry, AssetRecord, Candle, CandleGrid, CandleWindow, FillRole,
    FillSide, Moment, OpenOrder, OrderType, Position, PositionDirection, RecordCause,
    Scribbles, UnrealizedChanges, VirtualPlacement, VirtualState,
};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use strategist::{DecisionInputs, IndicatorPack, Strategy, StrategyKernel};
use tracing::info;

/// Left margin of candle history prepended before indicator computation.
const INDICATOR_MARGIN_ROWS: i64 = 7 * 8640;

/// Millisecond offset of a market fill inside its moment.
const NOW_FILL_OFFSET_MS: i64 = 3_000;

/// Millisecond offset of a boundary fill inside its moment.
const BOUNDARY_FILL_OFFSET_MS: i64 = 5_000;

/// Cap on the adversarial intra-candle wobble used for unrealized extremes.
const UNREALIZED_WOBBLE: f64 = 0.05;

/// What to simulate.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub year: i32,
    pub strategy: Strategy,
    pub symbols: Vec<String>,
    /// Restrict the calculation range (preview mode); `None` runs the year.
    pub range: Option<(Moment, Moment)>,
}

/// The five raw outputs of a run.
#[derive(Debug, Clone)]
pub struct SimulationOutput {
    pub asset_record: AssetRecord,
    pub unrealized_changes: UnrealizedChanges,
    pub scribbles: Scribbles,
    pub account_state: AccountState,
    pub virtual_state: VirtualState,
}

/// Run a simulation to completion.
pub async fn run_simulation(
    config: SimulationConfig,
    grid: CandleGrid,
    kernel: Arc<StrategyKernel>,
    progress: Arc<SimulationProgress>,
) -> Result<SimulationOutput, SimulatorError> {
    let (calc_start, calc_end) = calculation_bounds(&config, &grid);
    let spans = chunk_spans(
        calc_start,
        calc_end,
        config.strategy.parallel_simulation_chunk_days,
    );

    progress.configure(
        spans
            .iter()
            .map(|(start, end)| ((end.as_ms() - start.as_ms()) / 3_600_000).max(1) as u32)
            .collect(),
    );

    // Indicator packs for every chunk, in parallel on the blocking pool.
    let mut indicator_tasks = Vec::new();
    for &(span_start, span_end) in &spans {
        let window = grid.window(span_start.offset_rows(-INDICATOR_MARGIN_ROWS), span_end);
        let kernel = kernel.clone();
        let strategy = config.strategy.clone();
        let symbols = config.symbols.clone();
        indicator_tasks.push(tokio::task::spawn_blocking(move || {
            let pack = kernel.make_indicators(&strategy, &symbols, &window)?;
            Ok::<_, strategist::ScriptError>((window, pack))
        }));
    }

    let mut prepared = Vec::with_capacity(spans.len());
    for (task, &(span_start, _)) in indicator_tasks.into_iter().zip(&spans) {
        let (window, pack) = task
            .await
            .map_err(|e| SimulatorError::Worker(e.to_string()))??;
        let first_calc_row = window
            .index()
            .partition_point(|&moment| moment < span_start);
        prepared.push(ChunkData {
            window,
            indicators: pack,
            first_calc_row,
        });
    }

    // Replay chunk by chunk, chaining state.
    let mut asset_record = AssetRecord::new();
    let mut unrealized_changes = UnrealizedChanges::new();
    let mut scribbles = Scribbles::new();
    let mut account_state = blank_account();
    let mut virtual_state = VirtualState::blank();

    for (chunk_index, chunk) in prepared.into_iter().enumerate() {
        let kernel = kernel.clone();
        let strategy = config.strategy.clone();
        let symbols = config.symbols.clone();
        let progress = progress.clone();
        let seed = ChunkSeed {
            account_state,
            virtual_state,
            scribbles,
        };

        let outcome = tokio::task::spawn_blocking(move || {
            simulate_chunk(
                &strategy,
                &symbols,
                &kernel,
                chunk,
                seed,
                &progress,
                chunk_index,
            )
        })
        .await
        .map_err(|e| SimulatorError::Worker(e.to_string()))??;

        asset_record.extend_from(&outcome.asset_record);
        unrealized_changes.extend_from(&outcome.unrealized_changes);
        account_state = outcome.account_state;
        virtual_state = outcome.virtual_state;
        scribbles = outcome.scribbles;
    }

    info!(
        year = config.year,
        fills = asset_record.len(),
        final_balance = virtual_state.wallet_balance(),
        "simulation finished"
    );

    Ok(SimulationOutput {
        asset_record,
        unrealized_changes,
        scribbles,
        account_state,
        virtual_state,
    })
}

fn blank_account() -> AccountState {
    AccountState {
        wallet_balance: 1.0,
        ..AccountState::new()
    }
}

/// Intersect the target year, the optional visible range, and the grid.
fn calculation_bounds(config: &SimulationConfig, grid: &CandleGrid) -> (Moment, Moment) {
    let year_start = Moment::floor(
        chrono::NaiveDate::from_ymd_opt(config.year, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
            .unwrap_or_default(),
    );
    let year_end = Moment::floor(
        chrono::NaiveDate::from_ymd_opt(config.year + 1, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
            .unwrap_or_default(),
    );

    let mut start = year_start;
    let mut end = year_end;
    if let Some((range_start, range_end)) = config.range {
        start = start.max(range_start);
        end = end.min(range_end);
    }
    if let (Some(first), Some(last)) = (grid.first_moment(), grid.last_moment()) {
        start = start.max(first);
        end = end.min(last.next());
    }
    if end < start {
        end = start;
    }
    (start, end)
}

/// Epoch-origin chunk boundaries over `[start, end)`.
fn chunk_spans(start: Moment, end: Moment, chunk_days: Option<u32>) -> Vec<(Moment, Moment)> {
    let Some(days) = chunk_days.filter(|&d| d > 0) else {
        return vec![(start, end)];
    };
    let chunk_ms = days as i64 * 86_400_000;
    let mut spans = Vec::new();
    let mut key = start.as_ms().div_euclid(chunk_ms);
    while key * chunk_ms < end.as_ms() {
        let span_start = Moment::floor_ms((key * chunk_ms).max(start.as_ms()));
        let span_end = Moment::floor_ms(((key + 1) * chunk_ms).min(end.as_ms()));
        if span_start < span_end {
            spans.push((span_start, span_end));
        }
        key += 1;
    }
    spans
}

struct ChunkData {
    window: CandleWindow,
    indicators: IndicatorPack,
    first_calc_row: usize,
}

struct ChunkSeed {
    account_state: AccountState,
    virtual_state: VirtualState,
    scribbles: Scribbles,
}

struct ChunkOutcome {
    asset_record: AssetRecord,
    unrealized_changes: UnrealizedChanges,
    scribbles: Scribbles,
    account_state: AccountState,
    virtual_state: VirtualState,
}

fn random_order_id() -> u64 {
    // 19 decimal digits, like exchange-assigned ids.
    rand::thread_rng().gen_range(1_000_000_000_000_000_000u64..10_000_000_000_000_000_000u64)
}

fn simulate_chunk(
    strategy: &Strategy,
    symbols: &[String],
    kernel: &StrategyKernel,
    chunk: ChunkData,
    seed: ChunkSeed,
    progress: &SimulationProgress,
    chunk_index: usize,
) -> Result<ChunkOutcome, SimulatorError> {
    let ChunkSeed {
        mut account_state,
        mut virtual_state,
        mut scribbles,
    } = seed;

    let mut asset_record = AssetRecord::new();
    let mut unrealized_changes = UnrealizedChanges::new();

    for row in chunk.first_calc_row..chunk.window.len() {
        let moment = chunk.window.index()[row];

        let mut candles: HashMap<String, Candle> = HashMap::new();
        for symbol in symbols {
            if let Some(series) = chunk.window.series(symbol) {
                candles.insert(symbol.clone(), series[row]);
            }
        }

        // 1–3: resolve fills against each candle's price envelope.
        for symbol in symbols {
            let Some(&candle) = candles.get(symbol) else {
                continue;
            };
            if candle.is_empty() {
                continue;
            }

            let Some(placements) = virtual_state.placements.get(symbol).cloned() else {
                continue;
            };

            if placements.contains_key(&OrderType::CancelAll) {
                virtual_state.cancel_all(symbol);
                continue;
            }

            for (&order_type, placement) in &placements {
                let Some(price) = fill_price(order_type, placement.boundary, &candle) else {
                    continue;
                };

                if !placement.margin.is_finite() || placement.margin < 0.0 {
                    return Err(SimulationError::new(format!(
                        "bad margin {} in a decision on {symbol}",
                        placement.margin
                    ))
                    .into());
                }

                let amount_shift = if order_type.is_close() {
                    let held = virtual_state.location(symbol).amount;
                    if held == 0.0 {
                        remove_placement(&mut virtual_state, symbol, order_type);
                        continue;
                    }
                    -held
                } else {
                    let magnitude = placement.margin / price;
                    match order_type {
                        OrderType::NowBuy
                        | OrderType::BookBuy
                        | OrderType::LaterUpBuy
                        | OrderType::LaterDownBuy => magnitude,
                        _ => -magnitude,
                    }
                };

                let outcome =
                    apply_trade(&mut virtual_state, symbol, amount_shift, price)
                        .map_err(SimulatorError::from)?;

                let wallet = virtual_state.wallet_balance();
                let offset = if order_type.is_now() {
                    NOW_FILL_OFFSET_MS
                } else {
                    BOUNDARY_FILL_OFFSET_MS
                };
                asset_record.append(AssetEntry {
                    ts_ms: moment.as_ms() + offset,
                    cause: RecordCause::AutoTrade,
                    symbol: symbol.clone(),
                    side: Some(if outcome.amount_shift > 0.0 {
                        FillSide::Buy
                    } else {
                        FillSide::Sell
                    }),
                    fill_price: price,
                    role: Some(if order_type.is_book() {
                        FillRole::Maker
                    } else {
                        FillRole::Taker
                    }),
                    margin_ratio: if wallet > 0.0 {
                        outcome.amount_shift.abs() * candle.open as f64 / wallet
                    } else {
                        0.0
                    },
                    order_id: placement.order_id,
                    result_asset: wallet,
                });

                remove_placement(&mut virtual_state, symbol, order_type);
            }
        }

        // 4: re-derive the account-state mirror from the virtual state.
        derive_account_state(&mut account_state, &virtual_state, moment);

        // 5: conservative unrealized extreme within the candle.
        let wallet = virtual_state.wallet_balance();
        if wallet > 0.0 {
            let mut unrealized = 0.0;
            for (symbol, location) in &virtual_state.locations {
                let Some(&candle) = candles.get(symbol) else {
                    continue;
                };
                if candle.is_empty() {
                    continue;
                }
                let open = candle.open as f64;
                let adverse = if location.amount > 0.0 {
                    (candle.low as f64).max(open * (1.0 - UNREALIZED_WOBBLE))
                } else {
                    (candle.high as f64).min(open * (1.0 + UNREALIZED_WOBBLE))
                };
                unrealized += (adverse - location.entry_price) * location.amount;
            }
            unrealized_changes.record(moment, (unrealized / wallet) as f32);
        }

        // 6: run the decision script and merge fresh placements.
        let decisions = kernel.decide(
            strategy,
            DecisionInputs {
                symbols,
                current_moment: moment,
                candles: &candles,
                indicators: &chunk.indicators,
                indicator_row: row,
                account: account_state.clone(),
                scribbles: &mut scribbles,
            },
        )?;
        for (symbol, orders) in decisions {
            let slot = virtual_state.placements.entry(symbol).or_default();
            for (order_type, decision) in orders {
                slot.insert(
                    order_type,
                    VirtualPlacement {
                        order_id: random_order_id(),
                        margin: decision.margin,
                        boundary: decision.boundary,
                    },
                );
            }
        }

        if moment.as_ms() % 3_600_000 == 0 {
            progress.bump(chunk_index);
        }
    }

    Ok(ChunkOutcome {
        asset_record,
        unrealized_changes,
        scribbles,
        account_state,
        virtual_state,
    })
}

fn remove_placement(state: &mut VirtualState, symbol: &str, order_type: OrderType) {
    if let Some(slot) = state.placements.get_mut(symbol) {
        slot.remove(&order_type);
        if slot.is_empty() {
            state.placements.remove(symbol);
        }
    }
}

/// Rebuild the account mirror fields from the virtual state.
fn derive_account_state(account: &mut AccountState, state: &VirtualState, moment: Moment) {
    account.wallet_balance = state.wallet_balance();
    account.observed_until = moment;

    account.positions.clear();
    for (symbol, location) in &state.locations {
        account.positions.insert(
            symbol.clone(),
            Position {
                margin: location.amount.abs() * location.entry_price,
                direction: PositionDirection::from_amount(location.amount),
                entry_price: location.entry_price,
                update_time_ms: moment.as_ms(),
            },
        );
    }

    account.open_orders.clear();
    for (symbol, placements) in &state.placements {
        let orders: HashMap<u64, OpenOrder> = placements
            .iter()
            .map(|(&order_type, placement)| {
                (
                    placement.order_id,
                    OpenOrder {
                        order_type: Some(order_type),
                        boundary: placement.boundary.unwrap_or(0.0),
                        left_margin: Some(placement.margin),
                    },
                )
            })
            .collect();
        if !orders.is_empty() {
            account.open_orders.insert(symbol.clone(), orders);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(n: i64) -> Moment {
        Moment::try_from_ms(1_704_067_200_000 + n * 10_000).unwrap() // 2024-01-01
    }

    fn strategy(decision: &str, chunk_days: Option<u32>) -> Strategy {
        Strategy {
            code_name: "ABCDEF".into(),
            readable_name: "Test".into(),
            version: "1.0".into(),
            description: String::new(),
            risk_level: 0,
            parallel_simulation_chunk_days: chunk_days,
            indicators_script: String::new(),
            decision_script: decision.into(),
        }
    }

    fn grid_with_closes(closes: &[f32]) -> CandleGrid {
        let mut grid = CandleGrid::new();
        for (i, &close) in closes.iter().enumerate() {
            grid.set(m(i as i64), "BTCUSDT", Candle::flat(close));
        }
        grid
    }

    #[test]
    fn test_chunk_spans_epoch_origin() {
        let start = Moment::try_from_ms(86_400_000).unwrap(); // day 1
        let end = Moment::try_from_ms(5 * 86_400_000).unwrap(); // day 5
        let spans = chunk_spans(start, end, Some(2));

        // Epoch-origin grouping: [day1, day2), [day2, day4), [day4, day5).
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0], (start, Moment::try_from_ms(2 * 86_400_000).unwrap()));
        assert_eq!(
            spans[1],
            (
                Moment::try_from_ms(2 * 86_400_000).unwrap(),
                Moment::try_from_ms(4 * 86_400_000).unwrap()
            )
        );
        assert_eq!(spans[2].1, end);
    }

    #[test]
    fn test_chunk_spans_unchunked() {
        let start = Moment::EPOCH;
        let end = Moment::try_from_ms(86_400_000).unwrap();
        assert_eq!(chunk_spans(start, end, None), vec![(start, end)]);
    }

    #[tokio::test]
    async fn test_buy_and_hold_simulation() {
        // Buy once with 10% of the wallet, then hold.
        let decision = r#"
            armed = scribble("BTCUSDT", "armed", false)
            if !armed {
                place("BTCUSDT", "NOW_BUY", wallet() * 0.1)
                set_scribble("BTCUSDT", "armed", true)
            }
        "#;
        let grid = grid_with_closes(&[100.0, 100.0, 110.0, 120.0]);
        let config = SimulationConfig {
            year: 2024,
            strategy: strategy(decision, None),
            symbols: vec!["BTCUSDT".into()],
            range: None,
        };

        let output = run_simulation(
            config,
            grid,
            Arc::new(StrategyKernel::new()),
            Arc::new(SimulationProgress::new()),
        )
        .await
        .unwrap();

        // The placement from moment 0 fills during moment 1.
        assert_eq!(output.asset_record.len(), 1);
        let fill = &output.asset_record.entries()[0];
        assert_eq!(fill.cause, RecordCause::AutoTrade);
        assert_eq!(fill.side, Some(FillSide::Buy));
        assert!(fill.order_id >= 1_000_000_000_000_000_000);

        // Flat candles at 100: amount = 0.1 / 100 = 0.001.
        let location = output.virtual_state.location("BTCUSDT");
        assert!((location.amount - 0.001).abs() < 1e-12);
        assert_eq!(location.entry_price, 100.0);

        // Mirror rebuilt from the virtual state.
        let position = output.account_state.position("BTCUSDT");
        assert_eq!(position.direction, PositionDirection::Long);
        assert!((output.account_state.wallet_balance - 1.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_scribbles_survive_chunk_boundaries() {
        let decision = r#"
            runs = scribble("BTCUSDT", "runs", 0)
            set_scribble("BTCUSDT", "runs", runs + 1)
        "#;
        // Two days of sparse data so chunking at one day makes two chunks.
        let mut grid = CandleGrid::new();
        grid.set(m(0), "BTCUSDT", Candle::flat(100.0));
        grid.set(m(8640), "BTCUSDT", Candle::flat(101.0));

        let config = SimulationConfig {
            year: 2024,
            strategy: strategy(decision, Some(1)),
            symbols: vec!["BTCUSDT".into()],
            range: None,
        };

        let output = run_simulation(
            config,
            grid,
            Arc::new(StrategyKernel::new()),
            Arc::new(SimulationProgress::new()),
        )
        .await
        .unwrap();

        let runs = output.scribbles["BTCUSDT"]["runs"].as_number().unwrap();
        assert_eq!(runs, 2.0);
    }

    #[tokio::test]
    async fn test_negative_margin_fails_simulation() {
        let decision = r#"
            place("BTCUSDT", "NOW_BUY", 0 - 5)
        "#;
        let grid = grid_with_closes(&[100.0, 100.0]);
        let config = SimulationConfig {
            year: 2024,
            strategy: strategy(decision, None),
            symbols: vec!["BTCUSDT".into()],
            range: None,
        };

        let result = run_simulation(
            config,
            grid,
            Arc::new(StrategyKernel::new()),
            Arc::new(SimulationProgress::new()),
        )
        .await;

        assert!(matches!(result, Err(SimulatorError::Simulation(_))));
    }
}

//! The shared evaluation contract used identically by the live transactor
//! and the simulator.
//!
//! `make_indicators` runs the indicators script over a candle window and
//! returns the emitted series. `decide` runs the decision script against
//! the latest rows, a deep copy of account state, and the live scribbles
//! map, and returns the decision set. Neither run can mutate the candle
//! data or the live account state.

use crate::error::ScriptError;
use crate::indicators::{IndicatorCategory, IndicatorPack};
use crate::script::{compile, evaluate, HostFunctions, Program, Value};
use crate::strategy::Strategy;
use model::{
    strip_empty_decisions, AccountState, Candle, CandleField, CandleWindow, Decision,
    DecisionSet, Moment, OrderType, ScribbleValue, Scribbles,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

struct CompiledStrategy {
    indicators: Program,
    decision: Program,
}

/// Compiles each strategy once per `(code_name, version)` and evaluates the
/// cached programs thereafter.
#[derive(Default)]
pub struct StrategyKernel {
    cache: RwLock<HashMap<(String, String), Arc<CompiledStrategy>>>,
}

impl StrategyKernel {
    pub fn new() -> Self {
        Self::default()
    }

    fn compiled(&self, strategy: &Strategy) -> Result<Arc<CompiledStrategy>, ScriptError> {
        let key = (strategy.code_name.clone(), strategy.version.clone());
        if let Some(found) = self.cache.read().get(&key) {
            return Ok(found.clone());
        }

        let compiled = Arc::new(CompiledStrategy {
            indicators: compile(&strategy.indicators_script, "indicators")?,
            decision: compile(&strategy.decision_script, "decision")?,
        });
        self.cache.write().insert(key, compiled.clone());
        Ok(compiled)
    }

    /// Run the indicators script over the window.
    pub fn make_indicators(
        &self,
        strategy: &Strategy,
        symbols: &[String],
        window: &CandleWindow,
    ) -> Result<IndicatorPack, ScriptError> {
        let compiled = self.compiled(strategy)?;
        let mut host = IndicatorsHost {
            symbols,
            window,
            pack: IndicatorPack::new(window.index().to_vec()),
        };
        evaluate(&compiled.indicators, &mut host)?;
        Ok(host.pack)
    }

    /// Run the decision script; scribbles are mutated in place.
    pub fn decide(
        &self,
        strategy: &Strategy,
        inputs: DecisionInputs<'_>,
    ) -> Result<DecisionSet, ScriptError> {
        let compiled = self.compiled(strategy)?;
        let mut host = DecisionHost {
            inputs,
            decisions: DecisionSet::new(),
        };
        evaluate(&compiled.decision, &mut host)?;
        let mut decisions = host.decisions;
        strip_empty_decisions(&mut decisions);
        Ok(decisions)
    }
}

/// Inputs to one decision evaluation.
pub struct DecisionInputs<'a> {
    pub symbols: &'a [String],
    pub current_moment: Moment,
    /// Latest candle row per symbol.
    pub candles: &'a HashMap<String, Candle>,
    /// Indicator pack covering the evaluation range.
    pub indicators: &'a IndicatorPack,
    /// Row of `indicators` that is "now". The live loop passes the final
    /// row; the simulator walks this through the chunk.
    pub indicator_row: usize,
    /// Deep copy of the live mirror; mutations are discarded.
    pub account: AccountState,
    /// Strategy-private state, mutated in place.
    pub scribbles: &'a mut Scribbles,
}

// ---------------------------------------------------------------------------
// Indicators host
// ---------------------------------------------------------------------------

struct IndicatorsHost<'a> {
    symbols: &'a [String],
    window: &'a CandleWindow,
    pack: IndicatorPack,
}

impl IndicatorsHost<'_> {
    fn field_series(
        &self,
        symbol: &str,
        field: CandleField,
        line: u32,
    ) -> Result<Value, ScriptError> {
        if !self.symbols.iter().any(|s| s == symbol) {
            return Err(ScriptError::new(
                "indicators",
                line,
                format!("'{symbol}' is not a target symbol"),
            ));
        }
        match self.window.field_series(symbol, field) {
            Some(series) => Ok(Value::Series(series)),
            None => Ok(Value::Series(vec![f32::NAN; self.window.len()])),
        }
    }
}

impl HostFunctions for IndicatorsHost<'_> {
    fn call(
        &mut self,
        name: &str,
        args: &[Value],
        line: u32,
    ) -> Result<Option<Value>, ScriptError> {
        let field = match name {
            "open_" => Some(CandleField::Open),
            "high" => Some(CandleField::High),
            "low" => Some(CandleField::Low),
            "close" => Some(CandleField::Close),
            "volume" => Some(CandleField::Volume),
            _ => None,
        };
        if let Some(field) = field {
            let [Value::Str(symbol)] = args else {
                return Err(ScriptError::new(
                    "indicators",
                    line,
                    format!("{name} expects a symbol string"),
                ));
            };
            return self.field_series(symbol, field, line).map(Some);
        }

        match name {
            "emit" => {
                let (symbol, category, label, series) = match args {
                    [Value::Str(symbol), Value::Str(category), Value::Str(label), Value::Series(series)] => {
                        (symbol, category, label, series)
                    }
                    _ => {
                        return Err(ScriptError::new(
                            "indicators",
                            line,
                            "emit expects (symbol, category, label, series)",
                        ))
                    }
                };
                let category = IndicatorCategory::parse(category).ok_or_else(|| {
                    ScriptError::new(
                        "indicators",
                        line,
                        format!("unknown category '{category}'"),
                    )
                })?;
                self.pack.insert(symbol, category, label, series.clone());
                Ok(Some(Value::Unit))
            }
            _ => Ok(None),
        }
    }

    fn phase(&self) -> &'static str {
        "indicators"
    }
}

// ---------------------------------------------------------------------------
// Decision host
// ---------------------------------------------------------------------------

struct DecisionHost<'a> {
    inputs: DecisionInputs<'a>,
    decisions: DecisionSet,
}

impl DecisionHost<'_> {
    fn check_symbol(&self, symbol: &str, line: u32) -> Result<(), ScriptError> {
        if self.inputs.symbols.iter().any(|s| s == symbol) {
            Ok(())
        } else {
            Err(ScriptError::new(
                "decision",
                line,
                format!("'{symbol}' is not a target symbol"),
            ))
        }
    }

    fn place(
        &mut self,
        symbol: &str,
        order_name: &str,
        margin: f64,
        boundary: Option<f64>,
        line: u32,
    ) -> Result<(), ScriptError> {
        self.check_symbol(symbol, line)?;
        let order_type = OrderType::parse(order_name).ok_or_else(|| {
            ScriptError::new(
                "decision",
                line,
                format!("unknown order type '{order_name}'"),
            )
        })?;
        self.decisions
            .entry(symbol.to_string())
            .or_default()
            .insert(order_type, Decision { margin, boundary });
        Ok(())
    }
}

impl HostFunctions for DecisionHost<'_> {
    fn call(
        &mut self,
        name: &str,
        args: &[Value],
        line: u32,
    ) -> Result<Option<Value>, ScriptError> {
        match name {
            "moment" => Ok(Some(Value::Num(self.inputs.current_moment.as_ms() as f64))),
            "wallet" => Ok(Some(Value::Num(self.inputs.account.wallet_balance))),
            "candle" => {
                let [Value::Str(symbol), Value::Str(field)] = args else {
                    return Err(ScriptError::new(
                        "decision",
                        line,
                        "candle expects (symbol, field)",
                    ));
                };
                self.check_symbol(symbol, line)?;
                let field = CandleField::parse(field).ok_or_else(|| {
                    ScriptError::new("decision", line, format!("unknown field '{field}'"))
                })?;
                let value = self
                    .inputs
                    .candles
                    .get(symbol.as_str())
                    .map(|c| c.field(field) as f64)
                    .unwrap_or(f64::NAN);
                Ok(Some(Value::Num(value)))
            }
            "indicator" => {
                let [Value::Str(symbol), Value::Str(category), Value::Str(label)] = args else {
                    return Err(ScriptError::new(
                        "decision",
                        line,
                        "indicator expects (symbol, category, label)",
                    ));
                };
                let category = IndicatorCategory::parse(category).ok_or_else(|| {
                    ScriptError::new(
                        "decision",
                        line,
                        format!("unknown category '{category}'"),
                    )
                })?;
                let value = self
                    .inputs
                    .indicators
                    .value_at(self.inputs.indicator_row, symbol, category, label)
                    .map(f64::from)
                    .unwrap_or(f64::NAN);
                Ok(Some(Value::Num(value)))
            }
            "position_margin" | "position_direction" | "entry_price" => {
                let [Value::Str(symbol)] = args else {
                    return Err(ScriptError::new(
                        "decision",
                        line,
                        format!("{name} expects a symbol string"),
                    ));
                };
                self.check_symbol(symbol, line)?;
                let position = self.inputs.account.position(symbol);
                let value = match name {
                    "position_margin" => position.margin,
                    "position_direction" => position.direction.signum(),
                    _ => position.entry_price,
                };
                Ok(Some(Value::Num(value)))
            }
            "open_order_count" => {
                let [Value::Str(symbol)] = args else {
                    return Err(ScriptError::new(
                        "decision",
                        line,
                        "open_order_count expects a symbol string",
                    ));
                };
                self.check_symbol(symbol, line)?;
                Ok(Some(Value::Num(
                    self.inputs.account.open_order_count(symbol) as f64,
                )))
            }
            "scribble" => {
                let (symbol, key, default) = match args {
                    [Value::Str(symbol), Value::Str(key), default] => (symbol, key, default),
                    _ => {
                        return Err(ScriptError::new(
                            "decision",
                            line,
                            "scribble expects (symbol, key, default)",
                        ))
                    }
                };
                let stored = self
                    .inputs
                    .scribbles
                    .get(symbol.as_str())
                    .and_then(|m| m.get(key.as_str()));
                let value = match stored {
                    Some(ScribbleValue::Number(n)) => Value::Num(*n),
                    Some(ScribbleValue::Flag(b)) => Value::Bool(*b),
                    Some(ScribbleValue::Text(s)) => Value::Str(s.clone()),
                    None => default.clone(),
                };
                Ok(Some(value))
            }
            "set_scribble" => {
                let (symbol, key, value) = match args {
                    [Value::Str(symbol), Value::Str(key), value] => (symbol, key, value),
                    _ => {
                        return Err(ScriptError::new(
                            "decision",
                            line,
                            "set_scribble expects (symbol, key, value)",
                        ))
                    }
                };
                let stored = match value {
                    Value::Num(n) => ScribbleValue::Number(*n),
                    Value::Bool(b) => ScribbleValue::Flag(*b),
                    Value::Str(s) => ScribbleValue::Text(s.clone()),
                    other => {
                        return Err(ScriptError::new(
                            "decision",
                            line,
                            format!("cannot scribble a {}", other.type_name()),
                        ))
                    }
                };
                self.inputs
                    .scribbles
                    .entry(symbol.clone())
                    .or_default()
                    .insert(key.clone(), stored);
                Ok(Some(Value::Unit))
            }
            "place" => {
                let [Value::Str(symbol), Value::Str(order_name), Value::Num(margin)] = args
                else {
                    return Err(ScriptError::new(
                        "decision",
                        line,
                        "place expects (symbol, order_type, margin)",
                    ));
                };
                self.place(symbol, order_name, *margin, None, line)?;
                Ok(Some(Value::Unit))
            }
            "place_with_boundary" => {
                let [Value::Str(symbol), Value::Str(order_name), Value::Num(margin), Value::Num(boundary)] =
                    args
                else {
                    return Err(ScriptError::new(
                        "decision",
                        line,
                        "place_with_boundary expects (symbol, order_type, margin, boundary)",
                    ));
                };
                self.place(symbol, order_name, *margin, Some(*boundary), line)?;
                Ok(Some(Value::Unit))
            }
            _ => Ok(None),
        }
    }

    fn phase(&self) -> &'static str {
        "decision"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::CandleGrid;

    fn window_of(closes: &[f32]) -> CandleWindow {
        let mut grid = CandleGrid::new();
        for (i, &close) in closes.iter().enumerate() {
            grid.set(
                Moment::try_from_ms(i as i64 * 10_000).unwrap(),
                "BTCUSDT",
                Candle::flat(close),
            );
        }
        grid.window(
            Moment::try_from_ms(0).unwrap(),
            Moment::try_from_ms(closes.len() as i64 * 10_000).unwrap(),
        )
    }

    fn strategy(indicators: &str, decision: &str) -> Strategy {
        Strategy {
            code_name: "ABCDEF".into(),
            readable_name: "Test".into(),
            version: "1.0".into(),
            description: String::new(),
            risk_level: 0,
            parallel_simulation_chunk_days: None,
            indicators_script: indicators.into(),
            decision_script: decision.into(),
        }
    }

    #[test]
    fn test_make_indicators_emits_series() {
        let kernel = StrategyKernel::new();
        let symbols = vec!["BTCUSDT".to_string()];
        let window = window_of(&[1.0, 2.0, 3.0, 4.0]);
        let strategy = strategy(
            "ma = sma(close(\"BTCUSDT\"), 2)\nemit(\"BTCUSDT\", \"price\", \"MA (#ff8888)\", ma)",
            "",
        );

        let pack = kernel
            .make_indicators(&strategy, &symbols, &window)
            .unwrap();
        assert_eq!(
            pack.last_value("BTCUSDT", IndicatorCategory::Price, "MA (#ff8888)"),
            Some(3.5)
        );
    }

    #[test]
    fn test_decide_places_and_scribbles() {
        let kernel = StrategyKernel::new();
        let symbols = vec!["BTCUSDT".to_string()];
        let mut candles = HashMap::new();
        candles.insert("BTCUSDT".to_string(), Candle::flat(100.0));
        let indicators = IndicatorPack::new(vec![Moment::EPOCH]);
        let mut scribbles = Scribbles::new();

        let strategy = strategy(
            "",
            r#"
            count = scribble("BTCUSDT", "runs", 0)
            set_scribble("BTCUSDT", "runs", count + 1)
            if candle("BTCUSDT", "CLOSE") > 50 {
                place("BTCUSDT", "NOW_BUY", wallet() * 0.1)
            }
            "#,
        );

        let account = AccountState {
            wallet_balance: 1000.0,
            ..AccountState::new()
        };

        let decisions = kernel
            .decide(
                &strategy,
                DecisionInputs {
                    symbols: &symbols,
                    current_moment: Moment::EPOCH,
                    candles: &candles,
                    indicators: &indicators,
                    indicator_row: indicators.len().saturating_sub(1),
                    account,
                    scribbles: &mut scribbles,
                },
            )
            .unwrap();

        let decision = decisions["BTCUSDT"][&OrderType::NowBuy];
        assert_eq!(decision.margin, 100.0);
        assert_eq!(decision.boundary, None);
        assert_eq!(
            scribbles["BTCUSDT"]["runs"],
            ScribbleValue::Number(1.0)
        );
    }

    #[test]
    fn test_empty_symbol_entries_are_stripped() {
        let kernel = StrategyKernel::new();
        let symbols = vec!["BTCUSDT".to_string()];
        let candles = HashMap::new();
        let indicators = IndicatorPack::new(vec![]);
        let mut scribbles = Scribbles::new();

        let strategy = strategy("", "x = 1");
        let decisions = kernel
            .decide(
                &strategy,
                DecisionInputs {
                    symbols: &symbols,
                    current_moment: Moment::EPOCH,
                    candles: &candles,
                    indicators: &indicators,
                    indicator_row: indicators.len().saturating_sub(1),
                    account: AccountState::new(),
                    scribbles: &mut scribbles,
                },
            )
            .unwrap();
        assert!(decisions.is_empty());
    }

    #[test]
    fn test_bad_order_type_is_script_error() {
        let kernel = StrategyKernel::new();
        let symbols = vec!["BTCUSDT".to_string()];
        let candles = HashMap::new();
        let indicators = IndicatorPack::new(vec![]);
        let mut scribbles = Scribbles::new();

        let strategy = strategy("", r#"place("BTCUSDT", "SIDEWAYS", 1)"#);
        let err = kernel
            .decide(
                &strategy,
                DecisionInputs {
                    symbols: &symbols,
                    current_moment: Moment::EPOCH,
                    candles: &candles,
                    indicators: &indicators,
                    indicator_row: indicators.len().saturating_sub(1),
                    account: AccountState::new(),
                    scribbles: &mut scribbles,
                },
            )
            .unwrap_err();
        assert!(err.message.contains("SIDEWAYS"));
    }

    #[test]
    fn test_compile_cache_reused() {
        let kernel = StrategyKernel::new();
        let strategy = strategy("x = 1", "y = 2");
        kernel.compiled(&strategy).unwrap();
        assert_eq!(kernel.cache.read().len(), 1);
        kernel.compiled(&strategy).unwrap();
        assert_eq!(kernel.cache.read().len(), 1);
    }
}

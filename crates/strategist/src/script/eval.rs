//! Tree-walk evaluator.
//!
//! Pure numeric and series builtins live here; domain functions (candle
//! access, indicator emission, decision placement) are provided by the
//! host context. The evaluator has no access to files, the network, or
//! anything outside the host surface.

use crate::error::ScriptError;
use crate::script::parser::{BinOp, Block, Expr, Program, Stmt};
use crate::script::value::Value;
use std::collections::HashMap;

/// Domain functions the embedding context provides.
pub trait HostFunctions {
    /// Invoke a host function; return `None` if the name is unknown.
    fn call(
        &mut self,
        name: &str,
        args: &[Value],
        line: u32,
    ) -> Result<Option<Value>, ScriptError>;

    /// Phase label used in error messages.
    fn phase(&self) -> &'static str;
}

/// Run a compiled program against a host context.
pub fn evaluate(program: &Program, host: &mut dyn HostFunctions) -> Result<(), ScriptError> {
    let mut env: HashMap<String, Value> = HashMap::new();
    run_block(&program.statements, &mut env, host)
}

fn run_block(
    block: &Block,
    env: &mut HashMap<String, Value>,
    host: &mut dyn HostFunctions,
) -> Result<(), ScriptError> {
    for stmt in block {
        match stmt {
            Stmt::Assign { name, value, .. } => {
                let value = eval_expr(value, env, host)?;
                env.insert(name.clone(), value);
            }
            Stmt::If {
                condition,
                then_block,
                else_block,
                line,
            } => {
                let cond = eval_expr(condition, env, host)?;
                match cond {
                    Value::Bool(true) => run_block(then_block, env, host)?,
                    Value::Bool(false) => {
                        if let Some(else_block) = else_block {
                            run_block(else_block, env, host)?;
                        }
                    }
                    other => {
                        return Err(ScriptError::new(
                            host.phase(),
                            *line,
                            format!("if condition must be boolean, got {}", other.type_name()),
                        ))
                    }
                }
            }
            Stmt::Expr(expr, _) => {
                eval_expr(expr, env, host)?;
            }
        }
    }
    Ok(())
}

fn eval_expr(
    expr: &Expr,
    env: &mut HashMap<String, Value>,
    host: &mut dyn HostFunctions,
) -> Result<Value, ScriptError> {
    match expr {
        Expr::Number(n) => Ok(Value::Num(*n)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Var(name, line) => env.get(name).cloned().ok_or_else(|| {
            ScriptError::new(host.phase(), *line, format!("unknown variable '{name}'"))
        }),
        Expr::Unary {
            negate,
            not,
            operand,
            line,
        } => {
            let value = eval_expr(operand, env, host)?;
            if *negate {
                match value {
                    Value::Num(n) => Ok(Value::Num(-n)),
                    Value::Series(s) => Ok(Value::Series(s.iter().map(|v| -v).collect())),
                    other => Err(ScriptError::new(
                        host.phase(),
                        *line,
                        format!("cannot negate {}", other.type_name()),
                    )),
                }
            } else if *not {
                match value {
                    Value::Bool(b) => Ok(Value::Bool(!b)),
                    other => Err(ScriptError::new(
                        host.phase(),
                        *line,
                        format!("cannot apply 'not' to {}", other.type_name()),
                    )),
                }
            } else {
                Ok(value)
            }
        }
        Expr::Binary {
            op,
            left,
            right,
            line,
        } => {
            // Short-circuit logical operators.
            if matches!(op, BinOp::And | BinOp::Or) {
                let lhs = eval_expr(left, env, host)?;
                let Value::Bool(lhs) = lhs else {
                    return Err(ScriptError::new(
                        host.phase(),
                        *line,
                        format!("logical operand must be boolean, got {}", lhs.type_name()),
                    ));
                };
                if (*op == BinOp::And && !lhs) || (*op == BinOp::Or && lhs) {
                    return Ok(Value::Bool(lhs));
                }
                let rhs = eval_expr(right, env, host)?;
                let Value::Bool(rhs) = rhs else {
                    return Err(ScriptError::new(
                        host.phase(),
                        *line,
                        format!("logical operand must be boolean, got {}", rhs.type_name()),
                    ));
                };
                return Ok(Value::Bool(rhs));
            }

            let lhs = eval_expr(left, env, host)?;
            let rhs = eval_expr(right, env, host)?;
            apply_binary(*op, lhs, rhs, host.phase(), *line)
        }
        Expr::Call { name, args, line } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval_expr(arg, env, host)?);
            }
            if let Some(result) = builtin(name, &values, host.phase(), *line)? {
                return Ok(result);
            }
            match host.call(name, &values, *line)? {
                Some(result) => Ok(result),
                None => Err(ScriptError::new(
                    host.phase(),
                    *line,
                    format!("unknown function '{name}'"),
                )),
            }
        }
    }
}

fn apply_binary(
    op: BinOp,
    lhs: Value,
    rhs: Value,
    phase: &'static str,
    line: u32,
) -> Result<Value, ScriptError> {
    use BinOp::*;
    match op {
        Add | Sub | Mul | Div | Rem => arithmetic(op, lhs, rhs, phase, line),
        Eq | Ne => {
            let equal = match (&lhs, &rhs) {
                (Value::Num(a), Value::Num(b)) => a == b,
                (Value::Str(a), Value::Str(b)) => a == b,
                (Value::Bool(a), Value::Bool(b)) => a == b,
                _ => {
                    return Err(ScriptError::new(
                        phase,
                        line,
                        format!(
                            "cannot compare {} with {}",
                            lhs.type_name(),
                            rhs.type_name()
                        ),
                    ))
                }
            };
            Ok(Value::Bool(if op == Eq { equal } else { !equal }))
        }
        Lt | Le | Gt | Ge => {
            let (Value::Num(a), Value::Num(b)) = (&lhs, &rhs) else {
                return Err(ScriptError::new(
                    phase,
                    line,
                    format!(
                        "cannot order {} with {}",
                        lhs.type_name(),
                        rhs.type_name()
                    ),
                ));
            };
            let result = match op {
                Lt => a < b,
                Le => a <= b,
                Gt => a > b,
                Ge => a >= b,
                _ => unreachable!(),
            };
            Ok(Value::Bool(result))
        }
        And | Or => unreachable!("handled in eval_expr"),
    }
}

fn num_op(op: BinOp, a: f64, b: f64) -> f64 {
    match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Rem => a % b,
        _ => unreachable!(),
    }
}

fn arithmetic(
    op: BinOp,
    lhs: Value,
    rhs: Value,
    phase: &'static str,
    line: u32,
) -> Result<Value, ScriptError> {
    match (lhs, rhs) {
        (Value::Num(a), Value::Num(b)) => Ok(Value::Num(num_op(op, a, b))),
        (Value::Series(a), Value::Num(b)) => Ok(Value::Series(
            a.iter().map(|&x| num_op(op, x as f64, b) as f32).collect(),
        )),
        (Value::Num(a), Value::Series(b)) => Ok(Value::Series(
            b.iter().map(|&x| num_op(op, a, x as f64) as f32).collect(),
        )),
        (Value::Series(a), Value::Series(b)) => {
            if a.len() != b.len() {
                return Err(ScriptError::new(
                    phase,
                    line,
                    format!("series lengths differ: {} vs {}", a.len(), b.len()),
                ));
            }
            Ok(Value::Series(
                a.iter()
                    .zip(&b)
                    .map(|(&x, &y)| num_op(op, x as f64, y as f64) as f32)
                    .collect(),
            ))
        }
        (lhs, rhs) => Err(ScriptError::new(
            phase,
            line,
            format!(
                "cannot apply arithmetic to {} and {}",
                lhs.type_name(),
                rhs.type_name()
            ),
        )),
    }
}

/// Pure builtins shared by both script phases.
fn builtin(
    name: &str,
    args: &[Value],
    phase: &'static str,
    line: u32,
) -> Result<Option<Value>, ScriptError> {
    let bad_args = |expected: &str| {
        Err(ScriptError::new(
            phase,
            line,
            format!("{name} expects {expected}"),
        ))
    };

    let unary_num = |f: fn(f64) -> f64| match args {
        [Value::Num(n)] => Ok(Some(Value::Num(f(*n)))),
        _ => bad_args("one number"),
    };

    match name {
        "abs_" => match args {
            [Value::Num(n)] => Ok(Some(Value::Num(n.abs()))),
            [Value::Series(s)] => Ok(Some(Value::Series(s.iter().map(|v| v.abs()).collect()))),
            _ => bad_args("a number or series"),
        },
        "floor" => unary_num(f64::floor),
        "ceil" => unary_num(f64::ceil),
        "sqrt" => unary_num(f64::sqrt),
        "is_nan" => match args {
            [Value::Num(n)] => Ok(Some(Value::Bool(n.is_nan()))),
            _ => bad_args("one number"),
        },
        "nan" => match args {
            [] => Ok(Some(Value::Num(f64::NAN))),
            _ => bad_args("no arguments"),
        },
        "min_" | "max_" => match args {
            [Value::Num(a), Value::Num(b)] => Ok(Some(Value::Num(if name == "min_" {
                a.min(*b)
            } else {
                a.max(*b)
            }))),
            _ => bad_args("two numbers"),
        },
        // Durations in epoch milliseconds, composable with moment().
        "seconds" | "minutes" | "hours" | "days" => match args {
            [Value::Num(n)] => {
                let scale = match name {
                    "seconds" => 1_000.0,
                    "minutes" => 60_000.0,
                    "hours" => 3_600_000.0,
                    _ => 86_400_000.0,
                };
                Ok(Some(Value::Num(n * scale)))
            }
            _ => bad_args("one number"),
        },
        "last" => match args {
            [Value::Series(s)] => Ok(Some(Value::Num(
                s.last().copied().map(f64::from).unwrap_or(f64::NAN),
            ))),
            _ => bad_args("one series"),
        },
        "sma" => match args {
            [Value::Series(s), Value::Num(n)] if *n >= 1.0 => {
                Ok(Some(Value::Series(sma(s, *n as usize))))
            }
            _ => bad_args("a series and a window length"),
        },
        "ema" => match args {
            [Value::Series(s), Value::Num(n)] if *n >= 1.0 => {
                Ok(Some(Value::Series(ema(s, *n as usize))))
            }
            _ => bad_args("a series and a window length"),
        },
        "shift" => match args {
            [Value::Series(s), Value::Num(n)] => Ok(Some(Value::Series(shift(s, *n as i64)))),
            _ => bad_args("a series and an offset"),
        },
        "diff" => match args {
            [Value::Series(s)] => Ok(Some(Value::Series(diff(s)))),
            _ => bad_args("one series"),
        },
        "rolling_max" | "rolling_min" => match args {
            [Value::Series(s), Value::Num(n)] if *n >= 1.0 => {
                let window = *n as usize;
                let take_max = name == "rolling_max";
                Ok(Some(Value::Series(rolling(s, window, take_max))))
            }
            _ => bad_args("a series and a window length"),
        },
        _ => Ok(None),
    }
}

fn sma(series: &[f32], window: usize) -> Vec<f32> {
    let mut out = vec![f32::NAN; series.len()];
    let mut sum = 0.0f64;
    for i in 0..series.len() {
        sum += series[i] as f64;
        if i >= window {
            sum -= series[i - window] as f64;
        }
        if i + 1 >= window {
            out[i] = (sum / window as f64) as f32;
        }
    }
    out
}

fn ema(series: &[f32], window: usize) -> Vec<f32> {
    let alpha = 2.0 / (window as f64 + 1.0);
    let mut out = vec![f32::NAN; series.len()];
    let mut prev: Option<f64> = None;
    for (i, &value) in series.iter().enumerate() {
        if (value as f64).is_nan() {
            continue;
        }
        let next = match prev {
            Some(p) => alpha * value as f64 + (1.0 - alpha) * p,
            None => value as f64,
        };
        prev = Some(next);
        out[i] = next as f32;
    }
    out
}

fn shift(series: &[f32], offset: i64) -> Vec<f32> {
    let len = series.len() as i64;
    (0..len)
        .map(|i| {
            let src = i - offset;
            if src >= 0 && src < len {
                series[src as usize]
            } else {
                f32::NAN
            }
        })
        .collect()
}

fn diff(series: &[f32]) -> Vec<f32> {
    let mut out = vec![f32::NAN; series.len()];
    for i in 1..series.len() {
        out[i] = series[i] - series[i - 1];
    }
    out
}

fn rolling(series: &[f32], window: usize, take_max: bool) -> Vec<f32> {
    let mut out = vec![f32::NAN; series.len()];
    for i in 0..series.len() {
        if i + 1 < window {
            continue;
        }
        let slice = &series[i + 1 - window..=i];
        let mut best = f32::NAN;
        for &v in slice {
            if v.is_nan() {
                continue;
            }
            if best.is_nan() || (take_max && v > best) || (!take_max && v < best) {
                best = v;
            }
        }
        out[i] = best;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parser::compile;

    /// Host that records calls and serves a couple of functions.
    struct TestHost {
        emitted: Vec<(String, f64)>,
    }

    impl HostFunctions for TestHost {
        fn call(
            &mut self,
            name: &str,
            args: &[Value],
            line: u32,
        ) -> Result<Option<Value>, ScriptError> {
            match name {
                "record" => {
                    let key = args[0].as_str().unwrap_or("?").to_string();
                    let value = args[1].as_num().unwrap_or(f64::NAN);
                    self.emitted.push((key, value));
                    Ok(Some(Value::Unit))
                }
                "three" => Ok(Some(Value::Num(3.0))),
                "series123" => Ok(Some(Value::Series(vec![1.0, 2.0, 3.0]))),
                "boom" => Err(ScriptError::new("decision", line, "boom")),
                _ => Ok(None),
            }
        }

        fn phase(&self) -> &'static str {
            "decision"
        }
    }

    fn run(source: &str) -> Result<Vec<(String, f64)>, ScriptError> {
        let program = compile(source, "decision")?;
        let mut host = TestHost { emitted: vec![] };
        evaluate(&program, &mut host)?;
        Ok(host.emitted)
    }

    #[test]
    fn test_arithmetic_and_variables() {
        let out = run("x = 2 + 3 * 4\nrecord(\"x\", x)").unwrap();
        assert_eq!(out, vec![("x".into(), 14.0)]);
    }

    #[test]
    fn test_if_else() {
        let out = run("x = three()\nif x > 2 { record(\"hi\", 1) } else { record(\"lo\", 0) }")
            .unwrap();
        assert_eq!(out, vec![("hi".into(), 1.0)]);
    }

    #[test]
    fn test_series_broadcast_and_last() {
        let out = run("s = series123() * 2 + 1\nrecord(\"last\", last(s))").unwrap();
        assert_eq!(out, vec![("last".into(), 7.0)]);
    }

    #[test]
    fn test_sma() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0], 2);
        assert!(out[0].is_nan());
        assert_eq!(&out[1..], &[1.5, 2.5, 3.5]);
    }

    #[test]
    fn test_shift_and_diff() {
        let shifted = shift(&[1.0, 2.0, 3.0], 1);
        assert!(shifted[0].is_nan());
        assert_eq!(&shifted[1..], &[1.0, 2.0]);

        let deltas = diff(&[1.0, 4.0, 9.0]);
        assert!(deltas[0].is_nan());
        assert_eq!(&deltas[1..], &[3.0, 5.0]);
    }

    #[test]
    fn test_rolling_extremes() {
        let maxes = rolling(&[1.0, 3.0, 2.0, 5.0], 2, true);
        assert!(maxes[0].is_nan());
        assert_eq!(&maxes[1..], &[3.0, 3.0, 5.0]);

        let mins = rolling(&[1.0, 3.0, 2.0, 5.0], 2, false);
        assert_eq!(&mins[1..], &[1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_durations() {
        let out = run("record(\"d\", days(2) + hours(1))").unwrap();
        assert_eq!(out[0].1, 2.0 * 86_400_000.0 + 3_600_000.0);
    }

    #[test]
    fn test_unknown_variable_errors() {
        let err = run("record(\"x\", mystery)").unwrap_err();
        assert!(err.message.contains("mystery"));
    }

    #[test]
    fn test_unknown_function_errors() {
        let err = run("whatever(1)").unwrap_err();
        assert!(err.message.contains("whatever"));
    }

    #[test]
    fn test_host_error_propagates() {
        let err = run("boom()").unwrap_err();
        assert_eq!(err.message, "boom");
    }

    #[test]
    fn test_non_boolean_condition_errors() {
        let err = run("if 1 { record(\"x\", 1) }").unwrap_err();
        assert!(err.message.contains("boolean"));
    }

    #[test]
    fn test_short_circuit() {
        // boom() must not run when the left side already decides.
        let out = run("if false && boom() { record(\"x\", 1) }");
        assert!(out.is_ok());
        let out = run("if true || boom() { record(\"y\", 2) }").unwrap();
        assert_eq!(out, vec![("y".into(), 2.0)]);
    }
}

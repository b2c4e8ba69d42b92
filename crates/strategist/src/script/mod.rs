//! The embedded strategy-script language.
//!
//! A deliberately small statement language: assignments, `if`/`else`,
//! function calls, arithmetic over numbers and f32 series. Scripts compile
//! once into an AST ([`Program`]) and are evaluated against a host context
//! that provides the domain functions (candle access, indicator emission,
//! decision placement).

mod eval;
mod lexer;
mod parser;
mod value;

pub use eval::{evaluate, HostFunctions};
pub use parser::{compile, Block, Expr, Program, Stmt};
pub use value::Value;

//! # Formula Language
//!
//! Spreadsheet-like arithmetic used by field and table-column formulas.
//!
//! ## Pipeline
//!
//! ```text
//! "=qty * {unit price}" ──► lexer ──► parser ──► Expr ──► eval(Scope) ──► f64
//! ```
//!
//! The evaluator knows nothing about fields: every name goes through a
//! [`Scope`], which is how [`crate::resolve`] plugs in field, cell, column
//! and group lookups plus circular-reference detection.
//!
//! ## Syntax
//!
//! | Form | Example |
//! |------|---------|
//! | Numbers | `3`, `2.5`, `.5e2` |
//! | Operators | `+ - * / % ^`, comparisons `== != < <= > >=` (yield 1/0) |
//! | References | `total`, `items_0_qty`, `items.qty`, `address.zip`, `{unit price}` |
//! | Functions | `SUM MIN MAX AVG COUNT ROUND ABS FLOOR CEIL SQRT POW IF` |
//!
//! ```
//! use plantilla::formula::{self, Operand, Scope, EvalError};
//!
//! struct Fixed;
//! impl Scope for Fixed {
//!     fn lookup(&mut self, _name: &str) -> Result<Operand, EvalError> {
//!         Ok(Operand::Scalar(4.0))
//!     }
//! }
//!
//! let expr = formula::parse("=ROUND(qty * 1.125, 2)").unwrap();
//! assert_eq!(expr.eval(&mut Fixed), Ok(4.5));
//! ```

mod eval;
mod lexer;
mod parser;

pub use eval::{EvalError, Operand, Scope};
pub use parser::{BinOp, Expr, Func, MAX_NESTING, MAX_TOKENS, parse};

use thiserror::Error;

/// Errors raised while parsing a formula.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("formula is empty")]
    Empty,

    #[error("syntax error at {pos}: {message}")]
    Syntax { pos: usize, message: String },

    #[error("unknown function '{name}' at {pos}")]
    UnknownFunction { name: String, pos: usize },

    #[error("wrong number of arguments to {name} ({got}) at {pos}")]
    Arity {
        name: &'static str,
        got: usize,
        pos: usize,
    },
}

impl FormulaError {
    /// Move the reported position by `offset` bytes.
    fn shifted(self, offset: usize) -> Self {
        match self {
            FormulaError::Syntax { pos, message } => FormulaError::Syntax {
                pos: pos + offset,
                message,
            },
            FormulaError::UnknownFunction { name, pos } => FormulaError::UnknownFunction {
                name,
                pos: pos + offset,
            },
            FormulaError::Arity { name, got, pos } => FormulaError::Arity {
                name,
                got,
                pos: pos + offset,
            },
            FormulaError::Empty => FormulaError::Empty,
        }
    }
}

//! Expression evaluation against a reference scope.

use thiserror::Error;

use super::parser::{BinOp, Expr, Func};

/// Value a reference resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Scalar(f64),
    /// A whole table column. Aggregates take every element; scalar use sums it.
    List(Vec<f64>),
}

impl Operand {
    fn scalar(&self) -> f64 {
        match self {
            Operand::Scalar(n) => *n,
            Operand::List(items) => items.iter().sum(),
        }
    }
}

/// Resolves reference names while an expression is evaluated.
///
/// Lookups take `&mut self` so a scope can memoize and track the set of
/// references currently being evaluated.
pub trait Scope {
    fn lookup(&mut self, name: &str) -> Result<Operand, EvalError>;
}

/// Errors raised while evaluating a parsed formula.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("circular reference through '{0}'")]
    CircularReference(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not a finite number")]
    NotFinite,

    #[error("invalid formula: {0}")]
    Invalid(String),

    #[error("references nest deeper than {0} formulas")]
    TooDeep(usize),
}

impl Expr {
    /// Evaluate to a finite number.
    pub fn eval(&self, scope: &mut dyn Scope) -> Result<f64, EvalError> {
        let value = self.eval_inner(scope)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(EvalError::NotFinite)
        }
    }

    fn eval_inner(&self, scope: &mut dyn Scope) -> Result<f64, EvalError> {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Ref(name) => Ok(scope.lookup(name)?.scalar()),
            Expr::Neg(inner) => Ok(-inner.eval_inner(scope)?),
            Expr::Binary { op, lhs, rhs } => {
                let a = lhs.eval_inner(scope)?;
                let b = rhs.eval_inner(scope)?;
                apply_binary(*op, a, b)
            }
            Expr::Call { func, args } => call(*func, args, scope),
        }
    }

    /// Evaluate as an aggregate argument: column references stay lists.
    fn eval_list(&self, scope: &mut dyn Scope, out: &mut Vec<f64>) -> Result<(), EvalError> {
        match self {
            Expr::Ref(name) => match scope.lookup(name)? {
                Operand::Scalar(n) => out.push(n),
                Operand::List(items) => out.extend(items),
            },
            other => out.push(other.eval_inner(scope)?),
        }
        Ok(())
    }
}

fn apply_binary(op: BinOp, a: f64, b: f64) -> Result<f64, EvalError> {
    let truth = |cond: bool| if cond { 1.0 } else { 0.0 };
    Ok(match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            a / b
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            a % b
        }
        BinOp::Pow => a.powf(b),
        BinOp::Eq => truth(a == b),
        BinOp::Ne => truth(a != b),
        BinOp::Lt => truth(a < b),
        BinOp::Le => truth(a <= b),
        BinOp::Gt => truth(a > b),
        BinOp::Ge => truth(a >= b),
    })
}

fn call(func: Func, args: &[Expr], scope: &mut dyn Scope) -> Result<f64, EvalError> {
    let arg = |i: usize| {
        args.get(i)
            .ok_or_else(|| EvalError::Invalid(format!("{} is missing argument {}", func.name(), i + 1)))
    };

    match func {
        Func::Sum | Func::Min | Func::Max | Func::Avg | Func::Count => {
            let mut values = Vec::new();
            for a in args {
                a.eval_list(scope, &mut values)?;
            }
            Ok(aggregate(func, &values))
        }
        Func::If => {
            // Only the taken branch is evaluated.
            let cond = arg(0)?.eval_inner(scope)?;
            if cond != 0.0 {
                arg(1)?.eval_inner(scope)
            } else {
                arg(2)?.eval_inner(scope)
            }
        }
        Func::Round => {
            let x = arg(0)?.eval_inner(scope)?;
            let digits = match args.get(1) {
                Some(d) => d.eval_inner(scope)?.round().clamp(-15.0, 15.0) as i32,
                None => 0,
            };
            if digits >= 0 {
                let factor = 10f64.powi(digits);
                Ok((x * factor).round() / factor)
            } else {
                let factor = 10f64.powi(-digits);
                Ok((x / factor).round() * factor)
            }
        }
        Func::Abs => Ok(arg(0)?.eval_inner(scope)?.abs()),
        Func::Floor => Ok(arg(0)?.eval_inner(scope)?.floor()),
        Func::Ceil => Ok(arg(0)?.eval_inner(scope)?.ceil()),
        Func::Sqrt => Ok(arg(0)?.eval_inner(scope)?.sqrt()),
        Func::Pow => {
            let base = arg(0)?.eval_inner(scope)?;
            let exponent = arg(1)?.eval_inner(scope)?;
            Ok(base.powf(exponent))
        }
    }
}

/// Aggregate a flattened argument list. Empty lists aggregate to 0.
fn aggregate(func: Func, values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    match func {
        Func::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        Func::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Func::Avg => values.iter().sum::<f64>() / values.len() as f64,
        Func::Count => values.len() as f64,
        _ => values.iter().sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::parse;
    use std::collections::HashMap;

    struct MapScope {
        vars: HashMap<&'static str, Operand>,
        lookups: Vec<String>,
    }

    impl MapScope {
        fn new(vars: &[(&'static str, Operand)]) -> Self {
            Self {
                vars: vars.iter().cloned().collect(),
                lookups: Vec::new(),
            }
        }
    }

    impl Scope for MapScope {
        fn lookup(&mut self, name: &str) -> Result<Operand, EvalError> {
            self.lookups.push(name.to_string());
            Ok(self.vars.get(name).cloned().unwrap_or(Operand::Scalar(0.0)))
        }
    }

    fn eval(src: &str, scope: &mut MapScope) -> Result<f64, EvalError> {
        parse(src).unwrap().eval(scope)
    }

    fn eval_empty(src: &str) -> Result<f64, EvalError> {
        eval(src, &mut MapScope::new(&[]))
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval_empty("1 + 2 * 3"), Ok(7.0));
        assert_eq!(eval_empty("(1 + 2) * 3"), Ok(9.0));
        assert_eq!(eval_empty("7 % 4"), Ok(3.0));
        assert_eq!(eval_empty("2 ^ 10"), Ok(1024.0));
        assert_eq!(eval_empty("-3 + +5"), Ok(2.0));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(eval_empty("1 / 0"), Err(EvalError::DivisionByZero));
        assert_eq!(eval_empty("5 % 0"), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn test_not_finite() {
        assert_eq!(eval_empty("SQRT(-1)"), Err(EvalError::NotFinite));
        assert_eq!(eval_empty("10 ^ 400"), Err(EvalError::NotFinite));
    }

    #[test]
    fn test_references_and_lists() {
        let mut scope = MapScope::new(&[
            ("price", Operand::Scalar(2.5)),
            ("items.total", Operand::List(vec![1.0, 2.0, 3.0])),
        ]);
        assert_eq!(eval("price * 4", &mut scope), Ok(10.0));
        assert_eq!(eval("items.total", &mut scope), Ok(6.0));
        assert_eq!(eval("MAX(items.total)", &mut scope), Ok(3.0));
        assert_eq!(eval("COUNT(items.total, price)", &mut scope), Ok(4.0));
        assert_eq!(eval("AVG(items.total)", &mut scope), Ok(2.0));
        assert_eq!(eval("MIN(items.total) - unknown", &mut scope), Ok(1.0));
    }

    #[test]
    fn test_aggregate_of_expression_is_scalar() {
        let mut scope = MapScope::new(&[("col", Operand::List(vec![1.0, 2.0]))]);
        // (col * 2) sums the list first, then doubles
        assert_eq!(eval("MAX(col * 2, 5)", &mut scope), Ok(6.0));
    }

    #[test]
    fn test_round() {
        assert_eq!(eval_empty("ROUND(2.346, 2)"), Ok(2.35));
        assert_eq!(eval_empty("ROUND(2.5)"), Ok(3.0));
        assert_eq!(eval_empty("ROUND(1234, -2)"), Ok(1200.0));
    }

    #[test]
    fn test_if_evaluates_only_taken_branch() {
        let mut scope = MapScope::new(&[("a", Operand::Scalar(1.0))]);
        assert_eq!(eval("IF(a >= 1, 10, other)", &mut scope), Ok(10.0));
        assert!(!scope.lookups.contains(&"other".to_string()));
        assert_eq!(eval("IF(a != 1, 1 / 0, 2)", &mut scope), Ok(2.0));
    }

    #[test]
    fn test_empty_aggregate_is_zero() {
        let mut scope = MapScope::new(&[("col", Operand::List(vec![]))]);
        assert_eq!(eval("MIN(col)", &mut scope), Ok(0.0));
        assert_eq!(eval("AVG(col)", &mut scope), Ok(0.0));
    }
}

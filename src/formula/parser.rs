//! Recursive-descent parser producing an [`Expr`] tree.

use super::FormulaError;
use super::lexer::{Token, TokenKind, tokenize};

/// Longest formula accepted, in tokens.
pub const MAX_TOKENS: usize = 512;

/// Deepest accepted nesting of parentheses, calls and unary signs.
pub const MAX_NESTING: usize = 64;

/// Binary operators, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl BinOp {
    fn comparison(op: &str) -> Option<Self> {
        match op {
            "==" => Some(BinOp::Eq),
            "!=" => Some(BinOp::Ne),
            "<" => Some(BinOp::Lt),
            "<=" => Some(BinOp::Le),
            ">" => Some(BinOp::Gt),
            ">=" => Some(BinOp::Ge),
            _ => None,
        }
    }
}

/// Built-in functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Sum,
    Min,
    Max,
    Avg,
    Count,
    Round,
    Abs,
    Floor,
    Ceil,
    Sqrt,
    Pow,
    If,
}

impl Func {
    /// Look up a function by name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "SUM" => Some(Func::Sum),
            "MIN" => Some(Func::Min),
            "MAX" => Some(Func::Max),
            "AVG" | "AVERAGE" | "MEAN" => Some(Func::Avg),
            "COUNT" => Some(Func::Count),
            "ROUND" => Some(Func::Round),
            "ABS" => Some(Func::Abs),
            "FLOOR" => Some(Func::Floor),
            "CEIL" | "CEILING" => Some(Func::Ceil),
            "SQRT" => Some(Func::Sqrt),
            "POW" | "POWER" => Some(Func::Pow),
            "IF" => Some(Func::If),
            _ => None,
        }
    }

    /// Accepted argument counts (inclusive).
    fn arity(self) -> (usize, usize) {
        match self {
            Func::Sum | Func::Min | Func::Max | Func::Avg | Func::Count => (1, usize::MAX),
            Func::Round => (1, 2),
            Func::Abs | Func::Floor | Func::Ceil | Func::Sqrt => (1, 1),
            Func::Pow => (2, 2),
            Func::If => (3, 3),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Func::Sum => "SUM",
            Func::Min => "MIN",
            Func::Max => "MAX",
            Func::Avg => "AVG",
            Func::Count => "COUNT",
            Func::Round => "ROUND",
            Func::Abs => "ABS",
            Func::Floor => "FLOOR",
            Func::Ceil => "CEIL",
            Func::Sqrt => "SQRT",
            Func::Pow => "POW",
            Func::If => "IF",
        }
    }
}

/// Parsed formula.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// Reference to a field, cell, column, or group member.
    Ref(String),
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        func: Func,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Every distinct reference name, in first-appearance order.
    pub fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_refs(&mut out);
        out
    }

    fn collect_refs<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Number(_) => {}
            Expr::Ref(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Expr::Neg(inner) => inner.collect_refs(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_refs(out);
                rhs.collect_refs(out);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_refs(out);
                }
            }
        }
    }
}

/// Parse a formula. A single leading `=` is ignored.
pub fn parse(src: &str) -> Result<Expr, FormulaError> {
    let body = src.trim();
    let body = body.strip_prefix('=').unwrap_or(body);
    let offset = src.len() - src.trim_start().len() + (src.trim().len() - body.len());

    if body.trim().is_empty() {
        return Err(FormulaError::Empty);
    }

    let tokens = tokenize(body).map_err(|e| e.shifted(offset))?;
    if tokens.len() > MAX_TOKENS {
        return Err(FormulaError::Syntax {
            pos: offset,
            message: format!("formula is longer than {} tokens", MAX_TOKENS),
        });
    }
    let mut parser = Parser {
        tokens,
        idx: 0,
        depth: 0,
    };
    let expr = parser.comparison().map_err(|e| e.shifted(offset))?;

    match parser.peek() {
        TokenKind::End => Ok(expr),
        other => Err(FormulaError::Syntax {
            pos: parser.pos() + offset,
            message: format!("unexpected {}", describe(other)),
        }),
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Number(n) => format!("number {}", n),
        TokenKind::Ident(s) => format!("name '{}'", s),
        TokenKind::Braced(s) => format!("reference '{{{}}}'", s),
        TokenKind::Op(op) => format!("'{}'", op),
        TokenKind::End => "end of formula".into(),
    }
}

struct Parser {
    tokens: Vec<Token>,
    idx: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.idx.min(self.tokens.len() - 1)].kind
    }

    fn pos(&self) -> usize {
        self.tokens[self.idx.min(self.tokens.len() - 1)].pos
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.idx < self.tokens.len() - 1 {
            self.idx += 1;
        }
        kind
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), TokenKind::Op(o) if *o == op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), FormulaError> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(FormulaError::Syntax {
                pos: self.pos(),
                message: format!("expected '{}', found {}", op, describe(self.peek())),
            })
        }
    }

    // comparison := additive (cmp additive)?
    fn comparison(&mut self) -> Result<Expr, FormulaError> {
        let lhs = self.additive()?;
        let op = match self.peek() {
            TokenKind::Op(o) => BinOp::comparison(o),
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let rhs = self.additive()?;
                Ok(binary(op, lhs, rhs))
            }
            None => Ok(lhs),
        }
    }

    // additive := term (('+' | '-') term)*
    fn additive(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        loop {
            let op = if self.eat_op("+") {
                BinOp::Add
            } else if self.eat_op("-") {
                BinOp::Sub
            } else {
                return Ok(lhs);
            };
            let rhs = self.term()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    // term := unary (('*' | '/' | '%') unary)*
    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        loop {
            let op = if self.eat_op("*") {
                BinOp::Mul
            } else if self.eat_op("/") {
                BinOp::Div
            } else if self.eat_op("%") {
                BinOp::Mod
            } else {
                return Ok(lhs);
            };
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    // unary := ('-' | '+') unary | power
    //
    // Every recursive path (parentheses, call arguments, exponents, signs)
    // passes through here, so this is where nesting is bounded.
    fn unary(&mut self) -> Result<Expr, FormulaError> {
        if self.depth >= MAX_NESTING {
            return Err(FormulaError::Syntax {
                pos: self.pos(),
                message: format!("formula nests deeper than {} levels", MAX_NESTING),
            });
        }
        self.depth += 1;
        let result = self.signed();
        self.depth -= 1;
        result
    }

    fn signed(&mut self) -> Result<Expr, FormulaError> {
        if self.eat_op("-") {
            let inner = self.unary()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        if self.eat_op("+") {
            return self.unary();
        }
        self.power()
    }

    // power := primary ('^' unary)?   (right-associative)
    fn power(&mut self) -> Result<Expr, FormulaError> {
        let base = self.primary()?;
        if self.eat_op("^") {
            let exponent = self.unary()?;
            return Ok(binary(BinOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        let pos = self.pos();
        match self.advance() {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::Braced(name) => Ok(Expr::Ref(name)),
            TokenKind::Ident(name) => {
                if self.eat_op("(") {
                    self.call(name, pos)
                } else {
                    Ok(Expr::Ref(name))
                }
            }
            TokenKind::Op("(") => {
                let inner = self.comparison()?;
                self.expect_op(")")?;
                Ok(inner)
            }
            other => Err(FormulaError::Syntax {
                pos,
                message: format!("expected a value, found {}", describe(&other)),
            }),
        }
    }

    fn call(&mut self, name: String, pos: usize) -> Result<Expr, FormulaError> {
        let func = Func::from_name(&name).ok_or(FormulaError::UnknownFunction { name, pos })?;

        let mut args = Vec::new();
        if !self.eat_op(")") {
            loop {
                args.push(self.comparison()?);
                if self.eat_op(",") {
                    continue;
                }
                self.expect_op(")")?;
                break;
            }
        }

        let (min, max) = func.arity();
        if args.len() < min || args.len() > max {
            return Err(FormulaError::Arity {
                name: func.name(),
                got: args.len(),
                pos,
            });
        }

        Ok(Expr::Call { func, args })
    }
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn r(name: &str) -> Expr {
        Expr::Ref(name.into())
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            parse("a + b * 2").unwrap(),
            binary(BinOp::Add, r("a"), binary(BinOp::Mul, r("b"), Expr::Number(2.0)))
        );
    }

    #[test]
    fn test_leading_equals_and_parens() {
        assert_eq!(
            parse(" =(a + b) * 2").unwrap(),
            binary(BinOp::Mul, binary(BinOp::Add, r("a"), r("b")), Expr::Number(2.0))
        );
    }

    #[test]
    fn test_power_right_associative_and_unary() {
        // -2^2 parses as -(2^2); 2^3^2 as 2^(3^2)
        assert_eq!(
            parse("-2^2").unwrap(),
            Expr::Neg(Box::new(binary(
                BinOp::Pow,
                Expr::Number(2.0),
                Expr::Number(2.0)
            )))
        );
        assert_eq!(
            parse("2^3^2").unwrap(),
            binary(
                BinOp::Pow,
                Expr::Number(2.0),
                binary(BinOp::Pow, Expr::Number(3.0), Expr::Number(2.0))
            )
        );
    }

    #[test]
    fn test_function_call() {
        assert_eq!(
            parse("sum(items.total, 5)").unwrap(),
            Expr::Call {
                func: Func::Sum,
                args: vec![r("items.total"), Expr::Number(5.0)]
            }
        );
    }

    #[test]
    fn test_braced_reference_is_never_a_call() {
        assert!(parse("{sum}(1)").is_err());
        assert_eq!(parse("{sum}").unwrap(), r("sum"));
    }

    #[test]
    fn test_references_unique_in_order() {
        let expr = parse("IF(a > b, a, c) + b").unwrap();
        assert_eq!(expr.references(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse("   "), Err(FormulaError::Empty));
        assert_eq!(parse("="), Err(FormulaError::Empty));
        assert!(matches!(
            parse("foo(1)"),
            Err(FormulaError::UnknownFunction { .. })
        ));
        assert!(matches!(
            parse("ROUND(1, 2, 3)"),
            Err(FormulaError::Arity { name: "ROUND", got: 3, .. })
        ));
        assert!(matches!(parse("IF()"), Err(FormulaError::Arity { got: 0, .. })));
        assert!(matches!(parse("(1 + 2"), Err(FormulaError::Syntax { .. })));
    }

    #[test]
    fn test_error_positions_account_for_prefix() {
        // "= 1 +" : the missing operand is at end of input (byte 5)
        assert_eq!(
            parse("= 1 +"),
            Err(FormulaError::Syntax {
                pos: 5,
                message: "expected a value, found end of formula".into()
            })
        );
        // trailing token after a complete expression
        assert_eq!(
            parse("1 2"),
            Err(FormulaError::Syntax {
                pos: 2,
                message: "unexpected number 2".into()
            })
        );
    }

    #[test]
    fn test_deep_nesting_is_a_syntax_error() {
        let src = format!("{}1{}", "(".repeat(50_000), ")".repeat(50_000));
        assert!(matches!(parse(&src), Err(FormulaError::Syntax { .. })));

        let nested = format!("{}1{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert!(matches!(parse(&nested), Err(FormulaError::Syntax { .. })));

        let signs = format!("{}1", "-".repeat(MAX_NESTING + 1));
        assert!(matches!(parse(&signs), Err(FormulaError::Syntax { .. })));
    }

    #[test]
    fn test_moderate_nesting_parses() {
        let src = format!("{}1{}", "(".repeat(20), ")".repeat(20));
        assert_eq!(parse(&src).unwrap(), Expr::Number(1.0));
        assert_eq!(parse("ROUND(ABS(-(2 * (3 + 4))), 0)").unwrap().references(), Vec::<&str>::new());
    }

    #[test]
    fn test_overlong_formula_rejected() {
        let terms = vec!["a"; MAX_TOKENS].join(" + ");
        assert!(matches!(parse(&terms), Err(FormulaError::Syntax { .. })));

        let sum = vec!["a"; 100].join(" + ");
        assert!(parse(&sum).is_ok());
    }
}

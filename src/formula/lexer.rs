//! Tokenizer for formula strings.

use lazy_static::lazy_static;
use regex::Regex;

use super::FormulaError;

lazy_static! {
    static ref TOKEN_REGEX: Regex = Regex::new(
        r"^(?:(?P<num>(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:[eE][+-]?[0-9]+)?)|(?P<ident>[A-Za-z_][A-Za-z0-9_.]*)|\{(?P<braced>[^{}]*)\}|(?P<op><=|>=|==|!=|<>|[-+*/%^(),<>]))"
    )
    .unwrap();
}

/// A lexical token with the byte offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    /// Bare identifier: a reference, or a function name when followed by `(`.
    Ident(String),
    /// `{...}` reference; never treated as a function name.
    Braced(String),
    Op(&'static str),
    End,
}

/// Intern operator text so tokens can carry `&'static str`.
fn op_str(s: &str) -> &'static str {
    match s {
        "<=" => "<=",
        ">=" => ">=",
        "==" => "==",
        "!=" | "<>" => "!=",
        "+" => "+",
        "-" => "-",
        "*" => "*",
        "/" => "/",
        "%" => "%",
        "^" => "^",
        "(" => "(",
        ")" => ")",
        "," => ",",
        "<" => "<",
        _ => ">",
    }
}

/// Split a formula into tokens. A trailing [`TokenKind::End`] is always appended.
pub fn tokenize(src: &str) -> Result<Vec<Token>, FormulaError> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < src.len() {
        let rest = &src[pos..];
        let trimmed = rest.trim_start();
        if trimmed.is_empty() {
            break;
        }
        pos += rest.len() - trimmed.len();

        let caps = TOKEN_REGEX
            .captures(trimmed)
            .ok_or_else(|| FormulaError::Syntax {
                pos,
                message: format!(
                    "unexpected character '{}'",
                    trimmed.chars().next().unwrap_or(' ')
                ),
            })?;

        let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
        let kind = if let Some(m) = caps.name("num") {
            let n = m.as_str().parse::<f64>().map_err(|_| FormulaError::Syntax {
                pos,
                message: format!("invalid number '{}'", m.as_str()),
            })?;
            TokenKind::Number(n)
        } else if let Some(m) = caps.name("ident") {
            TokenKind::Ident(m.as_str().to_string())
        } else if let Some(m) = caps.name("braced") {
            let name = m.as_str().trim();
            if name.is_empty() {
                return Err(FormulaError::Syntax {
                    pos,
                    message: "empty reference '{}'".into(),
                });
            }
            TokenKind::Braced(name.to_string())
        } else {
            TokenKind::Op(op_str(whole))
        };

        tokens.push(Token { kind, pos });
        pos += whole.len();
    }

    tokens.push(Token {
        kind: TokenKind::End,
        pos: src.len(),
    });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_arithmetic_tokens() {
        assert_eq!(
            kinds("qty*1.5 + items_0_qty"),
            vec![
                TokenKind::Ident("qty".into()),
                TokenKind::Op("*"),
                TokenKind::Number(1.5),
                TokenKind::Op("+"),
                TokenKind::Ident("items_0_qty".into()),
                TokenKind::End,
            ]
        );
    }

    #[test]
    fn test_braced_and_dotted() {
        assert_eq!(
            kinds("{unit price} - addr.zip"),
            vec![
                TokenKind::Braced("unit price".into()),
                TokenKind::Op("-"),
                TokenKind::Ident("addr.zip".into()),
                TokenKind::End,
            ]
        );
    }

    #[test]
    fn test_comparison_operators() {
        assert_eq!(
            kinds("a<>b >= 2"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Op("!="),
                TokenKind::Ident("b".into()),
                TokenKind::Op(">="),
                TokenKind::Number(2.0),
                TokenKind::End,
            ]
        );
    }

    #[test]
    fn test_exponent_and_leading_dot() {
        assert_eq!(
            kinds(".5e2"),
            vec![TokenKind::Number(50.0), TokenKind::End]
        );
    }

    #[test]
    fn test_unexpected_character_position() {
        let err = tokenize("a + $b").unwrap_err();
        assert_eq!(
            err,
            FormulaError::Syntax {
                pos: 4,
                message: "unexpected character '$'".into()
            }
        );
    }
}

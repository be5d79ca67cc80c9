//! Resolved values and their display text.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;

use crate::formula::EvalError;
use crate::template::FieldType;
use crate::template::values::{is_blank, is_truthy, parse_number};

/// Default strftime pattern for date fields.
pub const DEFAULT_DATE_FORMAT: &str = "%d/%m/%Y";

/// Why a formula produced no value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "error", content = "detail", rename_all = "snake_case")]
pub enum ValueError {
    /// The formula is on, or depends on, a reference cycle.
    Circular(String),
    DivisionByZero,
    /// Unparsable formula or a non-finite result.
    Invalid(String),
}

impl ValueError {
    /// Spreadsheet-style error code shown in place of the value.
    pub fn code(&self) -> &'static str {
        match self {
            ValueError::Circular(_) => "#CIRC!",
            ValueError::DivisionByZero => "#DIV/0!",
            ValueError::Invalid(_) => "#ERROR!",
        }
    }
}

impl From<EvalError> for ValueError {
    fn from(e: EvalError) -> Self {
        match e {
            EvalError::CircularReference(key) => ValueError::Circular(key),
            EvalError::DivisionByZero => ValueError::DivisionByZero,
            other => ValueError::Invalid(other.to_string()),
        }
    }
}

/// A concrete, renderable value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ResolvedValue {
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    List(Vec<String>),
    /// Image or signature as a data URL.
    Image(String),
    Error(ValueError),
}

impl ResolvedValue {
    /// Display text. Numbers keep at most `decimals` digits after the point.
    pub fn display(&self, decimals: u8) -> String {
        match self {
            ResolvedValue::Empty | ResolvedValue::Image(_) => String::new(),
            ResolvedValue::Number(n) => format_number(*n, decimals),
            ResolvedValue::Text(s) => s.clone(),
            ResolvedValue::Bool(b) => b.to_string(),
            ResolvedValue::List(items) => items.join("\n"),
            ResolvedValue::Error(e) => e.code().to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ResolvedValue::Empty)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ResolvedValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// Format with up to `decimals` fraction digits, trailing zeros trimmed.
///
/// ```
/// use plantilla::resolve::format_number;
/// assert_eq!(format_number(12.5, 2), "12.5");
/// assert_eq!(format_number(2.0 / 3.0, 2), "0.67");
/// assert_eq!(format_number(-0.001, 2), "0");
/// ```
pub fn format_number(n: f64, decimals: u8) -> String {
    let mut s = format!("{:.*}", decimals as usize, n);
    if s.contains('.') {
        let trimmed = s.trim_end_matches('0').trim_end_matches('.').len();
        s.truncate(trimmed);
    }
    if s == "-0" {
        s = "0".into();
    }
    s
}

/// Interpret a raw input value according to the field type.
pub fn interpret(field_type: FieldType, raw: Option<&Value>, date_format: Option<&str>) -> ResolvedValue {
    match field_type {
        FieldType::Checkbox => return ResolvedValue::Bool(raw.is_some_and(is_truthy)),
        // Containers have no value of their own; their cells and members do.
        FieldType::Table | FieldType::Group => return ResolvedValue::Empty,
        _ => {}
    }

    let raw = match raw {
        Some(v) if !is_blank(v) => v,
        _ => return ResolvedValue::Empty,
    };

    match field_type {
        FieldType::Number => match raw {
            Value::Number(n) => n
                .as_f64()
                .map(ResolvedValue::Number)
                .unwrap_or(ResolvedValue::Empty),
            Value::String(s) => parse_number(s)
                .map(ResolvedValue::Number)
                .unwrap_or_else(|| ResolvedValue::Text(s.clone())),
            other => ResolvedValue::Text(plain_text(other)),
        },
        FieldType::List => match raw {
            Value::Array(items) => ResolvedValue::List(items.iter().map(plain_text).collect()),
            other => ResolvedValue::List(
                plain_text(other)
                    .lines()
                    .map(str::to_string)
                    .collect(),
            ),
        },
        FieldType::Image | FieldType::Signature => match raw {
            Value::String(s) => ResolvedValue::Image(s.clone()),
            _ => ResolvedValue::Empty,
        },
        FieldType::Date => {
            let text = plain_text(raw);
            let pattern = date_format.unwrap_or(DEFAULT_DATE_FORMAT);
            ResolvedValue::Text(format_date(&text, pattern).unwrap_or(text))
        }
        _ => ResolvedValue::Text(plain_text(raw)),
    }
}

/// Reformat an ISO date (`2024-03-01`), datetime, or RFC 3339 timestamp.
pub fn format_date(input: &str, pattern: &str) -> Option<String> {
    let input = input.trim();
    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
        .or_else(|| {
            DateTime::parse_from_rfc3339(input)
                .ok()
                .map(|dt| dt.date_naive())
        })?;

    use std::fmt::Write;
    let mut out = String::new();
    // Invalid strftime patterns surface as a fmt error instead of a panic.
    write!(out, "{}", date.format(pattern)).ok()?;
    Some(out)
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Array(items) => items.iter().map(plain_text).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0, 2), "3");
        assert_eq!(format_number(1234.5678, 2), "1234.57");
        assert_eq!(format_number(1234.5678, 0), "1235");
        assert_eq!(format_number(0.1 + 0.2, 2), "0.3");
    }

    #[test]
    fn test_interpret_number() {
        assert_eq!(
            interpret(FieldType::Number, Some(&json!(" 7.5 ")), None),
            ResolvedValue::Number(7.5)
        );
        assert_eq!(
            interpret(FieldType::Number, Some(&json!("n/a")), None),
            ResolvedValue::Text("n/a".into())
        );
        assert_eq!(interpret(FieldType::Number, None, None), ResolvedValue::Empty);
    }

    #[test]
    fn test_interpret_checkbox_and_list() {
        assert_eq!(
            interpret(FieldType::Checkbox, None, None),
            ResolvedValue::Bool(false)
        );
        assert_eq!(
            interpret(FieldType::Checkbox, Some(&json!("on")), None),
            ResolvedValue::Bool(true)
        );
        assert_eq!(
            interpret(FieldType::List, Some(&json!(["a", 2])), None),
            ResolvedValue::List(vec!["a".into(), "2".into()])
        );
        assert_eq!(
            interpret(FieldType::List, Some(&json!("x\ny")), None),
            ResolvedValue::List(vec!["x".into(), "y".into()])
        );
    }

    #[test]
    fn test_interpret_date() {
        assert_eq!(
            interpret(FieldType::Date, Some(&json!("2024-03-01")), None),
            ResolvedValue::Text("01/03/2024".into())
        );
        assert_eq!(
            interpret(FieldType::Date, Some(&json!("2024-03-01T10:00:00Z")), Some("%Y/%m/%d")),
            ResolvedValue::Text("2024/03/01".into())
        );
        assert_eq!(
            interpret(FieldType::Date, Some(&json!("tomorrow")), None),
            ResolvedValue::Text("tomorrow".into())
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ResolvedValue::Error(ValueError::Circular("a".into())).display(2),
            "#CIRC!"
        );
        assert_eq!(ValueError::from(EvalError::NotFinite).code(), "#ERROR!");
    }
}

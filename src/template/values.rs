//! Raw input values keyed by field id.
//!
//! The designer stores values in three shapes that all end up here:
//!
//! ```text
//! {"customer": "ACME"}                    plain field
//! {"items_0_qty": 3}                      table cell: {table}_{row}_{column}
//! {"address": {"city": "Lyon"}}           group sub-field
//! ```
//!
//! Tables may also arrive as an array of row objects
//! (`{"items": [{"qty": 3}, {"qty": 1}]}`); those are flattened into cell keys
//! when the map is built.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Build the flat key of a table cell (`row` is 0-based).
pub fn cell_key(table: &str, row: usize, column: &str) -> String {
    format!("{}_{}_{}", table, row, column)
}

/// Build the dotted key of a group sub-field.
pub fn group_key(group: &str, sub: &str) -> String {
    format!("{}.{}", group, sub)
}

/// A bag of raw input values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "BTreeMap<String, Value>")]
pub struct ValueMap {
    values: BTreeMap<String, Value>,
}

impl From<Map<String, Value>> for ValueMap {
    fn from(map: Map<String, Value>) -> Self {
        let mut out = ValueMap::new();
        for (key, value) in map {
            out.insert(key, value);
        }
        out
    }
}

impl From<ValueMap> for BTreeMap<String, Value> {
    fn from(map: ValueMap) -> Self {
        map.values
    }
}

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Insert a value. Arrays of row objects are also flattened into cell keys.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Value::Array(rows) = &value {
            if !rows.is_empty() && rows.iter().all(Value::is_object) {
                for (row, obj) in rows.iter().enumerate() {
                    if let Value::Object(cells) = obj {
                        for (column, cell) in cells {
                            self.values
                                .insert(cell_key(&key, row, column), cell.clone());
                        }
                    }
                }
            }
        }
        self.values.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Raw value of a table cell.
    pub fn cell(&self, table: &str, row: usize, column: &str) -> Option<&Value> {
        self.values.get(&cell_key(table, row, column))
    }

    /// Raw value of a group sub-field: nested object first, then a dotted flat key.
    pub fn group_value(&self, group: &str, sub: &str) -> Option<&Value> {
        self.values
            .get(group)
            .and_then(|v| v.get(sub))
            .or_else(|| self.values.get(&group_key(group, sub)))
    }

    /// Numeric coercion of the value under `key`. Missing keys are 0.
    pub fn number(&self, key: &str) -> f64 {
        self.get(key).map(to_number).unwrap_or(0.0)
    }
}

/// Coerce a raw value to a number.
///
/// Numbers pass through, booleans are 1/0, strings are trimmed and parsed
/// (blank or unparsable → 0), arrays sum their elements, anything else is 0.
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::String(s) => parse_number(s).unwrap_or(0.0),
        Value::Array(items) => items.iter().map(to_number).sum(),
        Value::Null | Value::Object(_) => 0.0,
    }
}

/// Parse a user-entered number. Accepts surrounding whitespace.
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Truthiness for checkbox values: `true`, non-zero numbers, and the strings
/// `"true"`, `"yes"`, `"on"`, `"1"`, `"x"` (case-insensitive).
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "on" | "1" | "x"
        ),
        _ => false,
    }
}

/// A value counts as blank when it is null, an empty/whitespace string,
/// an empty array, or an empty object.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_and_cell_keys() {
        let values = ValueMap::from_json(r#"{"price": "12.5", "items_0_qty": 3}"#).unwrap();
        assert_eq!(values.number("price"), 12.5);
        assert_eq!(values.cell("items", 0, "qty"), Some(&json!(3)));
        assert_eq!(values.number("missing"), 0.0);
    }

    #[test]
    fn test_row_array_flattened() {
        let values =
            ValueMap::from_json(r#"{"items": [{"qty": 2, "price": 5}, {"qty": 1}]}"#).unwrap();
        assert_eq!(values.cell("items", 0, "price"), Some(&json!(5)));
        assert_eq!(values.cell("items", 1, "qty"), Some(&json!(1)));
        assert!(values.cell("items", 1, "price").is_none());
        // Original array is kept
        assert!(values.get("items").unwrap().is_array());
    }

    #[test]
    fn test_group_value_nested_and_dotted() {
        let values =
            ValueMap::from_json(r#"{"addr": {"zip": "69001"}, "contact.phone": "555"}"#).unwrap();
        assert_eq!(values.group_value("addr", "zip"), Some(&json!("69001")));
        assert_eq!(values.group_value("contact", "phone"), Some(&json!("555")));
        assert!(values.group_value("addr", "city").is_none());
    }

    #[test]
    fn test_to_number_coercion() {
        assert_eq!(to_number(&json!(true)), 1.0);
        assert_eq!(to_number(&json!(" 4 ")), 4.0);
        assert_eq!(to_number(&json!("abc")), 0.0);
        assert_eq!(to_number(&json!("")), 0.0);
        assert_eq!(to_number(&json!(null)), 0.0);
        assert_eq!(to_number(&json!([1, "2", 3.5])), 6.5);
        assert_eq!(to_number(&json!("inf")), 0.0);
    }

    #[test]
    fn test_truthy_and_blank() {
        assert!(is_truthy(&json!("Yes")));
        assert!(is_truthy(&json!(1)));
        assert!(!is_truthy(&json!("no")));
        assert!(!is_truthy(&json!(null)));
        assert!(is_blank(&json!("  ")));
        assert!(is_blank(&json!([])));
        assert!(!is_blank(&json!(0)));
    }

    #[test]
    fn test_serialize_round_trip_keeps_keys() {
        let mut values = ValueMap::new();
        values.insert("a", json!(1));
        let text = serde_json::to_string(&values).unwrap();
        assert_eq!(text, r#"{"a":1}"#);
    }
}

//! Cell values and column dtypes.
//!
//! A `Value` is what one cell of a per-ticker file holds once decoded against
//! its column's dtype. Empty strings and non-finite numbers normalize to
//! `Null` so that API payloads and CSV files decode to the same value.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Date format used in payloads and CSV cells.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Declared dtype of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Number,
    Date,
    Category,
}

impl ColumnType {
    /// String and category columns both hold text.
    pub fn is_text(&self) -> bool {
        matches!(self, ColumnType::String | ColumnType::Category)
    }
}

/// A decoded cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Number(f64),
    Text(String),
    Date(NaiveDate),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Decode a JSON payload field against the column dtype.
    pub fn from_json(json: &serde_json::Value, dtype: ColumnType) -> Result<Value, String> {
        use serde_json::Value as Json;

        match (json, dtype) {
            (Json::Null, _) => Ok(Value::Null),
            (Json::Number(n), ColumnType::Number) => Ok(n.as_f64().map_or(Value::Null, number)),
            (Json::String(s), ColumnType::Number) => parse_number(s),
            (Json::String(s), ColumnType::Date) => parse_date(s),
            (Json::String(s), ColumnType::String | ColumnType::Category) => Ok(text(s)),
            (Json::Number(n), ColumnType::String | ColumnType::Category) => Ok(text(&n.to_string())),
            (Json::Bool(b), ColumnType::String | ColumnType::Category) => Ok(text(&b.to_string())),
            (other, dtype) => Err(format!("cannot read {other} as {dtype:?}")),
        }
    }

    /// Decode a CSV cell against the column dtype.
    pub fn from_cell(cell: &str, dtype: ColumnType) -> Result<Value, String> {
        match dtype {
            ColumnType::Number => parse_number(cell),
            ColumnType::Date => parse_date(cell),
            ColumnType::String | ColumnType::Category => Ok(text(cell)),
        }
    }

    /// Encode as a CSV cell. `Null` is the empty cell.
    pub fn to_cell(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Number(n) => n.to_string(),
            Value::Text(s) => s.clone(),
            Value::Date(d) => d.format(DATE_FORMAT).to_string(),
        }
    }
}

fn number(n: f64) -> Value {
    if n.is_finite() {
        Value::Number(n)
    } else {
        Value::Null
    }
}

fn text(s: &str) -> Value {
    if s.is_empty() {
        Value::Null
    } else {
        Value::Text(s.to_string())
    }
}

fn parse_number(s: &str) -> Result<Value, String> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(Value::Null);
    }
    s.parse::<f64>()
        .map(number)
        .map_err(|_| format!("'{s}' is not a number"))
}

fn parse_date(s: &str) -> Result<Value, String> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(Value::Null);
    }
    // Timestamps like 2020-03-31T00:00:00 keep only their date part.
    let date_part = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(date_part, DATE_FORMAT)
        .map(Value::Date)
        .map_err(|_| format!("'{s}' is not a YYYY-MM-DD date"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_accept_numeric_strings() {
        assert_eq!(
            Value::from_json(&json!("12.5"), ColumnType::Number).unwrap(),
            Value::Number(12.5)
        );
        assert_eq!(
            Value::from_json(&json!(3), ColumnType::Number).unwrap(),
            Value::Number(3.0)
        );
        assert_eq!(
            Value::from_json(&json!(""), ColumnType::Number).unwrap(),
            Value::Null
        );
        assert!(Value::from_json(&json!("abc"), ColumnType::Number).is_err());
        assert!(Value::from_json(&json!(true), ColumnType::Number).is_err());
    }

    #[test]
    fn non_finite_numbers_become_null() {
        assert_eq!(Value::from_cell("NaN", ColumnType::Number).unwrap(), Value::Null);
        assert_eq!(Value::from_cell("inf", ColumnType::Number).unwrap(), Value::Null);
    }

    #[test]
    fn dates_parse_and_encode() {
        let v = Value::from_json(&json!("2020-03-31T00:00:00"), ColumnType::Date).unwrap();
        assert_eq!(v, Value::Date(NaiveDate::from_ymd_opt(2020, 3, 31).unwrap()));
        assert_eq!(v.to_cell(), "2020-03-31");
        assert!(Value::from_cell("31/03/2020", ColumnType::Date).is_err());
    }

    #[test]
    fn text_columns_stringify_numbers() {
        assert_eq!(
            Value::from_json(&json!(1301), ColumnType::String).unwrap(),
            Value::Text("1301".into())
        );
        assert_eq!(Value::from_cell("", ColumnType::Category).unwrap(), Value::Null);
    }

    #[test]
    fn cell_encoding_roundtrips_numbers() {
        for n in [0.0, 2020.0, -12.25, 1.0e-7, 123456789.125] {
            let cell = Value::Number(n).to_cell();
            assert_eq!(Value::from_cell(&cell, ColumnType::Number).unwrap(), Value::Number(n));
        }
    }
}

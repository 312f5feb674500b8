use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

use crate::domain::ColumnType;

/// Static type of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprType {
    Number,
    Bool,
    Text,
    Date,
}

impl ExprType {
    pub fn of_column(dtype: ColumnType) -> Self {
        match dtype {
            ColumnType::Number => ExprType::Number,
            ColumnType::Date => ExprType::Date,
            ColumnType::String | ColumnType::Category => ExprType::Text,
        }
    }
}

impl fmt::Display for ExprType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExprType::Number => "number",
            ExprType::Bool => "boolean",
            ExprType::Text => "text",
            ExprType::Date => "date",
        })
    }
}

/// A defined per-ticker result. Undefined results are `None` at the call site.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(f64),
    Bool(bool),
    Text(String),
    Date(NaiveDate),
}

impl Scalar {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Text(s) => f.write_str(s),
            Scalar::Date(d) => write!(f, "{d}"),
        }
    }
}

//! Ticker records: one decoded row, aligned with its kind's column schema.

use thiserror::Error;

use super::period::Period;
use super::value::Value;
use crate::schema::ColumnSchema;

/// One raw row as handed over by the fetch collaborator: field → JSON value,
/// keyed by the schema's column keys.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Why a raw row could not become a `TickerRecord`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RecordError {
    #[error("period column '{column}' is missing or null")]
    MissingPeriod { column: String },

    #[error("period column '{column}' has invalid value '{value}'")]
    InvalidPeriod { column: String, value: String },

    #[error("column '{column}': {reason}")]
    InvalidValue { column: String, reason: String },

    #[error("row has {actual} values, schema has {expected} columns")]
    Width { expected: usize, actual: usize },
}

/// A decoded row. `values[i]` belongs to the schema's i-th column.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerRecord {
    pub period: Period,
    pub values: Vec<Value>,
}

impl TickerRecord {
    /// Build a record from schema-ordered values, deriving its period.
    pub fn new(schema: &ColumnSchema, values: Vec<Value>) -> Result<Self, RecordError> {
        if values.len() != schema.len() {
            return Err(RecordError::Width {
                expected: schema.len(),
                actual: values.len(),
            });
        }
        let period = schema.period_of(&values)?;
        Ok(Self { period, values })
    }

    /// Decode a raw payload row. Fields the schema does not define are ignored;
    /// columns missing from the row are null.
    pub fn from_raw(schema: &ColumnSchema, raw: &RawRecord) -> Result<Self, RecordError> {
        let values = schema
            .columns()
            .iter()
            .map(|col| match raw.get(&col.key) {
                None => Ok(Value::Null),
                Some(json) => Value::from_json(json, col.dtype).map_err(|reason| {
                    RecordError::InvalidValue {
                        column: col.key.clone(),
                        reason,
                    }
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(schema, values)
    }

    pub fn value(&self, index: usize) -> &Value {
        self.values.get(index).unwrap_or(&Value::Null)
    }
}

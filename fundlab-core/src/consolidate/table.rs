use std::collections::BTreeMap;
use std::sync::Arc;

use super::ConsolidateError;
use crate::domain::{DataKind, TickerRecord, Value};
use crate::schema::ColumnSchema;

/// Ticker → records sorted by period, for one data kind.
///
/// No (ticker, period) pair appears twice. Company and indicator tickers
/// hold a single record.
#[derive(Debug, Clone)]
pub struct ConsolidatedTable {
    schema: Arc<ColumnSchema>,
    rows: BTreeMap<String, Vec<TickerRecord>>,
}

impl ConsolidatedTable {
    pub fn new(schema: Arc<ColumnSchema>) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
        }
    }

    /// Add a ticker's records, replacing any it already had.
    pub fn insert(
        &mut self,
        ticker: impl Into<String>,
        mut records: Vec<TickerRecord>,
    ) -> Result<(), ConsolidateError> {
        let ticker = ticker.into();
        records.sort_by_key(|r| r.period);
        if let Some(pair) = records.windows(2).find(|w| w[0].period == w[1].period) {
            return Err(ConsolidateError::DuplicatePeriod {
                ticker,
                period: pair[0].period,
            });
        }
        self.rows.insert(ticker, records);
        Ok(())
    }

    pub fn schema(&self) -> &Arc<ColumnSchema> {
        &self.schema
    }

    pub fn kind(&self) -> DataKind {
        self.schema.kind()
    }

    /// Tickers in ascending order.
    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[TickerRecord])> {
        self.rows.iter().map(|(t, r)| (t.as_str(), r.as_slice()))
    }

    pub fn records(&self, ticker: &str) -> Option<&[TickerRecord]> {
        self.rows.get(ticker).map(Vec::as_slice)
    }

    /// Q4 records of a ticker, oldest first.
    pub fn annual(&self, ticker: &str) -> impl Iterator<Item = &TickerRecord> {
        self.records(ticker)
            .unwrap_or_default()
            .iter()
            .filter(|r| r.period.is_annual())
    }

    /// The latest record's value of a column; for company and indicator
    /// tables that is the ticker's only row.
    pub fn latest_value(&self, ticker: &str, key: &str) -> Option<&Value> {
        let index = self.schema.position(key)?;
        self.records(ticker)?.last().map(|r| r.value(index))
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.rows.contains_key(ticker)
    }

    /// Number of tickers.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of records across all tickers.
    pub fn row_count(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }
}

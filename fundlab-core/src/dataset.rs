//! The consolidated tables a plot request runs against.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::consolidate::ConsolidatedTable;
use crate::domain::DataKind;
use crate::schema::ColumnSchema;

/// Immutable, shareable set of loaded tables, at most one per kind.
#[derive(Debug, Clone, Default)]
pub struct DataSet {
    tables: BTreeMap<DataKind, Arc<ConsolidatedTable>>,
}

impl DataSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `insert`.
    pub fn with_table(mut self, table: ConsolidatedTable) -> Self {
        self.insert(table);
        self
    }

    /// Add a table, replacing any previous table of its kind.
    pub fn insert(&mut self, table: ConsolidatedTable) {
        self.tables.insert(table.kind(), Arc::new(table));
    }

    pub fn table(&self, kind: DataKind) -> Option<&Arc<ConsolidatedTable>> {
        self.tables.get(&kind)
    }

    pub fn schema(&self, kind: DataKind) -> Option<&Arc<ColumnSchema>> {
        self.table(kind).map(|t| t.schema())
    }

    pub fn kinds(&self) -> impl Iterator<Item = DataKind> + '_ {
        self.tables.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Tickers a plot considers: the company table's tickers when it is
    /// loaded, otherwise every ticker of the plottable tables.
    pub fn candidate_tickers(&self) -> BTreeSet<String> {
        if let Some(company) = self.table(DataKind::Company) {
            return company.tickers().map(str::to_string).collect();
        }
        self.tables
            .values()
            .filter(|t| t.kind().is_plottable())
            .flat_map(|t| t.tickers().map(str::to_string))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ColumnType, TickerRecord, Value};
    use crate::schema::ColumnDefinition;

    fn table(kind: DataKind, key: &str, tickers: &[&str]) -> ConsolidatedTable {
        let schema = Arc::new(
            ColumnSchema::new(kind, vec![ColumnDefinition::new(key, key, ColumnType::String)])
                .unwrap(),
        );
        let mut table = ConsolidatedTable::new(Arc::clone(&schema));
        for ticker in tickers {
            let rec = TickerRecord::new(&schema, vec![Value::Text(ticker.to_string())]).unwrap();
            table.insert(*ticker, vec![rec]).unwrap();
        }
        table
    }

    #[test]
    fn candidates_come_from_company_table_first() {
        let data = DataSet::new()
            .with_table(table(DataKind::Indicator, "market", &["1301", "9999"]))
            .with_table(table(DataKind::Company, "company_name_en", &["1301", "7203"]));
        let candidates: Vec<_> = data.candidate_tickers().into_iter().collect();
        assert_eq!(candidates, vec!["1301", "7203"]);
    }

    #[test]
    fn candidates_fall_back_to_plottable_tables() {
        let data = DataSet::new().with_table(table(DataKind::Indicator, "market", &["9999", "1301"]));
        let candidates: Vec<_> = data.candidate_tickers().into_iter().collect();
        assert_eq!(candidates, vec!["1301", "9999"]);
        assert!(DataSet::new().candidate_tickers().is_empty());
    }
}

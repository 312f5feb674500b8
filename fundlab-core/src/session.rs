//! One working session over a data root: configuration, the schema cache
//! and the per-kind locks, shared by every store, rebuild and fetch run.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::categories::CategoryIndex;
use crate::config::{ConfigError, EngineConfig};
use crate::consolidate::{ConsolidateError, ConsolidatedTable, Consolidator, RebuildReport};
use crate::dataset::DataSet;
use crate::domain::DataKind;
use crate::fetch::{FetchOptions, FetchSource, FetchTask};
use crate::plot::{PlotData, PlotDataBuilder, PlotError, PlotRequest};
use crate::schema::{ColumnSchema, SchemaError, SchemaRegistry};
use crate::store::{KindLocks, TickerStore};

/// Kinds a plot reads: names and sectors from company data, axis values
/// from the plottable kinds.
pub const PLOT_KINDS: [DataKind; 3] = [DataKind::Company, DataKind::Quarter, DataKind::Indicator];

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Consolidate(#[from] ConsolidateError),
}

#[derive(Debug, Clone)]
pub struct Session {
    config: EngineConfig,
    schemas: Arc<SchemaRegistry>,
    locks: Arc<KindLocks>,
}

impl Session {
    pub fn new(config: EngineConfig) -> Result<Self, SessionError> {
        config.validate()?;
        let schemas = Arc::new(SchemaRegistry::new(&config.root_dir));
        Ok(Self {
            config,
            schemas,
            locks: Arc::new(KindLocks::new()),
        })
    }

    /// Default configuration over `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, SessionError> {
        Self::new(EngineConfig {
            root_dir: root.as_ref().to_path_buf(),
            ..EngineConfig::default()
        })
    }

    pub fn root(&self) -> &Path {
        &self.config.root_dir
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.schemas
    }

    pub fn locks(&self) -> &Arc<KindLocks> {
        &self.locks
    }

    pub fn schema(&self, kind: DataKind) -> Result<Arc<ColumnSchema>, SessionError> {
        Ok(self.schemas.get(kind)?)
    }

    pub fn store(&self, kind: DataKind) -> Result<TickerStore, SessionError> {
        Ok(TickerStore::new(
            self.root(),
            self.schema(kind)?,
            Arc::clone(&self.locks),
        ))
    }

    pub fn consolidator(&self, kind: DataKind) -> Result<Consolidator, SessionError> {
        Ok(Consolidator::new(self.store(kind)?))
    }

    pub fn rebuild(&self, kind: DataKind) -> Result<(ConsolidatedTable, RebuildReport), SessionError> {
        Ok(self.consolidator(kind)?.rebuild()?)
    }

    /// Load the kinds plots and categories read. Other kinds, daily among
    /// them, are left on disk.
    pub fn load_dataset(&self) -> Result<DataSet, SessionError> {
        self.load_kinds(&PLOT_KINDS)
    }

    /// Load each listed kind that has column definitions, from its snapshot
    /// when current.
    pub fn load_kinds(&self, kinds: &[DataKind]) -> Result<DataSet, SessionError> {
        let mut data = DataSet::new();
        for &kind in kinds {
            if !self.schemas.is_defined(kind) {
                continue;
            }
            let table = self.consolidator(kind)?.load()?;
            info!(%kind, tickers = table.len(), rows = table.row_count(), "loaded table");
            data.insert(table);
        }
        Ok(data)
    }

    /// Fetch options for a kind, with the configured thread count.
    pub fn fetch_options(&self, kind: DataKind) -> FetchOptions {
        FetchOptions::new(kind).threads(self.config.fetch_threads)
    }

    pub fn fetch_task(&self, source: Arc<dyn FetchSource>, options: FetchOptions) -> FetchTask {
        FetchTask::new(
            self.root(),
            Arc::clone(&self.schemas),
            Arc::clone(&self.locks),
            source,
            options,
        )
    }

    /// Sector index over the loaded company table; empty without one.
    pub fn categories(&self, data: &DataSet) -> CategoryIndex {
        data.table(DataKind::Company)
            .map(|company| CategoryIndex::from_table(company, &self.config.category_column))
            .unwrap_or_default()
    }

    pub fn plot(&self, data: &DataSet, request: &PlotRequest) -> Result<PlotData, PlotError> {
        PlotDataBuilder::new(data, self.config.plot_options()).build(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnDefinition;
    use crate::domain::ColumnType;
    use crate::store::WriteMode;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn loads_only_defined_kinds() {
        let tmp = TempDir::new().unwrap();
        let session = Session::open(tmp.path()).unwrap();
        assert!(session.load_dataset().unwrap().is_empty());

        let schema = ColumnSchema::new(
            DataKind::Indicator,
            vec![ColumnDefinition::new("pbr", "PBR", ColumnType::Number)],
        )
        .unwrap();
        session.schemas().install(schema).unwrap();

        let raw = match json!({"pbr": 1.2}) {
            serde_json::Value::Object(m) => m,
            _ => unreachable!(),
        };
        session
            .store(DataKind::Indicator)
            .unwrap()
            .write_raw("7203", &[raw], WriteMode::Merge)
            .unwrap();

        let data = session.load_dataset().unwrap();
        assert_eq!(data.kinds().collect::<Vec<_>>(), vec![DataKind::Indicator]);
        assert!(data.table(DataKind::Indicator).unwrap().contains("7203"));
    }

    #[test]
    fn malformed_daily_columns_do_not_block_plot_data() {
        let tmp = TempDir::new().unwrap();
        let session = Session::open(tmp.path()).unwrap();
        let schema = ColumnSchema::new(
            DataKind::Indicator,
            vec![ColumnDefinition::new("pbr", "PBR", ColumnType::Number)],
        )
        .unwrap();
        session.schemas().install(schema).unwrap();
        let raw = match json!({"pbr": 0.9}) {
            serde_json::Value::Object(m) => m,
            _ => unreachable!(),
        };
        session
            .store(DataKind::Indicator)
            .unwrap()
            .write_raw("8306", &[raw], WriteMode::Merge)
            .unwrap();

        let daily = crate::schema::columns_path(tmp.path(), DataKind::Daily);
        std::fs::create_dir_all(daily.parent().unwrap()).unwrap();
        std::fs::write(&daily, "not json").unwrap();

        let data = session.load_dataset().unwrap();
        assert_eq!(data.kinds().collect::<Vec<_>>(), vec![DataKind::Indicator]);

        assert!(matches!(
            session.load_kinds(&DataKind::ALL),
            Err(SessionError::Schema(SchemaError::Malformed { .. }))
        ));
    }

    #[test]
    fn missing_schema_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let session = Session::open(tmp.path()).unwrap();
        assert!(matches!(
            session.store(DataKind::Quarter),
            Err(SessionError::Schema(SchemaError::Missing { .. }))
        ));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig {
            fetch_threads: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(Session::new(config), Err(SessionError::Config(_))));
    }
}

//! FundLab Core: fundamentals storage, consolidation and expression engine.
//!
//! This crate contains:
//! - Column schemas per data kind (company, quarter, indicator, daily)
//! - Per-ticker CSV stores with idempotent merge writes
//! - Consolidation of per-ticker files into Parquet snapshots
//! - The expression language (parse, bind, evaluate) over consolidated tables
//! - Plot data assembly from X/Y/size/filter/category inputs
//! - Cancellable fetch runs against an abstract payload source

pub mod categories;
pub mod config;
pub mod consolidate;
pub mod dataset;
pub mod domain;
pub mod expr;
pub mod fetch;
pub mod plot;
pub mod schema;
pub mod session;
pub mod store;

pub use categories::{CategoryIndex, CategorySelection};
pub use config::{ConfigError, EngineConfig};
pub use consolidate::{ConsolidateError, ConsolidatedTable, Consolidator, RebuildReport};
pub use dataset::DataSet;
pub use domain::{ColumnType, DataKind, Period, RawRecord, TickerRecord, Value};
pub use expr::{ExpressionError, ExpressionResolver, Scalar};
pub use fetch::{FetchError, FetchOptions, FetchSource, FetchSummary, FetchTask, PayloadDirSource};
pub use plot::{PlotData, PlotDataBuilder, PlotError, PlotPoint, PlotRequest};
pub use schema::{ColumnDefinition, ColumnSchema, SchemaError, SchemaRegistry};
pub use session::{Session, SessionError};
pub use store::{StoreError, TickerStore, WriteMode};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything shared with fetch threads or rayon
    /// workers is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<ColumnSchema>();
        require_sync::<ColumnSchema>();
        require_send::<SchemaRegistry>();
        require_sync::<SchemaRegistry>();
        require_send::<TickerStore>();
        require_sync::<TickerStore>();
        require_send::<ConsolidatedTable>();
        require_sync::<ConsolidatedTable>();
        require_send::<DataSet>();
        require_sync::<DataSet>();
        require_send::<Session>();
        require_sync::<Session>();
        require_send::<FetchTask>();
        require_send::<FetchError>();
        require_send::<FetchSummary>();
        require_send::<PlotData>();
        require_sync::<PlotData>();
    }
}

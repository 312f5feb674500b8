//! Consolidated tables: every ticker of one data kind in one place.
//!
//! Layout under `{root}/{kind}/`:
//! - `all.parquet`: long table, one row per (ticker, period)
//! - `all.meta.json`: sidecar with counts, content hash and skipped tickers
//!
//! A snapshot is rebuilt from the per-ticker files after a fetch run, never
//! per ticker. Corrupt per-ticker files are logged and left out.

pub mod consolidator;
pub mod snapshot;
pub mod table;

pub use consolidator::{Consolidator, RebuildReport};
pub use snapshot::SnapshotMeta;
pub use table::ConsolidatedTable;

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::Period;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ConsolidateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("snapshot {}: {reason}", path.display())]
    Snapshot { path: PathBuf, reason: String },

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ticker '{ticker}' has more than one row for period {period}")]
    DuplicatePeriod { ticker: String, period: Period },
}

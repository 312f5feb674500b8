//! Per-ticker record files.
//!
//! Layout: `{root}/{kind}/{ticker}.csv`, header = schema keys in order,
//! rows sorted ascending by period.
//!
//! Features:
//! - Merge by natural period key (replace matching rows, append new ones)
//! - Overwrite mode that discards the stored rows first
//! - Atomic writes (write to .tmp, rename into place)
//! - Byte-identical output when re-writing identical data
//! - Single writer per ticker; writes share the kind's section with each
//!   other and exclude a running rebuild

pub mod csv_codec;
pub mod locks;
pub mod ticker_store;

pub use locks::KindLocks;
pub use ticker_store::{TickerStore, WriteMode, WriteOutcome};

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::{DataKind, Period, RecordError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no stored {kind} data for ticker '{ticker}'")]
    NotFound { kind: DataKind, ticker: String },

    #[error("'{0}' cannot be used as a ticker file name")]
    InvalidTicker(String),

    #[error("invalid record for ticker '{ticker}': {source}")]
    InvalidRecord {
        ticker: String,
        #[source]
        source: RecordError,
    },

    #[error("ticker '{ticker}' has more than one row for period {period}")]
    DuplicatePeriod { ticker: String, period: Period },

    #[error("corrupt record file {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

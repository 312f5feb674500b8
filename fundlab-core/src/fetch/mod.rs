//! Fetch orchestration: pull per-ticker payloads from a source, persist them
//! through the ticker store, then rebuild the kind's snapshot.
//!
//! The network client lives behind [`FetchSource`]. This module only decides
//! which tickers to pull, writes what comes back, and honours Stop.

pub mod payload;
pub mod source;
pub mod task;

pub use payload::PayloadDirSource;
pub use source::{FetchSource, FetchWindow};
pub use task::{
    CancelToken, FetchHandle, FetchOptions, FetchProgress, FetchSummary, FetchTask, LogProgress,
    TickerOutcome,
};

use std::path::PathBuf;
use thiserror::Error;

use crate::consolidate::ConsolidateError;
use crate::domain::DataKind;
use crate::schema::SchemaError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{source_name}: {message}")]
    Source { source_name: String, message: String },

    #[error("{source_name} has no {kind} data")]
    Unavailable { source_name: String, kind: DataKind },

    #[error("malformed payload {}: {reason}", path.display())]
    Payload { path: PathBuf, reason: String },

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Consolidate(#[from] ConsolidateError),

    #[error("failed to build fetch thread pool: {0}")]
    Pool(String),

    #[error("failed to start fetch thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("fetch thread panicked")]
    Panicked,
}

//! Rebuilds a kind's snapshot from its per-ticker files.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::snapshot::{self, SnapshotMeta};
use super::{ConsolidateError, ConsolidatedTable};
use crate::domain::{DataKind, TickerRecord};
use crate::store::{StoreError, TickerStore};

/// Outcome of one rebuild.
#[derive(Debug, Clone)]
pub struct RebuildReport {
    pub kind: DataKind,
    /// Tickers that made it into the snapshot, sorted.
    pub loaded: Vec<String>,
    /// Tickers left out, with the reason.
    pub skipped: Vec<(String, String)>,
    pub rows: usize,
    pub meta: SnapshotMeta,
}

/// Rebuilds and loads the consolidated table of one kind.
#[derive(Debug, Clone)]
pub struct Consolidator {
    store: TickerStore,
}

impl Consolidator {
    pub fn new(store: TickerStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &TickerStore {
        &self.store
    }

    pub fn kind(&self) -> DataKind {
        self.store.kind()
    }

    /// Read every per-ticker file, persist the snapshot, clear the pending
    /// marker.
    ///
    /// Holds the kind's exclusive section, so no write of this kind runs
    /// meanwhile. Files that fail to read are logged and skipped.
    pub fn rebuild(&self) -> Result<(ConsolidatedTable, RebuildReport), ConsolidateError> {
        let kind = self.kind();
        let _section = self.store.locks().exclusive(kind);

        let tickers = self.store.tickers()?;
        info!(%kind, tickers = tickers.len(), "rebuilding snapshot");

        let results: Vec<(String, Result<Vec<TickerRecord>, StoreError>)> = tickers
            .par_iter()
            .map(|ticker| (ticker.clone(), self.store.read(ticker)))
            .collect();

        let mut table = ConsolidatedTable::new(Arc::clone(self.store.schema()));
        let mut loaded = Vec::with_capacity(results.len());
        let mut skipped = Vec::new();
        for (ticker, result) in results {
            match result {
                Ok(records) if records.is_empty() => {
                    debug!(%kind, ticker, "no rows, skipping");
                    skipped.push((ticker, "no rows".to_string()));
                }
                Ok(records) => {
                    table.insert(ticker.clone(), records)?;
                    loaded.push(ticker);
                }
                Err(e) => {
                    warn!(%kind, ticker, error = %e, "skipping unreadable ticker file");
                    skipped.push((ticker, e.to_string()));
                }
            }
        }

        let skipped_tickers: Vec<String> = skipped.iter().map(|(t, _)| t.clone()).collect();
        let meta = snapshot::write(self.store.dir(), &table, &skipped_tickers)?;
        self.store.clear_pending()?;

        info!(
            %kind,
            loaded = loaded.len(),
            skipped = skipped.len(),
            rows = meta.rows,
            "snapshot rebuilt"
        );
        let report = RebuildReport {
            kind,
            loaded,
            skipped,
            rows: meta.rows,
            meta,
        };
        Ok((table, report))
    }

    /// The consolidated table: from the snapshot when it is present and
    /// current, otherwise rebuilt. An unreadable snapshot is rebuilt too.
    pub fn load(&self) -> Result<ConsolidatedTable, ConsolidateError> {
        let kind = self.kind();
        if self.store.is_pending() {
            debug!(%kind, "rebuild pending");
        } else {
            match snapshot::read(self.store.dir(), self.store.schema()) {
                Ok(Some(table)) => {
                    debug!(%kind, tickers = table.len(), "loaded snapshot");
                    return Ok(table);
                }
                Ok(None) => debug!(%kind, "no snapshot yet"),
                Err(e) => warn!(%kind, error = %e, "unreadable snapshot, rebuilding"),
            }
        }
        self.rebuild().map(|(table, _)| table)
    }

    /// Metadata of the current snapshot, if any.
    pub fn snapshot_meta(&self) -> Option<SnapshotMeta> {
        snapshot::read_meta(self.store.dir())
    }
}

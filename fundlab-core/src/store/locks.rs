//! Exclusion between writers of one ticker, and between writes and rebuilds
//! of one kind.
//!
//! - Every `TickerStore::write` holds the kind's section in shared mode plus
//!   the ticker's own mutex.
//! - `Consolidator::rebuild` holds the kind's section in exclusive mode, so it
//!   never sees a half-finished fetch batch of that kind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::DataKind;

#[derive(Debug)]
pub struct KindLocks {
    sections: HashMap<DataKind, RwLock<()>>,
    tickers: Mutex<HashMap<(DataKind, String), Arc<Mutex<()>>>>,
}

impl KindLocks {
    pub fn new() -> Self {
        Self {
            sections: DataKind::ALL
                .iter()
                .map(|kind| (*kind, RwLock::new(())))
                .collect(),
            tickers: Mutex::new(HashMap::new()),
        }
    }

    fn section(&self, kind: DataKind) -> &RwLock<()> {
        // Every kind is registered in `new`.
        &self.sections[&kind]
    }

    /// Shared section held by writers.
    pub fn shared(&self, kind: DataKind) -> RwLockReadGuard<'_, ()> {
        self.section(kind)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive section held by a rebuild.
    pub fn exclusive(&self, kind: DataKind) -> RwLockWriteGuard<'_, ()> {
        self.section(kind)
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The mutex serializing writes to one ticker's file.
    pub fn ticker(&self, kind: DataKind, ticker: &str) -> Arc<Mutex<()>> {
        let mut tickers = self.tickers.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            tickers
                .entry((kind, ticker.to_string()))
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}

impl Default for KindLocks {
    fn default() -> Self {
        Self::new()
    }
}

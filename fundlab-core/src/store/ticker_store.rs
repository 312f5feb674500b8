//! One data kind's per-ticker record files.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};

use tracing::debug;

use super::csv_codec;
use super::locks::KindLocks;
use super::StoreError;
use crate::domain::{DataKind, RawRecord, RecordError, TickerRecord};
use crate::schema::ColumnSchema;

/// Marker file: a per-ticker file changed after the last snapshot was built.
pub const PENDING_FILE: &str = "rebuild.pending";

/// How `write` treats rows already stored for the ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Replace rows with matching periods, append new ones.
    #[default]
    Merge,
    /// Discard the stored rows first.
    Overwrite,
}

/// What one `write` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOutcome {
    /// Rows in the file after the write.
    pub rows: usize,
    /// Incoming rows whose period was not stored yet.
    pub inserted: usize,
    /// Incoming rows that replaced a stored row.
    pub replaced: usize,
    /// False when the file already held exactly these bytes.
    pub changed: bool,
}

/// Reads and writes `{root}/{kind}/{ticker}.csv`.
#[derive(Debug, Clone)]
pub struct TickerStore {
    kind: DataKind,
    dir: PathBuf,
    schema: Arc<ColumnSchema>,
    locks: Arc<KindLocks>,
}

impl TickerStore {
    pub fn new(root: &Path, schema: Arc<ColumnSchema>, locks: Arc<KindLocks>) -> Self {
        let kind = schema.kind();
        Self {
            kind,
            dir: root.join(kind.as_str()),
            schema,
            locks,
        }
    }

    pub fn kind(&self) -> DataKind {
        self.kind
    }

    /// Directory of this kind: `{root}/{kind}/`
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn schema(&self) -> &Arc<ColumnSchema> {
        &self.schema
    }

    pub fn locks(&self) -> &Arc<KindLocks> {
        &self.locks
    }

    fn ticker_path(&self, ticker: &str) -> PathBuf {
        self.dir.join(format!("{ticker}.csv"))
    }

    pub fn exists(&self, ticker: &str) -> bool {
        validate_ticker(ticker).is_ok() && self.ticker_path(ticker).is_file()
    }

    /// Stored tickers, sorted. A kind with no directory yet has none.
    pub fn tickers(&self) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.dir, e)),
        };

        let mut tickers = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| io_error(&self.dir, e))?.path();
            // Skip columns.json, snapshots, markers and leftover .tmp files
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                tickers.push(stem.to_string());
            }
        }
        tickers.sort();
        Ok(tickers)
    }

    /// Decode raw payload rows, then `write` them.
    pub fn write_raw(
        &self,
        ticker: &str,
        raw: &[RawRecord],
        mode: WriteMode,
    ) -> Result<WriteOutcome, StoreError> {
        let records = raw
            .iter()
            .map(|r| TickerRecord::from_raw(&self.schema, r))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| StoreError::InvalidRecord {
                ticker: ticker.to_string(),
                source,
            })?;
        self.write(ticker, records, mode)
    }

    /// Merge records into the ticker's file.
    ///
    /// The batch is checked before anything is touched: a row with the wrong
    /// width or two rows with the same period reject the whole write. The
    /// file is replaced by rename, so readers see either the old or the new
    /// content. An empty batch is a no-op.
    pub fn write(
        &self,
        ticker: &str,
        mut records: Vec<TickerRecord>,
        mode: WriteMode,
    ) -> Result<WriteOutcome, StoreError> {
        validate_ticker(ticker)?;
        if records.is_empty() {
            return Ok(WriteOutcome::default());
        }

        for record in &records {
            if record.values.len() != self.schema.len() {
                return Err(StoreError::InvalidRecord {
                    ticker: ticker.to_string(),
                    source: RecordError::Width {
                        expected: self.schema.len(),
                        actual: record.values.len(),
                    },
                });
            }
        }
        records.sort_by_key(|r| r.period);
        if let Some(pair) = records.windows(2).find(|w| w[0].period == w[1].period) {
            return Err(StoreError::DuplicatePeriod {
                ticker: ticker.to_string(),
                period: pair[0].period,
            });
        }

        let _section = self.locks.shared(self.kind);
        let ticker_lock = self.locks.ticker(self.kind, ticker);
        let _guard = ticker_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let path = self.ticker_path(ticker);
        let current = match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(io_error(&path, e)),
        };

        let mut merged = BTreeMap::new();
        if let (WriteMode::Merge, Some(bytes)) = (mode, &current) {
            for record in csv_codec::decode(&self.schema, bytes, &path)? {
                merged.insert(record.period, record);
            }
        }

        let mut outcome = WriteOutcome::default();
        for record in records {
            match merged.insert(record.period, record) {
                Some(_) => outcome.replaced += 1,
                None => outcome.inserted += 1,
            }
        }
        outcome.rows = merged.len();

        let merged: Vec<TickerRecord> = merged.into_values().collect();
        let bytes = csv_codec::encode(&self.schema, &merged, &path)?;
        if current.as_deref() == Some(bytes.as_slice()) {
            debug!(kind = %self.kind, ticker, "unchanged, skipping write");
            return Ok(outcome);
        }

        fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        // Marker first: a renamed file is never newer than its marker.
        self.mark_pending()?;

        let tmp_path = path.with_extension("csv.tmp");
        fs::write(&tmp_path, &bytes).map_err(|e| io_error(&tmp_path, e))?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            io_error(&path, e)
        })?;

        outcome.changed = true;
        debug!(
            kind = %self.kind,
            ticker,
            rows = outcome.rows,
            inserted = outcome.inserted,
            replaced = outcome.replaced,
            "wrote ticker file"
        );
        Ok(outcome)
    }

    /// All stored records of a ticker, sorted by period.
    pub fn read(&self, ticker: &str) -> Result<Vec<TickerRecord>, StoreError> {
        validate_ticker(ticker)?;
        let path = self.ticker_path(ticker);
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound {
                    kind: self.kind,
                    ticker: ticker.to_string(),
                }
            } else {
                io_error(&path, e)
            }
        })?;
        csv_codec::decode(&self.schema, &bytes, &path)
    }

    fn pending_path(&self) -> PathBuf {
        self.dir.join(PENDING_FILE)
    }

    /// True when a per-ticker file changed since the last rebuild.
    pub fn is_pending(&self) -> bool {
        self.pending_path().exists()
    }

    pub fn mark_pending(&self) -> Result<(), StoreError> {
        let path = self.pending_path();
        fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        fs::write(&path, b"").map_err(|e| io_error(&path, e))
    }

    pub fn clear_pending(&self) -> Result<(), StoreError> {
        let path = self.pending_path();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }
}

/// Tickers become file names: no separators, no leading dot.
fn validate_ticker(ticker: &str) -> Result<(), StoreError> {
    let valid = !ticker.is_empty()
        && !ticker.starts_with('.')
        && ticker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidTicker(ticker.to_string()))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

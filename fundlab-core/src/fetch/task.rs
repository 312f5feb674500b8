//! Cancellable fetch runs.
//!
//! A run resolves its target tickers, pulls each from the source on a
//! private rayon pool, writes it through the ticker store and finally
//! rebuilds the kind. Stop is cooperative: the flag is checked before each
//! ticker, tickers already written stay written, and the rebuild still runs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::source::{FetchSource, FetchWindow};
use super::FetchError;
use crate::consolidate::{Consolidator, RebuildReport};
use crate::domain::{DataKind, RawRecord};
use crate::schema::{ColumnSchema, SchemaRegistry};
use crate::store::{KindLocks, TickerStore, WriteMode};

/// Shared Stop flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// What to fetch and how to write it.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    pub kind: DataKind,
    /// Requested tickers; empty means every ticker the source serves.
    pub tickers: Vec<String>,
    /// Re-fetch stored tickers and replace their files instead of merging.
    pub overwrite: bool,
    pub threads: usize,
    pub window: FetchWindow,
}

impl FetchOptions {
    pub fn new(kind: DataKind) -> Self {
        Self {
            kind,
            tickers: Vec::new(),
            overwrite: false,
            threads: 1,
            window: FetchWindow::all(),
        }
    }

    pub fn tickers<I, S>(mut self, tickers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tickers = tickers.into_iter().map(Into::into).collect();
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn window(mut self, window: FetchWindow) -> Self {
        self.window = window;
        self
    }
}

/// Result of one attempted ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerOutcome {
    Written { rows: usize, changed: bool },
    /// The source returned no records.
    Empty,
}

/// Progress callbacks. `on_ticker` may be called from pool threads.
pub trait FetchProgress: Send + Sync {
    fn on_start(&self, kind: DataKind, total: usize);

    /// `done` counts attempted tickers including this one.
    fn on_ticker(
        &self,
        ticker: &str,
        done: usize,
        total: usize,
        result: &Result<TickerOutcome, FetchError>,
    );

    fn on_finish(&self, summary: &FetchSummary);
}

/// Reports progress through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl FetchProgress for LogProgress {
    fn on_start(&self, kind: DataKind, total: usize) {
        info!(%kind, total, "fetch started");
    }

    fn on_ticker(
        &self,
        ticker: &str,
        done: usize,
        total: usize,
        result: &Result<TickerOutcome, FetchError>,
    ) {
        match result {
            Ok(TickerOutcome::Written { rows, changed }) => {
                debug!(ticker, done, total, rows, changed, "ticker written")
            }
            Ok(TickerOutcome::Empty) => debug!(ticker, done, total, "no records"),
            Err(e) => warn!(ticker, done, total, error = %e, "ticker failed"),
        }
    }

    fn on_finish(&self, summary: &FetchSummary) {
        info!(
            kind = %summary.kind,
            total = summary.total,
            written = summary.written,
            skipped = summary.skipped,
            failed = summary.failed.len(),
            stopped = summary.stopped,
            "fetch finished"
        );
    }
}

/// Outcome of a fetch run.
#[derive(Debug, Clone)]
pub struct FetchSummary {
    pub kind: DataKind,
    /// Requested tickers.
    pub total: usize,
    pub written: usize,
    /// Already stored (merge runs) or returned no records.
    pub skipped: usize,
    pub failed: Vec<(String, String)>,
    /// Tickers never attempted because the run was stopped.
    pub not_attempted: usize,
    pub stopped: bool,
    /// `None` when the kind has no schema, so nothing could be rebuilt.
    pub rebuild: Option<RebuildReport>,
}

impl FetchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty() && !self.stopped
    }
}

/// One fetch run over a single kind.
pub struct FetchTask {
    root: PathBuf,
    schemas: Arc<SchemaRegistry>,
    locks: Arc<KindLocks>,
    source: Arc<dyn FetchSource>,
    options: FetchOptions,
    cancel: CancelToken,
}

impl std::fmt::Debug for FetchTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchTask")
            .field("root", &self.root)
            .field("source", &self.source.name())
            .field("options", &self.options)
            .finish()
    }
}

impl FetchTask {
    pub fn new(
        root: impl Into<PathBuf>,
        schemas: Arc<SchemaRegistry>,
        locks: Arc<KindLocks>,
        source: Arc<dyn FetchSource>,
        options: FetchOptions,
    ) -> Self {
        Self {
            root: root.into(),
            schemas,
            locks,
            source,
            options,
            cancel: CancelToken::new(),
        }
    }

    /// Token that stops this run.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Run to completion (or Stop) on the calling thread.
    pub fn run(&self, progress: &dyn FetchProgress) -> Result<FetchSummary, FetchError> {
        let kind = self.options.kind;
        let requested = if self.options.tickers.is_empty() {
            self.source.tickers(kind)?
        } else {
            self.options.tickers.clone()
        };
        let total = requested.len();
        progress.on_start(kind, total);

        let mut prefetched = HashMap::new();
        let mut sample_failures = Vec::new();
        let schema = self.resolve_schema(&requested, &mut prefetched, &mut sample_failures)?;

        let mut summary = FetchSummary {
            kind,
            total,
            written: 0,
            skipped: 0,
            failed: Vec::new(),
            not_attempted: 0,
            stopped: false,
            rebuild: None,
        };

        let done = AtomicUsize::new(0);
        for (ticker, err) in sample_failures {
            let done = done.fetch_add(1, Ordering::Relaxed) + 1;
            let message = err.to_string();
            progress.on_ticker(&ticker, done, total, &Err(err));
            summary.failed.push((ticker, message));
        }

        let Some(schema) = schema else {
            let failed = summary.failed.len();
            summary.stopped = self.cancel.is_cancelled();
            if summary.stopped {
                summary.skipped = prefetched.len();
                summary.not_attempted = total.saturating_sub(prefetched.len() + failed);
                info!(%kind, "fetch stopped before any records arrived");
            } else {
                info!(%kind, failed, "source returned no records, nothing to store");
                summary.skipped = total.saturating_sub(failed);
            }
            progress.on_finish(&summary);
            return Ok(summary);
        };
        let store = TickerStore::new(&self.root, schema, Arc::clone(&self.locks));

        let requested: Vec<String> = requested
            .into_iter()
            .filter(|t| !summary.failed.iter().any(|(failed, _)| failed == t))
            .collect();
        let targets: Vec<String> = if self.options.overwrite {
            requested
        } else {
            let (stored, fresh): (Vec<_>, Vec<_>) =
                requested.into_iter().partition(|t| store.exists(t));
            debug!(%kind, stored = stored.len(), "skipping stored tickers");
            summary.skipped += stored.len();
            fresh
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.threads.max(1))
            .thread_name(|i| format!("fundlab-fetch-{i}"))
            .build()
            .map_err(|e| FetchError::Pool(e.to_string()))?;

        let results: Vec<(String, Option<Result<TickerOutcome, FetchError>>)> = pool.install(|| {
            targets
                .par_iter()
                .map(|ticker| {
                    if self.cancel.is_cancelled() {
                        return (ticker.clone(), None);
                    }
                    let result = self.fetch_one(&store, ticker, prefetched.get(ticker));
                    let done = done.fetch_add(1, Ordering::Relaxed) + 1;
                    progress.on_ticker(ticker, done, total, &result);
                    (ticker.clone(), Some(result))
                })
                .collect()
        });

        for (ticker, result) in results {
            match result {
                None => summary.not_attempted += 1,
                Some(Ok(TickerOutcome::Written { .. })) => summary.written += 1,
                Some(Ok(TickerOutcome::Empty)) => summary.skipped += 1,
                Some(Err(e)) => summary.failed.push((ticker, e.to_string())),
            }
        }
        summary.stopped = self.cancel.is_cancelled();
        if summary.stopped {
            info!(%kind, not_attempted = summary.not_attempted, "fetch stopped");
        }

        let (_, report) = Consolidator::new(store).rebuild()?;
        summary.rebuild = Some(report);

        progress.on_finish(&summary);
        Ok(summary)
    }

    /// Run on a named background thread.
    pub fn spawn(self, progress: Box<dyn FetchProgress>) -> Result<FetchHandle, FetchError> {
        let cancel = self.cancel.clone();
        let thread = thread::Builder::new()
            .name(format!("fundlab-fetch-{}", self.options.kind))
            .spawn(move || self.run(progress.as_ref()))
            .map_err(FetchError::Spawn)?;
        Ok(FetchHandle { cancel, thread })
    }

    /// The schema the run writes with.
    ///
    /// A new one is derived from the source's column description when the
    /// kind has none yet or the run overwrites. Dtype inference needs sample
    /// records, so tickers are pulled in order until one returns data; those
    /// payloads are kept for the main loop. A ticker whose fetch fails here
    /// goes to `failures` and is not fetched again. `None` when no ticker has
    /// data.
    fn resolve_schema(
        &self,
        requested: &[String],
        prefetched: &mut HashMap<String, Vec<RawRecord>>,
        failures: &mut Vec<(String, FetchError)>,
    ) -> Result<Option<Arc<ColumnSchema>>, FetchError> {
        let kind = self.options.kind;
        if !self.options.overwrite && self.schemas.is_defined(kind) {
            return Ok(Some(self.schemas.get(kind)?));
        }

        let description = self.source.columns(kind)?;
        for ticker in requested {
            if self.cancel.is_cancelled() {
                break;
            }
            let records = match self.source.fetch(kind, ticker, &self.options.window) {
                Ok(records) => records,
                Err(e) => {
                    warn!(%kind, ticker = %ticker, error = %e, "sample fetch failed");
                    failures.push((ticker.clone(), e));
                    continue;
                }
            };
            let found = !records.is_empty();
            prefetched.insert(ticker.clone(), records);
            if found {
                let samples: Vec<&RawRecord> = prefetched[ticker].iter().collect();
                let schema = ColumnSchema::describe(kind, &description, &samples)?;
                info!(%kind, columns = schema.len(), "installing column definitions");
                return Ok(Some(self.schemas.install(schema)?));
            }
        }

        if self.schemas.is_defined(kind) {
            return Ok(Some(self.schemas.get(kind)?));
        }
        Ok(None)
    }

    fn fetch_one(
        &self,
        store: &TickerStore,
        ticker: &str,
        prefetched: Option<&Vec<RawRecord>>,
    ) -> Result<TickerOutcome, FetchError> {
        let kind = self.options.kind;
        let mut records = match prefetched {
            Some(records) => records.clone(),
            None => self.source.fetch(kind, ticker, &self.options.window)?,
        };
        if records.is_empty() {
            return Ok(TickerOutcome::Empty);
        }
        // Company and indicator data hold one row per ticker; keep the newest.
        if !kind.is_periodic() && records.len() > 1 {
            records.drain(..records.len() - 1);
        }

        let mode = if self.options.overwrite {
            WriteMode::Overwrite
        } else {
            WriteMode::Merge
        };
        let outcome = store.write_raw(ticker, &records, mode)?;
        Ok(TickerOutcome::Written {
            rows: outcome.rows,
            changed: outcome.changed,
        })
    }
}

/// A run on its own thread.
#[derive(Debug)]
pub struct FetchHandle {
    cancel: CancelToken,
    thread: JoinHandle<Result<FetchSummary, FetchError>>,
}

impl FetchHandle {
    /// Ask the run to stop before its next ticker.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the run, including its rebuild.
    pub fn join(self) -> Result<FetchSummary, FetchError> {
        self.thread.join().map_err(|_| FetchError::Panicked)?
    }
}

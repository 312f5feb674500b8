//! A [`FetchSource`] over saved API responses.
//!
//! `{dir}/{kind}.json` holds one response body per kind:
//!
//! ```json
//! {
//!   "column_description": { "net_sales": { "name_jp": "売上高", "unit": "百万円" } },
//!   "7203": [ { "fiscal_year": 2021, "fiscal_quarter": 4, "net_sales": 100 } ]
//! }
//! ```
//!
//! A body with a `message` key is an API error response.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::{Map, Value as Json};
use tracing::debug;

use super::source::{FetchSource, FetchWindow};
use super::FetchError;
use crate::domain::{DataKind, RawRecord};

const COLUMN_DESCRIPTION: &str = "column_description";
const ERROR_MESSAGE: &str = "message";

#[derive(Debug)]
struct Payload {
    columns: Map<String, Json>,
    records: BTreeMap<String, Vec<RawRecord>>,
}

/// Reads payload files from a directory, parsing each kind once.
#[derive(Debug)]
pub struct PayloadDirSource {
    name: String,
    dir: PathBuf,
    cache: RwLock<HashMap<DataKind, Arc<Payload>>>,
}

impl PayloadDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            name: format!("payloads:{}", dir.display()),
            dir,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the payload file for a kind.
    pub fn payload_path(&self, kind: DataKind) -> PathBuf {
        self.dir.join(format!("{kind}.json"))
    }

    fn payload(&self, kind: DataKind) -> Result<Arc<Payload>, FetchError> {
        if let Some(p) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
        {
            return Ok(Arc::clone(p));
        }

        let path = self.payload_path(kind);
        if !path.exists() {
            return Err(FetchError::Unavailable {
                source_name: self.name.clone(),
                kind,
            });
        }
        let bytes = fs::read(&path).map_err(|source| FetchError::Io {
            path: path.clone(),
            source,
        })?;
        let payload = Arc::new(parse_payload(&self.name, &path, &bytes)?);
        debug!(%kind, tickers = payload.records.len(), path = %path.display(), "loaded payload");

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(cache.entry(kind).or_insert(payload)))
    }
}

fn parse_payload(source_name: &str, path: &Path, bytes: &[u8]) -> Result<Payload, FetchError> {
    let malformed = |reason: String| FetchError::Payload {
        path: path.to_path_buf(),
        reason,
    };

    let body: Json = serde_json::from_slice(bytes).map_err(|e| malformed(e.to_string()))?;
    let Json::Object(body) = body else {
        return Err(malformed("expected a JSON object".into()));
    };

    if let Some(message) = body.get(ERROR_MESSAGE) {
        let message = message
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| message.to_string());
        return Err(FetchError::Source {
            source_name: source_name.to_string(),
            message,
        });
    }

    let mut columns = Map::new();
    let mut records = BTreeMap::new();
    for (key, value) in body {
        if key == COLUMN_DESCRIPTION {
            match value {
                Json::Object(map) => columns = map,
                _ => return Err(malformed(format!("'{COLUMN_DESCRIPTION}' must be an object"))),
            }
            continue;
        }
        let rows = match value {
            Json::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Json::Object(map) => Ok(map),
                    other => Err(malformed(format!(
                        "ticker '{key}': expected record objects, found {other}"
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Json::Object(map) => vec![map],
            Json::Null => Vec::new(),
            other => {
                return Err(malformed(format!(
                    "ticker '{key}': expected a list of records, found {other}"
                )))
            }
        };
        records.insert(key, rows);
    }

    Ok(Payload { columns, records })
}

impl FetchSource for PayloadDirSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self, kind: DataKind) -> Result<Map<String, Json>, FetchError> {
        Ok(self.payload(kind)?.columns.clone())
    }

    fn tickers(&self, kind: DataKind) -> Result<Vec<String>, FetchError> {
        Ok(self.payload(kind)?.records.keys().cloned().collect())
    }

    fn fetch(
        &self,
        kind: DataKind,
        ticker: &str,
        window: &FetchWindow,
    ) -> Result<Vec<RawRecord>, FetchError> {
        let payload = self.payload(kind)?;
        Ok(payload
            .records
            .get(ticker)
            .map(|rows| {
                rows.iter()
                    .filter(|r| window.contains(kind, r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source_with(kind: DataKind, body: &str) -> (TempDir, PayloadDirSource) {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(format!("{kind}.json")), body).unwrap();
        let source = PayloadDirSource::new(tmp.path());
        (tmp, source)
    }

    #[test]
    fn reads_columns_tickers_and_records() {
        let (_tmp, source) = source_with(
            DataKind::Quarter,
            r#"{
                "column_description": {"net_sales": {"name_jp": "売上高", "unit": "百万円"}},
                "7203": [
                    {"fiscal_year": 2020, "fiscal_quarter": 4, "net_sales": 90},
                    {"fiscal_year": 2021, "fiscal_quarter": 4, "net_sales": 100}
                ],
                "1301": []
            }"#,
        );

        let columns = source.columns(DataKind::Quarter).unwrap();
        assert!(columns.contains_key("net_sales"));
        assert_eq!(source.tickers(DataKind::Quarter).unwrap(), vec!["1301", "7203"]);

        let all = source
            .fetch(DataKind::Quarter, "7203", &FetchWindow::all())
            .unwrap();
        assert_eq!(all.len(), 2);
        let windowed = source
            .fetch(DataKind::Quarter, "7203", &FetchWindow::years(2021, 2021))
            .unwrap();
        assert_eq!(windowed.len(), 1);
        assert!(source
            .fetch(DataKind::Quarter, "9999", &FetchWindow::all())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn error_body_is_a_source_error() {
        let (_tmp, source) = source_with(DataKind::Indicator, r#"{"message": "Limit Exceeded"}"#);
        match source.tickers(DataKind::Indicator) {
            Err(FetchError::Source { message, .. }) => assert_eq!(message, "Limit Exceeded"),
            other => panic!("expected source error, got {other:?}"),
        }
    }

    #[test]
    fn missing_and_malformed_payloads() {
        let (_tmp, source) = source_with(DataKind::Company, r#"{"7203": 5}"#);
        assert!(matches!(
            source.tickers(DataKind::Company),
            Err(FetchError::Payload { .. })
        ));
        assert!(matches!(
            source.tickers(DataKind::Quarter),
            Err(FetchError::Unavailable { .. })
        ));
    }
}

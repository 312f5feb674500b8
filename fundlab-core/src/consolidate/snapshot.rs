//! Parquet snapshot of a consolidated table, with a JSON metadata sidecar.

use std::collections::BTreeMap;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::{ConsolidateError, ConsolidatedTable};
use crate::domain::{ColumnType, DataKind, TickerRecord, Value};
use crate::schema::{ColumnSchema, TICKER_COLUMN};

pub const SNAPSHOT_FILE: &str = "all.parquet";
pub const META_FILE: &str = "all.meta.json";

/// Sidecar describing the snapshot next to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub kind: DataKind,
    pub tickers: usize,
    pub rows: usize,
    /// blake3 of the Parquet file bytes.
    pub data_hash: String,
    pub built_at: NaiveDateTime,
    #[serde(default)]
    pub skipped: Vec<String>,
}

pub fn snapshot_path(dir: &Path) -> PathBuf {
    dir.join(SNAPSHOT_FILE)
}

pub fn meta_path(dir: &Path) -> PathBuf {
    dir.join(META_FILE)
}

/// Write `all.parquet` and `all.meta.json` into `dir`, both atomically.
pub fn write(
    dir: &Path,
    table: &ConsolidatedTable,
    skipped: &[String],
) -> Result<SnapshotMeta, ConsolidateError> {
    let path = snapshot_path(dir);
    let snapshot_err = |reason: String| ConsolidateError::Snapshot {
        path: path.clone(),
        reason,
    };

    let mut df = table_to_dataframe(table).map_err(|e| snapshot_err(format!("dataframe: {e}")))?;
    let mut bytes = Vec::new();
    ParquetWriter::new(&mut bytes)
        .finish(&mut df)
        .map_err(|e| snapshot_err(format!("write parquet: {e}")))?;

    let meta = SnapshotMeta {
        kind: table.kind(),
        tickers: table.len(),
        rows: table.row_count(),
        data_hash: blake3::hash(&bytes).to_hex().to_string(),
        built_at: chrono::Local::now().naive_local(),
        skipped: skipped.to_vec(),
    };
    let meta_json =
        serde_json::to_vec_pretty(&meta).map_err(|e| snapshot_err(format!("meta: {e}")))?;

    fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
    write_atomic(&path, &bytes)?;
    write_atomic(&meta_path(dir), &meta_json)?;
    Ok(meta)
}

/// Read the snapshot in `dir`. `Ok(None)` when there is none.
///
/// The file must match the schema's columns and dtypes, and the hash in the
/// sidecar when one exists.
pub fn read(
    dir: &Path,
    schema: &Arc<ColumnSchema>,
) -> Result<Option<ConsolidatedTable>, ConsolidateError> {
    let path = snapshot_path(dir);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(&path, e)),
    };
    let snapshot_err = |reason: String| ConsolidateError::Snapshot {
        path: path.clone(),
        reason,
    };

    if let Some(meta) = read_meta(dir) {
        let hash = blake3::hash(&bytes).to_hex().to_string();
        if meta.data_hash != hash {
            return Err(snapshot_err("content hash does not match metadata".into()));
        }
        if meta.kind != schema.kind() {
            return Err(snapshot_err(format!("built for {} data", meta.kind)));
        }
    }

    let df = ParquetReader::new(Cursor::new(bytes))
        .finish()
        .map_err(|e| snapshot_err(format!("read: {e}")))?;
    dataframe_to_table(&df, schema)
        .map(Some)
        .map_err(snapshot_err)
}

/// The sidecar, if present and parseable.
pub fn read_meta(dir: &Path) -> Option<SnapshotMeta> {
    let content = fs::read_to_string(meta_path(dir)).ok()?;
    serde_json::from_str(&content).ok()
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ConsolidateError> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, bytes).map_err(|e| io_error(&tmp_path, e))?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        io_error(path, e)
    })
}

fn io_error(path: &Path, source: std::io::Error) -> ConsolidateError {
    ConsolidateError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn epoch() -> NaiveDate {
    DateTime::<Utc>::UNIX_EPOCH.date_naive()
}

// ── DataFrame conversion ────────────────────────────────────────────

fn table_to_dataframe(table: &ConsolidatedTable) -> PolarsResult<DataFrame> {
    let schema = table.schema();
    let rows: Vec<(&str, &TickerRecord)> = table
        .iter()
        .flat_map(|(ticker, records)| records.iter().map(move |r| (ticker, r)))
        .collect();

    let mut columns = Vec::with_capacity(schema.len() + 1);
    let tickers: Vec<&str> = rows.iter().map(|(t, _)| *t).collect();
    columns.push(Column::new(TICKER_COLUMN.into(), tickers));

    for (i, col) in schema.columns().iter().enumerate() {
        let name: PlSmallStr = col.key.as_str().into();
        let column = match col.dtype {
            ColumnType::Number => {
                let values: Vec<Option<f64>> =
                    rows.iter().map(|(_, r)| r.value(i).as_number()).collect();
                Column::new(name, values)
            }
            ColumnType::Date => {
                let days: Vec<Option<i32>> = rows
                    .iter()
                    .map(|(_, r)| {
                        r.value(i)
                            .as_date()
                            .map(|d| (d - epoch()).num_days() as i32)
                    })
                    .collect();
                Column::new(name, days).cast(&DataType::Date)?
            }
            ColumnType::String | ColumnType::Category => {
                let values: Vec<Option<&str>> =
                    rows.iter().map(|(_, r)| r.value(i).as_text()).collect();
                Column::new(name, values)
            }
        };
        columns.push(column);
    }

    DataFrame::new(columns)
}

fn dataframe_to_table(
    df: &DataFrame,
    schema: &Arc<ColumnSchema>,
) -> Result<ConsolidatedTable, String> {
    let column = |name: &str| {
        df.column(name)
            .map_err(|_| format!("missing column '{name}'"))
    };
    let type_err = |name: &str, e: PolarsError| format!("column '{name}' has wrong type: {e}");

    let tickers = column(TICKER_COLUMN)?;
    let tickers = tickers.str().map_err(|e| type_err(TICKER_COLUMN, e))?;

    enum Source<'a> {
        Number(&'a Float64Chunked),
        Date(&'a DateChunked),
        Text(&'a StringChunked),
    }

    let mut sources = Vec::with_capacity(schema.len());
    for col in schema.columns() {
        let c = column(&col.key)?;
        let source = match col.dtype {
            ColumnType::Number => Source::Number(c.f64().map_err(|e| type_err(&col.key, e))?),
            ColumnType::Date => Source::Date(c.date().map_err(|e| type_err(&col.key, e))?),
            ColumnType::String | ColumnType::Category => {
                Source::Text(c.str().map_err(|e| type_err(&col.key, e))?)
            }
        };
        sources.push(source);
    }

    let mut grouped: BTreeMap<String, Vec<TickerRecord>> = BTreeMap::new();
    for row in 0..df.height() {
        let ticker = tickers
            .get(row)
            .ok_or_else(|| format!("null ticker at row {row}"))?;
        let values = sources
            .iter()
            .map(|source| match source {
                Source::Number(ca) => ca.get(row).map_or(Value::Null, Value::Number),
                Source::Date(ca) => ca.get(row).map_or(Value::Null, |days| {
                    Value::Date(epoch() + chrono::Duration::days(days as i64))
                }),
                Source::Text(ca) => ca
                    .get(row)
                    .map_or(Value::Null, |s| Value::Text(s.to_string())),
            })
            .collect();
        let record = TickerRecord::new(schema, values)
            .map_err(|e| format!("ticker '{ticker}' row {row}: {e}"))?;
        grouped.entry(ticker.to_string()).or_default().push(record);
    }

    let mut table = ConsolidatedTable::new(Arc::clone(schema));
    for (ticker, records) in grouped {
        table.insert(ticker, records).map_err(|e| e.to_string())?;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnDefinition;

    fn daily_schema() -> Arc<ColumnSchema> {
        Arc::new(
            ColumnSchema::new(
                DataKind::Daily,
                vec![
                    ColumnDefinition::new("day", "Day", ColumnType::Date),
                    ColumnDefinition::new("close", "Close", ColumnType::Number),
                    ColumnDefinition::new("market", "Market", ColumnType::Category),
                ],
            )
            .unwrap(),
        )
    }

    fn day(m: u32, d: u32) -> Value {
        Value::Date(NaiveDate::from_ymd_opt(2024, m, d).unwrap())
    }

    fn sample_table(schema: &Arc<ColumnSchema>) -> ConsolidatedTable {
        let mut table = ConsolidatedTable::new(Arc::clone(schema));
        table
            .insert(
                "1301",
                vec![
                    TickerRecord::new(
                        schema,
                        vec![day(1, 4), Value::Number(101.5), Value::Text("Prime".into())],
                    )
                    .unwrap(),
                    TickerRecord::new(schema, vec![day(1, 5), Value::Null, Value::Null]).unwrap(),
                ],
            )
            .unwrap();
        table
            .insert(
                "7203",
                vec![TickerRecord::new(
                    schema,
                    vec![day(1, 4), Value::Number(2500.0), Value::Text("Prime".into())],
                )
                .unwrap()],
            )
            .unwrap();
        table
    }

    #[test]
    fn snapshot_roundtrip_preserves_dtypes_and_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let schema = daily_schema();
        let table = sample_table(&schema);

        let meta = write(dir.path(), &table, &["9999".to_string()]).unwrap();
        assert_eq!(meta.tickers, 2);
        assert_eq!(meta.rows, 3);
        assert_eq!(read_meta(dir.path()).unwrap(), meta);

        let loaded = read(dir.path(), &schema).unwrap().unwrap();
        assert_eq!(loaded.tickers().collect::<Vec<_>>(), vec!["1301", "7203"]);
        assert_eq!(loaded.records("1301"), table.records("1301"));
        assert_eq!(loaded.records("7203"), table.records("7203"));
    }

    #[test]
    fn missing_snapshot_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read(dir.path(), &daily_schema()).unwrap().is_none());
    }

    #[test]
    fn tampered_snapshot_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let schema = daily_schema();
        write(dir.path(), &sample_table(&schema), &[]).unwrap();
        fs::write(snapshot_path(dir.path()), b"not parquet").unwrap();
        assert!(matches!(
            read(dir.path(), &schema),
            Err(ConsolidateError::Snapshot { .. })
        ));
    }

    #[test]
    fn empty_table_writes_a_readable_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let schema = daily_schema();
        write(dir.path(), &ConsolidatedTable::new(Arc::clone(&schema)), &[]).unwrap();
        let loaded = read(dir.path(), &schema).unwrap().unwrap();
        assert!(loaded.is_empty());
    }
}

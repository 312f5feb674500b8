//! Column schema contract: the ordered column definitions of one data kind.
//!
//! A schema is the single source of truth for three things:
//! - the header and cell dtypes of every per-ticker CSV of the kind
//! - the column set and dtypes of the consolidated snapshot
//! - the identifiers an expression may reference
//!
//! Stored as `{root}/{kind}/columns.json`: an ordered JSON list of
//! `{key, label, dtype, unit?}`. Schemas are immutable once loaded; the
//! `SchemaRegistry` caches them for the lifetime of a session.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

use crate::domain::kind::{FISCAL_QUARTER, FISCAL_YEAR};
use crate::domain::{ColumnType, DataKind, Period, RawRecord, RecordError, Value};

/// File holding a kind's column definitions.
pub const COLUMNS_FILE: &str = "columns.json";

/// Words that are expression syntax and therefore cannot be column keys.
pub const RESERVED_WORDS: &[&str] = &["cagr", "mean", "true", "false"];

/// Ticker column of the consolidated snapshot; no schema column may use it.
pub const TICKER_COLUMN: &str = "_ticker";

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("no column definitions for {kind} data at {}", path.display())]
    Missing { kind: DataKind, path: PathBuf },

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed column definitions in {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("{kind} schema has no columns")]
    Empty { kind: DataKind },

    #[error("{kind} schema defines column '{key}' more than once")]
    DuplicateKey { kind: DataKind, key: String },

    #[error("column key '{key}' is not a valid identifier")]
    InvalidKey { key: String },

    #[error("column key '{key}' is a reserved word")]
    ReservedKey { key: String },

    #[error("{kind} schema is missing period column '{column}'")]
    MissingPeriodColumn { kind: DataKind, column: String },

    #[error("{kind} period column '{column}' must be {expected:?}, found {actual:?}")]
    PeriodColumnType {
        kind: DataKind,
        column: String,
        expected: ColumnType,
        actual: ColumnType,
    },
}

/// One column of a data kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub key: String,
    pub label: String,
    pub dtype: ColumnType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl ColumnDefinition {
    pub fn new(key: impl Into<String>, label: impl Into<String>, dtype: ColumnType) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            dtype,
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeriodIndex {
    None,
    Quarter { year: usize, quarter: usize },
    Day(usize),
}

/// Validated, ordered column definitions of one data kind.
#[derive(Debug, Clone)]
pub struct ColumnSchema {
    kind: DataKind,
    columns: Vec<ColumnDefinition>,
    index: HashMap<String, usize>,
    period: PeriodIndex,
}

impl ColumnSchema {
    /// Validate column definitions for a kind.
    pub fn new(kind: DataKind, columns: Vec<ColumnDefinition>) -> Result<Self, SchemaError> {
        if columns.is_empty() {
            return Err(SchemaError::Empty { kind });
        }

        let mut index = HashMap::with_capacity(columns.len());
        for (i, col) in columns.iter().enumerate() {
            if !is_identifier(&col.key) {
                return Err(SchemaError::InvalidKey {
                    key: col.key.clone(),
                });
            }
            if RESERVED_WORDS.contains(&col.key.as_str()) || col.key == TICKER_COLUMN {
                return Err(SchemaError::ReservedKey {
                    key: col.key.clone(),
                });
            }
            if index.insert(col.key.clone(), i).is_some() {
                return Err(SchemaError::DuplicateKey {
                    kind,
                    key: col.key.clone(),
                });
            }
        }

        for (name, expected) in kind.period_columns() {
            let i = index
                .get(*name)
                .ok_or_else(|| SchemaError::MissingPeriodColumn {
                    kind,
                    column: name.to_string(),
                })?;
            let actual = columns[*i].dtype;
            if actual != *expected {
                return Err(SchemaError::PeriodColumnType {
                    kind,
                    column: name.to_string(),
                    expected: *expected,
                    actual,
                });
            }
        }

        let period = match kind {
            DataKind::Quarter => PeriodIndex::Quarter {
                year: index[FISCAL_YEAR],
                quarter: index[FISCAL_QUARTER],
            },
            DataKind::Daily => PeriodIndex::Day(index[crate::domain::kind::DAY]),
            DataKind::Company | DataKind::Indicator => PeriodIndex::None,
        };

        Ok(Self {
            kind,
            columns,
            index,
            period,
        })
    }

    /// Load `{root}/{kind}/columns.json`.
    pub fn load(root: &Path, kind: DataKind) -> Result<Self, SchemaError> {
        let path = columns_path(root, kind);
        let content = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SchemaError::Missing {
                    kind,
                    path: path.clone(),
                }
            } else {
                SchemaError::Io {
                    path: path.clone(),
                    source: e,
                }
            }
        })?;
        let columns: Vec<ColumnDefinition> =
            serde_json::from_str(&content).map_err(|e| SchemaError::Malformed {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        Self::new(kind, columns)
    }

    /// Write `{root}/{kind}/columns.json` atomically.
    pub fn save(&self, root: &Path) -> Result<(), SchemaError> {
        let path = columns_path(root, self.kind);
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| SchemaError::Io { path, source }
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_err(dir))?;
        }
        let json = serde_json::to_string_pretty(&self.columns).map_err(|e| {
            SchemaError::Malformed {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(io_err(&tmp_path))?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            SchemaError::Io {
                path: path.clone(),
                source: e,
            }
        })
    }

    /// Derive a schema from an API `column_description` mapping.
    ///
    /// Each entry is `key → {name_jp | label, unit?, dtype?}`. A missing dtype
    /// is inferred from the first non-null sample value; columns with no
    /// sample value default to number. Period columns always get their
    /// required dtype and are prepended when the description omits them.
    pub fn describe(
        kind: DataKind,
        description: &serde_json::Map<String, serde_json::Value>,
        samples: &[&RawRecord],
    ) -> Result<Self, SchemaError> {
        let mut columns: Vec<ColumnDefinition> = Vec::with_capacity(description.len() + 2);

        for (period_key, dtype) in kind.period_columns() {
            if !description.contains_key(*period_key) {
                columns.push(ColumnDefinition::new(*period_key, *period_key, *dtype));
            }
        }

        for (key, desc) in description {
            let field = |name: &str| {
                desc.get(name)
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
            };
            let label = field("label").or_else(|| field("name_jp")).unwrap_or(key);
            let forced = kind
                .period_columns()
                .iter()
                .find(|(name, _)| *name == key.as_str())
                .map(|(_, dtype)| *dtype);
            let declared = desc
                .get("dtype")
                .and_then(|v| serde_json::from_value::<ColumnType>(v.clone()).ok());
            let dtype = forced
                .or(declared)
                .unwrap_or_else(|| infer_dtype(key, samples));

            let mut col = ColumnDefinition::new(key.clone(), label, dtype);
            if let Some(unit) = field("unit") {
                col = col.with_unit(unit);
            }
            columns.push(col);
        }

        Self::new(kind, columns)
    }

    pub fn kind(&self) -> DataKind {
        self.kind
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Position of a column key.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn column(&self, key: &str) -> Option<&ColumnDefinition> {
        self.position(key).map(|i| &self.columns[i])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.key.as_str())
    }

    /// Derive the period key of a schema-ordered row.
    pub fn period_of(&self, values: &[Value]) -> Result<Period, RecordError> {
        let at = |i: usize| values.get(i).unwrap_or(&Value::Null);
        match self.period {
            PeriodIndex::None => Ok(Period::Snapshot),
            PeriodIndex::Quarter { year, quarter } => {
                let fiscal_year = integral(at(year), FISCAL_YEAR)?;
                let fiscal_quarter = integral(at(quarter), FISCAL_QUARTER)?;
                let fiscal_year =
                    i32::try_from(fiscal_year).map_err(|_| RecordError::InvalidPeriod {
                        column: FISCAL_YEAR.to_string(),
                        value: fiscal_year.to_string(),
                    })?;
                if !(1..=4).contains(&fiscal_quarter) {
                    return Err(RecordError::InvalidPeriod {
                        column: FISCAL_QUARTER.to_string(),
                        value: fiscal_quarter.to_string(),
                    });
                }
                Ok(Period::Quarter {
                    fiscal_year,
                    fiscal_quarter: fiscal_quarter as u8,
                })
            }
            PeriodIndex::Day(i) => match at(i) {
                Value::Date(d) => Ok(Period::Day(*d)),
                Value::Null => Err(RecordError::MissingPeriod {
                    column: crate::domain::kind::DAY.to_string(),
                }),
                other => Err(RecordError::InvalidPeriod {
                    column: crate::domain::kind::DAY.to_string(),
                    value: other.to_cell(),
                }),
            },
        }
    }
}

fn integral(value: &Value, column: &str) -> Result<i64, RecordError> {
    match value {
        Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e12 => Ok(*n as i64),
        Value::Null => Err(RecordError::MissingPeriod {
            column: column.to_string(),
        }),
        other => Err(RecordError::InvalidPeriod {
            column: column.to_string(),
            value: other.to_cell(),
        }),
    }
}

fn infer_dtype(key: &str, samples: &[&RawRecord]) -> ColumnType {
    let first = samples
        .iter()
        .filter_map(|rec| rec.get(key))
        .find(|v| !v.is_null() && v.as_str() != Some(""));
    match first {
        Some(serde_json::Value::String(s)) => {
            if matches!(Value::from_cell(s, ColumnType::Date), Ok(Value::Date(_))) {
                ColumnType::Date
            } else if s.trim().parse::<f64>().is_ok() {
                ColumnType::Number
            } else {
                ColumnType::String
            }
        }
        Some(serde_json::Value::Bool(_)) => ColumnType::String,
        _ => ColumnType::Number,
    }
}

/// True for `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `{root}/{kind}/columns.json`
pub fn columns_path(root: &Path, kind: DataKind) -> PathBuf {
    root.join(kind.as_str()).join(COLUMNS_FILE)
}

/// Per-session cache of loaded schemas. Each kind is read from disk once.
#[derive(Debug)]
pub struct SchemaRegistry {
    root: PathBuf,
    cache: RwLock<HashMap<DataKind, Arc<ColumnSchema>>>,
}

impl SchemaRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The cached schema for a kind, loading it on first use.
    pub fn get(&self, kind: DataKind) -> Result<Arc<ColumnSchema>, SchemaError> {
        if let Some(schema) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
        {
            return Ok(Arc::clone(schema));
        }

        let loaded = Arc::new(ColumnSchema::load(&self.root, kind)?);
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(cache.entry(kind).or_insert(loaded)))
    }

    /// Persist a schema and make it the cached definition for its kind.
    pub fn install(&self, schema: ColumnSchema) -> Result<Arc<ColumnSchema>, SchemaError> {
        schema.save(&self.root)?;
        let schema = Arc::new(schema);
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(schema.kind(), Arc::clone(&schema));
        Ok(schema)
    }

    /// True when the kind has a definition file on disk or in the cache.
    pub fn is_defined(&self, kind: DataKind) -> bool {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&kind)
            || columns_path(&self.root, kind).exists()
    }
}

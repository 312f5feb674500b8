//! The fetch collaborator seam.

use crate::domain::kind::FISCAL_YEAR;
use crate::domain::{DataKind, RawRecord};

use super::FetchError;

/// Fiscal-year range of a quarter fetch. Both ends are inclusive; `None`
/// leaves that side open. Other kinds ignore the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchWindow {
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
}

impl FetchWindow {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn years(start_year: i32, end_year: i32) -> Self {
        Self {
            start_year: Some(start_year),
            end_year: Some(end_year),
        }
    }

    /// Whether a raw record of `kind` falls inside the window. Quarter
    /// records without a readable fiscal year are kept; the store rejects
    /// them later with a proper error.
    pub fn contains(&self, kind: DataKind, record: &RawRecord) -> bool {
        if kind != DataKind::Quarter {
            return true;
        }
        let year = record.get(FISCAL_YEAR).and_then(|v| match v {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        });
        let Some(year) = year else {
            return true;
        };
        self.start_year.map_or(true, |s| year >= f64::from(s))
            && self.end_year.map_or(true, |e| year <= f64::from(e))
    }
}

/// Where raw payloads come from. Implementations own transport, paging,
/// retries and credentials.
pub trait FetchSource: Send + Sync {
    /// Human-readable name, used in logs and errors.
    fn name(&self) -> &str;

    /// The `column_description` mapping for a kind:
    /// `key → {name_jp, unit}`.
    fn columns(&self, kind: DataKind) -> Result<serde_json::Map<String, serde_json::Value>, FetchError>;

    /// Every ticker the source can serve for a kind.
    fn tickers(&self, kind: DataKind) -> Result<Vec<String>, FetchError>;

    /// Raw records of one ticker. An unknown ticker yields no records.
    fn fetch(
        &self,
        kind: DataKind,
        ticker: &str,
        window: &FetchWindow,
    ) -> Result<Vec<RawRecord>, FetchError>;
}

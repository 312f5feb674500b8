//! The four data kinds the API serves, and what keys each one's rows.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::value::ColumnType;

/// Fiscal year column of quarter rows.
pub const FISCAL_YEAR: &str = "fiscal_year";
/// Fiscal quarter (1..=4) column of quarter rows.
pub const FISCAL_QUARTER: &str = "fiscal_quarter";
/// Calendar date column of daily rows.
pub const DAY: &str = "day";

/// A data kind. Each kind lives in its own directory under the data root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    /// Company metadata, one row per ticker.
    Company,
    /// Quarterly fundamentals keyed by (fiscal_year, fiscal_quarter).
    Quarter,
    /// Latest price indicators, one row per ticker.
    Indicator,
    /// Daily price history keyed by calendar date.
    Daily,
}

impl DataKind {
    pub const ALL: [DataKind; 4] = [
        DataKind::Company,
        DataKind::Quarter,
        DataKind::Indicator,
        DataKind::Daily,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::Company => "company",
            DataKind::Quarter => "quarter",
            DataKind::Indicator => "indicator",
            DataKind::Daily => "daily",
        }
    }

    /// Columns that form the period key, with the dtype they must carry.
    pub fn period_columns(&self) -> &'static [(&'static str, ColumnType)] {
        match self {
            DataKind::Quarter => &[
                (FISCAL_YEAR, ColumnType::Number),
                (FISCAL_QUARTER, ColumnType::Number),
            ],
            DataKind::Daily => &[(DAY, ColumnType::Date)],
            DataKind::Company | DataKind::Indicator => &[],
        }
    }

    /// True when a ticker holds more than one row of this kind.
    pub fn is_periodic(&self) -> bool {
        !self.period_columns().is_empty()
    }

    /// Kinds whose columns may appear in plot expressions.
    pub fn is_plottable(&self) -> bool {
        matches!(self, DataKind::Quarter | DataKind::Indicator)
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("unknown data kind '{0}' (expected company, quarter, indicator or daily)")]
pub struct ParseKindError(pub String);

impl FromStr for DataKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "company" => Ok(DataKind::Company),
            "quarter" => Ok(DataKind::Quarter),
            "indicator" => Ok(DataKind::Indicator),
            "daily" => Ok(DataKind::Daily),
            other => Err(ParseKindError(other.to_string())),
        }
    }
}

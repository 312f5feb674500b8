use chrono::NaiveDate;
use std::fmt;

/// Natural key of a row within one ticker's records.
///
/// Ordering is chronological: quarters compare by (fiscal_year, fiscal_quarter),
/// days by date. A ticker never mixes period variants because the variant is
/// fixed by its data kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Period {
    /// Company and indicator rows: one per ticker.
    Snapshot,
    Quarter { fiscal_year: i32, fiscal_quarter: u8 },
    Day(NaiveDate),
}

impl Period {
    pub fn fiscal_year(&self) -> Option<i32> {
        match self {
            Period::Quarter { fiscal_year, .. } => Some(*fiscal_year),
            _ => None,
        }
    }

    /// A Q4 row stands for the whole fiscal year.
    pub fn is_annual(&self) -> bool {
        matches!(self, Period::Quarter { fiscal_quarter: 4, .. })
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Snapshot => f.write_str("latest"),
            Period::Quarter {
                fiscal_year,
                fiscal_quarter,
            } => write!(f, "{fiscal_year}Q{fiscal_quarter}"),
            Period::Day(d) => write!(f, "{d}"),
        }
    }
}

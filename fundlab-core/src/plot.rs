//! Plot data: X/Y/size/filter/category inputs → one point per ticker.
//!
//! Every expression is compiled before anything is evaluated, so a bad
//! formula blocks the whole plot. Per-ticker gaps only drop that ticker.

use serde::Serialize;
use std::fmt;
use std::io;
use thiserror::Error;
use tracing::{debug, info};

use crate::categories::{CategoryIndex, CategorySelection};
use crate::dataset::DataSet;
use crate::domain::DataKind;
use crate::expr::{ExprType, ExpressionError, ExpressionResolver};

/// Default company-name column.
pub const DEFAULT_NAME_COLUMN: &str = "company_name_en";
/// Default sector column.
pub const DEFAULT_CATEGORY_COLUMN: &str = "tosyo_33category";
/// Marker size when no size expression is given.
pub const DEFAULT_POINT_SIZE: f64 = 20.0;

/// Which input of a plot request an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Size,
    Filter,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Size => "size",
            Axis::Filter => "filter",
        })
    }
}

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("{0} expression is required")]
    MissingAxis(Axis),

    #[error("{axis} expression: {source}")]
    Expression {
        axis: Axis,
        #[source]
        source: ExpressionError,
    },

    #[error("size scale must be a finite, non-negative number, got {0}")]
    InvalidScale(f64),

    #[error("no quarter or indicator data loaded")]
    NoData,
}

/// One plot request, as entered by the user.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotRequest {
    pub x: String,
    pub y: String,
    pub size: Option<String>,
    pub size_scale: f64,
    pub filter: Option<String>,
    pub categories: CategorySelection,
}

impl PlotRequest {
    pub fn new(x: impl Into<String>, y: impl Into<String>) -> Self {
        Self {
            x: x.into(),
            y: y.into(),
            size: None,
            size_scale: 1.0,
            filter: None,
            categories: CategorySelection::All,
        }
    }

    /// Blank input clears the size term.
    pub fn size(mut self, expr: impl Into<String>) -> Self {
        self.size = non_blank(expr.into());
        self
    }

    pub fn size_scale(mut self, scale: f64) -> Self {
        self.size_scale = scale;
        self
    }

    /// Blank input clears the filter.
    pub fn filter(mut self, expr: impl Into<String>) -> Self {
        self.filter = non_blank(expr.into());
        self
    }

    pub fn categories(mut self, categories: CategorySelection) -> Self {
        self.categories = categories;
        self
    }
}

fn non_blank(s: String) -> Option<String> {
    (!s.trim().is_empty()).then_some(s)
}

/// Plot settings that come from configuration rather than the request.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotOptions {
    pub default_point_size: f64,
    pub name_column: String,
    pub category_column: String,
}

impl Default for PlotOptions {
    fn default() -> Self {
        Self {
            default_point_size: DEFAULT_POINT_SIZE,
            name_column: DEFAULT_NAME_COLUMN.to_string(),
            category_column: DEFAULT_CATEGORY_COLUMN.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotPoint {
    pub ticker: String,
    pub x: f64,
    pub y: f64,
    pub size: f64,
    pub category: Option<String>,
    pub name: Option<String>,
}

/// Points ordered by ticker, plus what was left out.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlotData {
    pub points: Vec<PlotPoint>,
    /// Tickers considered before any restriction.
    pub candidates: usize,
    /// Tickers excluded by the category restriction or a false filter.
    pub filtered_out: usize,
    /// Tickers lacking a filter, x, y or size value, in ticker order.
    pub dropped: Vec<String>,
}

/// Column order of the CSV form of a plot.
pub const CSV_HEADER: [&str; 6] = ["ticker", "x", "y", "size", "category", "name"];

impl PlotData {
    pub fn dropped_count(&self) -> usize {
        self.dropped.len()
    }

    /// One CSV row per point. The header row is written even with no points.
    pub fn write_csv<W: io::Write>(&self, out: W) -> Result<(), csv::Error> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(out);
        writer.write_record(CSV_HEADER)?;
        for point in &self.points {
            writer.serialize(point)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Builds plot data from loaded tables.
#[derive(Debug)]
pub struct PlotDataBuilder<'a> {
    data: &'a DataSet,
    options: PlotOptions,
    categories: CategoryIndex,
}

impl<'a> PlotDataBuilder<'a> {
    pub fn new(data: &'a DataSet, options: PlotOptions) -> Self {
        let categories = data
            .table(DataKind::Company)
            .map(|company| CategoryIndex::from_table(company, &options.category_column))
            .unwrap_or_default();
        Self {
            data,
            options,
            categories,
        }
    }

    pub fn categories(&self) -> &CategoryIndex {
        &self.categories
    }

    pub fn build(&self, request: &PlotRequest) -> Result<PlotData, PlotError> {
        if request.x.trim().is_empty() {
            return Err(PlotError::MissingAxis(Axis::X));
        }
        if request.y.trim().is_empty() {
            return Err(PlotError::MissingAxis(Axis::Y));
        }
        if !request.size_scale.is_finite() || request.size_scale < 0.0 {
            return Err(PlotError::InvalidScale(request.size_scale));
        }
        if self.data.table(DataKind::Quarter).is_none()
            && self.data.table(DataKind::Indicator).is_none()
        {
            return Err(PlotError::NoData);
        }

        let resolver = ExpressionResolver::new(self.data);
        let compile = |axis: Axis, source: &str, ty: ExprType| {
            resolver
                .compile_as(source, ty)
                .map_err(|source| PlotError::Expression { axis, source })
        };
        let x = compile(Axis::X, &request.x, ExprType::Number)?;
        let y = compile(Axis::Y, &request.y, ExprType::Number)?;
        let size = request
            .size
            .as_deref()
            .map(|s| compile(Axis::Size, s, ExprType::Number))
            .transpose()?;
        let filter = request
            .filter
            .as_deref()
            .map(|s| compile(Axis::Filter, s, ExprType::Bool))
            .transpose()?;

        let candidates = self.data.candidate_tickers();
        let total = candidates.len();
        let mut tickers: Vec<String> = candidates
            .into_iter()
            .filter(|t| request.categories.includes(self.categories.category_of(t)))
            .collect();

        let mut filtered_out = total - tickers.len();
        let mut dropped = Vec::new();

        if let Some(filter) = &filter {
            let results = resolver.evaluate(filter, &tickers);
            let mut passed = Vec::with_capacity(tickers.len());
            for ticker in tickers {
                match results.get(&ticker).and_then(|v| v.as_bool()) {
                    Some(true) => passed.push(ticker),
                    Some(false) => filtered_out += 1,
                    None => {
                        debug!(ticker, "missing filter value, dropping");
                        dropped.push(ticker);
                    }
                }
            }
            tickers = passed;
        }

        let xs = resolver.evaluate(&x, &tickers);
        let ys = resolver.evaluate(&y, &tickers);
        let sizes = size.as_ref().map(|s| resolver.evaluate(s, &tickers));

        let mut points = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            let x = xs.get(&ticker).and_then(|v| v.as_number());
            let y = ys.get(&ticker).and_then(|v| v.as_number());
            let size = match &sizes {
                Some(sizes) => sizes.get(&ticker).and_then(|v| v.as_number()),
                None => Some(self.options.default_point_size),
            };
            let (Some(x), Some(y), Some(size)) = (x, y, size) else {
                debug!(ticker, "missing plot value, dropping");
                dropped.push(ticker);
                continue;
            };
            points.push(PlotPoint {
                category: self.categories.category_of(&ticker).map(str::to_string),
                name: self.company_name(&ticker),
                ticker,
                x,
                y,
                size: size * request.size_scale,
            });
        }

        dropped.sort();
        info!(
            points = points.len(),
            candidates = total,
            filtered_out,
            dropped = dropped.len(),
            "built plot data"
        );
        Ok(PlotData {
            points,
            candidates: total,
            filtered_out,
            dropped,
        })
    }

    fn company_name(&self, ticker: &str) -> Option<String> {
        self.data
            .table(DataKind::Company)?
            .latest_value(ticker, &self.options.name_column)?
            .as_text()
            .map(str::to_string)
    }
}

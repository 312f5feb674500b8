//! Sector classification, built from the company table.
//!
//! Each company row names its sector in a category column
//! (`tosyo_33category` by default). Plots can be restricted to a set of
//! sectors.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::consolidate::ConsolidatedTable;

/// Ticker ↔ sector lookup.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryIndex {
    column: String,
    by_ticker: BTreeMap<String, String>,
    sectors: BTreeMap<String, Vec<String>>,
}

impl CategoryIndex {
    /// Index the text values of `column` in the company table. Tickers with
    /// no value are unclassified. An unknown column gives an empty index.
    pub fn from_table(table: &ConsolidatedTable, column: &str) -> Self {
        let mut by_ticker = BTreeMap::new();
        let mut sectors: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for ticker in table.tickers() {
            let Some(category) = table
                .latest_value(ticker, column)
                .and_then(|v| v.as_text())
            else {
                continue;
            };
            by_ticker.insert(ticker.to_string(), category.to_string());
            sectors
                .entry(category.to_string())
                .or_default()
                .push(ticker.to_string());
        }

        Self {
            column: column.to_string(),
            by_ticker,
            sectors,
        }
    }

    /// Column the index was built from.
    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn category_of(&self, ticker: &str) -> Option<&str> {
        self.by_ticker.get(ticker).map(String::as_str)
    }

    /// Sector names, sorted.
    pub fn category_names(&self) -> Vec<&str> {
        self.sectors.keys().map(String::as_str).collect()
    }

    /// Tickers of one sector, sorted.
    pub fn sector_tickers(&self, category: &str) -> Option<&[String]> {
        self.sectors.get(category).map(Vec::as_slice)
    }

    /// (sector, ticker count) pairs, sorted by sector.
    pub fn counts(&self) -> Vec<(&str, usize)> {
        self.sectors
            .iter()
            .map(|(name, tickers)| (name.as_str(), tickers.len()))
            .collect()
    }

    /// Number of classified tickers.
    pub fn ticker_count(&self) -> usize {
        self.by_ticker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ticker.is_empty()
    }
}

/// Which sectors a plot includes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CategorySelection {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl CategorySelection {
    /// Restrict to the given sectors; an empty list selects everything.
    pub fn only<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = categories.into_iter().map(Into::into).collect();
        if set.is_empty() {
            CategorySelection::All
        } else {
            CategorySelection::Only(set)
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, CategorySelection::All)
    }

    /// Unclassified tickers only pass an unrestricted selection.
    pub fn includes(&self, category: Option<&str>) -> bool {
        match self {
            CategorySelection::All => true,
            CategorySelection::Only(set) => category.is_some_and(|c| set.contains(c)),
        }
    }
}

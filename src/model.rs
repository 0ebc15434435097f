//! Core data types for the drought statistics service.
//!
//! This module defines the shared domain model imported by all other modules.
//! It contains no I/O, only types and the small amount of arithmetic that
//! belongs to them (month indexing, threshold comparison).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::QueryError;

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A calendar month. Ordered by its position on the dense month timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32, // 1-12
}

impl YearMonth {
    /// Builds a `YearMonth`, rejecting months outside 1..=12.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// Position on the dense month timeline: `year * 12 + (month - 1)`.
    pub fn month_index(&self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    pub fn from_month_index(index: i64) -> Self {
        Self {
            year: index.div_euclid(12) as i32,
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    /// True when `next` is the calendar month immediately after `self`.
    pub fn is_followed_by(&self, next: &YearMonth) -> bool {
        next.month_index() == self.month_index() + 1
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

/// Inclusive year window `[start_year, end_year]`.
///
/// A window with `start_year > end_year` is legal and simply matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct YearRange {
    pub start_year: i32,
    pub end_year: i32,
}

impl YearRange {
    /// Historical reference window that future projections are compared against.
    pub const BASELINE: YearRange = YearRange { start_year: 1976, end_year: 2005 };

    pub fn new(start_year: i32, end_year: i32) -> Self {
        Self { start_year, end_year }
    }

    pub fn contains(&self, year: i32) -> bool {
        year >= self.start_year && year <= self.end_year
    }

    pub fn is_empty(&self) -> bool {
        self.start_year > self.end_year
    }
}

// ---------------------------------------------------------------------------
// Threshold
// ---------------------------------------------------------------------------

/// Index value below which a month counts as a drought month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Threshold(pub f64);

impl Threshold {
    pub const DEFAULT: Threshold = Threshold(-1.0);

    /// Strict comparison: a value equal to the threshold is not a drought month.
    pub fn is_drought(&self, value: f64) -> bool {
        value < self.0
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Threshold::DEFAULT
    }
}

// ---------------------------------------------------------------------------
// Series addressing
// ---------------------------------------------------------------------------

/// Drought index whose monthly values are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexName {
    Spi,
    Spei,
}

impl IndexName {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexName::Spi => "spi",
            IndexName::Spei => "spei",
        }
    }
}

impl FromStr for IndexName {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "spi" => Ok(IndexName::Spi),
            "spei" => Ok(IndexName::Spei),
            other => Err(QueryError::InvalidParameter(format!("unknown index '{}'", other))),
        }
    }
}

impl fmt::Display for IndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Climate model generation a data source belongs to. Each family has its
/// own fixed model roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFamily {
    Cmip5,
    Cmip6,
}

impl SourceFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFamily::Cmip5 => "cmip5",
            SourceFamily::Cmip6 => "cmip6",
        }
    }
}

impl FromStr for SourceFamily {
    type Err = QueryError;

    /// Any label mentioning "cmip5" selects the CMIP5 family; everything
    /// else is treated as CMIP6.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        if lower.is_empty() {
            return Err(QueryError::InvalidParameter("data_source must not be empty".to_string()));
        }
        if lower.contains("cmip5") {
            Ok(SourceFamily::Cmip5)
        } else {
            Ok(SourceFamily::Cmip6)
        }
    }
}

impl fmt::Display for SourceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical spelling of a scenario label: trimmed, lowercased, with `.` and
/// `-` removed, so "RCP4.5", "rcp-45" and "rcp45" name the same scenario.
pub fn normalize_scenario(scenario: &str) -> String {
    scenario
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| *c != '.' && *c != '-')
        .collect()
}

/// Structured address of one stored series: (index, source, scenario, model).
///
/// Scenario is normalized and model case-folded so that "RCP4.5" and
/// "rcp45" address the same series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub index: String,
    pub source: String,
    pub scenario: String,
    pub model: String,
}

impl SeriesKey {
    pub fn new(index: IndexName, source: SourceFamily, scenario: &str, model: &str) -> Self {
        Self {
            index: index.as_str().to_string(),
            source: source.as_str().to_string(),
            scenario: normalize_scenario(scenario),
            model: model.trim().to_lowercase(),
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.index, self.source, self.scenario, self.model)
    }
}

// ---------------------------------------------------------------------------
// Observations and results
// ---------------------------------------------------------------------------

/// One monthly index value for one region of one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub region_id: i32,
    pub region_name: String,
    pub year: i32,
    pub month: u32,
    pub value: f64,
}

impl Observation {
    pub fn year_month(&self) -> YearMonth {
        YearMonth { year: self.year, month: self.month }
    }
}

/// A maximal run of two or more consecutive drought months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroughtEvent {
    pub start: YearMonth,
    pub end: YearMonth,
}

impl DroughtEvent {
    /// Number of months covered, inclusive of both ends.
    pub fn month_count(&self) -> i64 {
        self.end.month_index() - self.start.month_index() + 1
    }
}

/// Per-region result of a multi-model summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionSummary {
    pub region_id: i32,
    pub metric: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionInfo {
    pub region_id: i32,
    pub region_name: String,
}

/// Which statistic a multi-model summary reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SummaryKind {
    DroughtMonths,
    DroughtEvents,
}

impl SummaryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryKind::DroughtMonths => "month",
            SummaryKind::DroughtEvents => "event",
        }
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Single region, single model query.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionQuery {
    pub index: IndexName,
    pub source: SourceFamily,
    pub scenario: String,
    pub model: String,
    pub region_id: i32,
    pub years: YearRange,
    pub threshold: Threshold,
}

impl RegionQuery {
    pub fn series_key(&self) -> SeriesKey {
        SeriesKey::new(self.index, self.source, &self.scenario, &self.model)
    }
}

/// Cross-model query over the whole region domain.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryQuery {
    pub index: IndexName,
    pub source: SourceFamily,
    pub scenario: String,
    pub years: YearRange,
    pub threshold: Threshold,
}

impl SummaryQuery {
    pub fn series_key(&self, model: &str) -> SeriesKey {
        SeriesKey::new(self.index, self.source, &self.scenario, model)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

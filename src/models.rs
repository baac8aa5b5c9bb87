// src/models.rs
use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

/// Date format embedded in every artifact filename.
pub const ARTIFACT_DATE_FORMAT: &str = "%d_%m_%Y";

/// Static reference data for one tradable instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticker {
    /// Base symbol, market suffix stripped.
    pub symbol: String,
    pub sector: String,
    pub industry: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Daily prices for one ticker, ordered by date with at most one point per date.
/// Non-trading days are simply absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(mut points: Vec<PricePoint>) -> Self {
        points.sort_by_key(|p| p.date);
        points.dedup_by_key(|p| p.date);
        PriceSeries { points }
    }

    pub fn empty() -> Self {
        PriceSeries::default()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}

/// The (history span, target span) pair anchored on `target_end`.
///
/// History span is `[target_end - 5y, target_end - 1m)` and target span is
/// `[target_end - 1m, target_end]`; they share a boundary but never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationWindow {
    pub history_start: NaiveDate,
    pub target_start: NaiveDate,
    pub target_end: NaiveDate,
}

impl EvaluationWindow {
    pub fn new(target_end: NaiveDate) -> Self {
        let history_start = target_end
            .checked_sub_months(Months::new(60))
            .unwrap_or(NaiveDate::MIN);
        let target_start = target_end
            .checked_sub_months(Months::new(1))
            .unwrap_or(NaiveDate::MIN);
        EvaluationWindow {
            history_start,
            target_start,
            target_end,
        }
    }

    /// First date requested from the price provider.
    pub fn fetch_start(&self) -> NaiveDate {
        self.target_start
            .checked_sub_months(Months::new(60))
            .unwrap_or(NaiveDate::MIN)
    }

    pub fn in_history(&self, date: NaiveDate) -> bool {
        date >= self.history_start && date < self.target_start
    }

    pub fn in_target(&self, date: NaiveDate) -> bool {
        date >= self.target_start && date <= self.target_end
    }

    /// `dd_mm_yyyy` label used in artifact filenames.
    pub fn date_label(&self) -> String {
        self.target_end.format(ARTIFACT_DATE_FORMAT).to_string()
    }
}

/// Qualification tier. The numeric codes are labels, not a scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Category {
    NewAth,
    Within5,
    Within10,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::NewAth, Category::Within5, Category::Within10];

    pub fn code(self) -> u8 {
        match self {
            Category::NewAth => 0,
            Category::Within5 => 5,
            Category::Within10 => 10,
        }
    }

    pub fn status(self) -> &'static str {
        match self {
            Category::NewAth => "New ATH",
            Category::Within5 => "Within 5% of ATH",
            Category::Within10 => "Within 10% of ATH",
        }
    }

    /// Filename prefix of the per-category artifact.
    pub fn file_prefix(self) -> &'static str {
        match self {
            Category::NewAth => "New_ATH",
            Category::Within5 => "Within_5_Percent_ATH",
            Category::Within10 => "Within_10_Percent_ATH",
        }
    }
}

impl From<Category> for u8 {
    fn from(category: Category) -> u8 {
        category.code()
    }
}

impl TryFrom<u8> for Category {
    type Error = PipelineError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Category::NewAth),
            5 => Ok(Category::Within5),
            10 => Ok(Category::Within10),
            other => Err(PipelineError::InvalidCategory(other.to_string())),
        }
    }
}

impl FromStr for Category {
    type Err = PipelineError;

    /// Accepts the numeric codes and the status labels, nothing else.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed {
            "0" => return Ok(Category::NewAth),
            "5" => return Ok(Category::Within5),
            "10" => return Ok(Category::Within10),
            _ => {}
        }
        Category::ALL
            .into_iter()
            .find(|c| c.status().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| PipelineError::InvalidCategory(trimmed.to_string()))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.status())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationResult {
    pub peak_date: NaiveDate,
    pub peak_price: f64,
    pub historical_ath: f64,
    pub category: Category,
}

/// A qualifying ticker with its static reference data attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRecord {
    pub company: String,
    pub peak_date: NaiveDate,
    pub peak_price: f64,
    pub category: Category,
    pub sector: String,
    pub industry: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketCapCategory {
    #[serde(rename = "Large Cap")]
    Large,
    #[serde(rename = "Mid Cap")]
    Mid,
    #[serde(rename = "Small Cap")]
    Small,
    Unknown,
}

impl MarketCapCategory {
    /// Thresholds are in crore.
    pub fn from_market_cap(market_cap: Option<f64>) -> Self {
        match market_cap {
            None => MarketCapCategory::Unknown,
            Some(cap) if cap >= 20000.0 => MarketCapCategory::Large,
            Some(cap) if cap >= 5000.0 => MarketCapCategory::Mid,
            Some(_) => MarketCapCategory::Small,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MarketCapCategory::Large => "Large Cap",
            MarketCapCategory::Mid => "Mid Cap",
            MarketCapCategory::Small => "Small Cap",
            MarketCapCategory::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRecord {
    pub record: ScanRecord,
    /// Market capitalization in crore.
    pub market_cap: Option<f64>,
}

impl EnrichedRecord {
    pub fn market_cap_category(&self) -> MarketCapCategory {
        MarketCapCategory::from_market_cap(self.market_cap)
    }
}

/// One line of a run artifact, columns in file order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRow {
    #[serde(rename = "Company")]
    pub company: String,
    #[serde(rename = "Peak Date")]
    pub peak_date: NaiveDate,
    #[serde(rename = "Peak Price")]
    pub peak_price: f64,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Category")]
    pub category: Category,
    #[serde(rename = "Sector")]
    pub sector: String,
    #[serde(rename = "Industry")]
    pub industry: String,
    #[serde(rename = "Market Cap (Cr)")]
    pub market_cap: Option<f64>,
    #[serde(rename = "Market Cap Category")]
    pub market_cap_category: MarketCapCategory,
}

impl From<&EnrichedRecord> for ArtifactRow {
    fn from(enriched: &EnrichedRecord) -> Self {
        let r = &enriched.record;
        ArtifactRow {
            company: r.company.clone(),
            peak_date: r.peak_date,
            peak_price: r.peak_price,
            status: r.category.status().to_string(),
            category: r.category,
            sector: r.sector.clone(),
            industry: r.industry.clone(),
            market_cap: enriched.market_cap,
            market_cap_category: enriched.market_cap_category(),
        }
    }
}

/// Display status of one matrix cell, derived from the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PresenceStatus {
    /// Category 0 or 5.
    Favorable,
    /// Category 10.
    Distant,
    NotPresent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresenceCell {
    pub category: Option<Category>,
    pub presence: PresenceStatus,
    pub status: &'static str,
    pub class: &'static str,
}

impl PresenceCell {
    pub fn from_category(category: Option<Category>) -> Self {
        let (presence, status, class) = match category {
            Some(Category::NewAth) => (PresenceStatus::Favorable, "Yes", "new-ath"),
            Some(Category::Within5) => (PresenceStatus::Favorable, "Yes", "within-5"),
            Some(Category::Within10) => (PresenceStatus::Distant, "No", "within-10"),
            None => (PresenceStatus::NotPresent, "No", "not-present"),
        };
        PresenceCell {
            category,
            presence,
            status,
            class,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixDate {
    /// `dd_mm_yyyy` as found in the filename.
    pub label: String,
    /// e.g. `31 July 2025`; the raw label when it does not parse.
    pub display: String,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixRow {
    pub company: String,
    pub sector: String,
    pub industry: String,
    pub market_cap: String,
    pub raw_market_cap: Option<f64>,
    /// One cell per entry of `PresenceMatrix::dates`, same order.
    pub cells: Vec<PresenceCell>,
}

/// Company x date view over every run artifact. Built on demand, never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PresenceMatrix {
    pub dates: Vec<MatrixDate>,
    pub rows: Vec<MatrixRow>,
    pub skipped_files: Vec<String>,
}

impl PresenceMatrix {
    pub fn total_companies(&self) -> usize {
        self.rows.len()
    }

    pub fn total_dates(&self) -> usize {
        self.dates.len()
    }

    pub fn cell(&self, company: &str, label: &str) -> Option<&PresenceCell> {
        let col = self.dates.iter().position(|d| d.label == label)?;
        self.rows
            .iter()
            .find(|r| r.company == company)
            .and_then(|r| r.cells.get(col))
    }
}

// src/services/matrix.rs
use chrono::NaiveDate;
use csv::Reader;
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};
use crate::models::{
    ArtifactRow, Category, MatrixDate, MatrixRow, PresenceCell, PresenceMatrix, ARTIFACT_DATE_FORMAT,
};
use crate::services::aggregator::{ARTIFACT_PREFIX, ARTIFACT_SUFFIX};
use crate::services::reference::find_column;

const COMPANY_COLUMNS: &[&str] = &["Company", "Company Name", "company", "company_name"];
const CATEGORY_COLUMNS: &[&str] = &["Category", "category", "Status"];
const NOT_AVAILABLE: &str = "N/A";

/// One company's line in a previously written artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactEntry {
    pub company: String,
    pub category: Category,
    pub sector: String,
    pub industry: String,
    pub market_cap: Option<f64>,
}

/// A dated artifact found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactFile {
    pub path: PathBuf,
    pub label: String,
    pub date: Option<NaiveDate>,
}

/// `dd_mm_yyyy` label of an artifact filename, `None` for anything else.
pub fn artifact_label(file_name: &str) -> Option<&str> {
    file_name
        .strip_prefix(ARTIFACT_PREFIX)?
        .strip_suffix(ARTIFACT_SUFFIX)
        .filter(|label| !label.is_empty())
}

pub fn parse_label_date(label: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(label, ARTIFACT_DATE_FORMAT).ok()
}

/// Dated artifacts in `dir`, in filename order.
pub fn list_artifacts(dir: &Path) -> Result<Vec<ArtifactFile>> {
    let entries = fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))?;

    let mut files: Vec<ArtifactFile> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            let label = artifact_label(&name)?.to_string();
            Some(ArtifactFile {
                path: entry.path(),
                date: parse_label_date(&label),
                label,
            })
        })
        .collect();
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// Most recent artifact by the date in its filename.
pub fn latest_artifact(dir: &Path) -> Result<ArtifactFile> {
    list_artifacts(dir)?
        .into_iter()
        .filter(|f| f.date.is_some())
        .max_by_key(|f| f.date)
        .ok_or_else(|| PipelineError::NoData(format!("no ATH artifacts in {}", dir.display())))
}

/// Reads an artifact back as full rows.
pub fn read_artifact_rows(path: &Path) -> Result<Vec<ArtifactRow>> {
    let mut rdr = Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in rdr.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// Reads the columns the matrix needs, tolerating older header spellings.
/// Rows with an empty company or an unrecognized category are skipped.
pub fn read_artifact_entries(path: &Path) -> Result<Vec<ArtifactEntry>> {
    let mut rdr = Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();

    let company_idx = find_column(&headers, COMPANY_COLUMNS).ok_or_else(|| PipelineError::MissingColumn {
        column: "Company",
        path: path.to_path_buf(),
    })?;
    let category_idx = find_column(&headers, CATEGORY_COLUMNS).ok_or_else(|| PipelineError::MissingColumn {
        column: "Category",
        path: path.to_path_buf(),
    })?;
    let sector_idx = find_column(&headers, &["Sector"]);
    let industry_idx = find_column(&headers, &["Industry"]);
    let cap_idx = find_column(&headers, &["Market Cap (Cr)"]);

    let mut entries = Vec::new();
    for record in rdr.records() {
        let row = match record {
            Ok(row) => row,
            Err(e) => {
                warn!("Skipping malformed row in {}: {}", path.display(), e);
                continue;
            }
        };
        let text = |idx: Option<usize>| idx.and_then(|i| row.get(i)).map(str::trim).unwrap_or("");

        let company = text(Some(company_idx));
        if company.is_empty() || company == "nan" {
            continue;
        }
        let category = match text(Some(category_idx)).parse::<Category>() {
            Ok(c) => c,
            Err(e) => {
                warn!("{}: {} for {}, row skipped", path.display(), e, company);
                continue;
            }
        };

        entries.push(ArtifactEntry {
            company: company.to_string(),
            category,
            sector: display_text(text(sector_idx)),
            industry: display_text(text(industry_idx)),
            market_cap: text(cap_idx).parse::<f64>().ok().filter(|c| c.is_finite()),
        });
    }
    Ok(entries)
}

fn display_text(value: &str) -> String {
    if value.is_empty() || value == "nan" {
        NOT_AVAILABLE.to_string()
    } else {
        value.to_string()
    }
}

/// `₹12.3K Cr` at or above a thousand crore, `₹123.4 Cr` below, `N/A` when absent.
pub fn format_market_cap(market_cap: Option<f64>) -> String {
    match market_cap {
        Some(cap) if cap >= 1000.0 => format!("₹{:.1}K Cr", cap / 1000.0),
        Some(cap) => format!("₹{:.1} Cr", cap),
        None => NOT_AVAILABLE.to_string(),
    }
}

fn display_date(label: &str, date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%d %B %Y").to_string())
        .unwrap_or_else(|| label.to_string())
}

struct CompanyDetails {
    sector: String,
    industry: String,
    market_cap: Option<f64>,
}

/// Builds the presence matrix from every artifact in `dir`.
///
/// Unreadable artifacts are skipped and listed in `skipped_files`. Having no
/// artifacts at all is `PipelineError::NoData`.
pub fn build_presence_matrix(dir: &Path) -> Result<PresenceMatrix> {
    let files = list_artifacts(dir)?;
    if files.is_empty() {
        return Err(PipelineError::NoData("No ATH CSV files found".into()));
    }

    let mut skipped_files = Vec::new();
    let mut parsed = Vec::with_capacity(files.len());
    for file in files {
        match read_artifact_entries(&file.path) {
            Ok(entries) => {
                debug!("{}: {} companies", file.label, entries.len());
                parsed.push((file, entries));
            }
            Err(e) => {
                warn!("Skipping artifact {}: {}", file.path.display(), e);
                skipped_files.push(file.path.display().to_string());
            }
        }
    }

    Ok(assemble(parsed, skipped_files))
}

/// Pure part of the build: artifacts in iteration order -> matrix.
pub fn assemble(parsed: Vec<(ArtifactFile, Vec<ArtifactEntry>)>, skipped_files: Vec<String>) -> PresenceMatrix {
    let mut companies = BTreeSet::new();
    let mut details: HashMap<String, CompanyDetails> = HashMap::new();
    let mut presence: HashMap<(String, String), Category> = HashMap::new();
    let mut dates = Vec::with_capacity(parsed.len());

    for (file, entries) in parsed {
        for entry in entries {
            companies.insert(entry.company.clone());
            details.entry(entry.company.clone()).or_insert_with(|| CompanyDetails {
                sector: entry.sector.clone(),
                industry: entry.industry.clone(),
                market_cap: entry.market_cap,
            });
            presence.insert((entry.company, file.label.clone()), entry.category);
        }
        dates.push(MatrixDate {
            display: display_date(&file.label, file.date),
            date: file.date,
            label: file.label,
        });
    }

    // newest first, unparseable labels last
    dates.sort_by(|a, b| match (a.date, b.date) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.label.cmp(&b.label),
    });

    let rows = companies
        .into_iter()
        .map(|company| {
            let cells = dates
                .iter()
                .map(|d| PresenceCell::from_category(presence.get(&(company.clone(), d.label.clone())).copied()))
                .collect();
            let info = details.remove(&company);
            let market_cap = info.as_ref().and_then(|i| i.market_cap);
            MatrixRow {
                sector: info.as_ref().map_or_else(|| NOT_AVAILABLE.to_string(), |i| i.sector.clone()),
                industry: info.as_ref().map_or_else(|| NOT_AVAILABLE.to_string(), |i| i.industry.clone()),
                market_cap: format_market_cap(market_cap),
                raw_market_cap: market_cap,
                company,
                cells,
            }
        })
        .collect::<Vec<_>>();

    info!("Presence matrix: {} companies x {} dates", rows.len(), dates.len());

    PresenceMatrix {
        dates,
        rows,
        skipped_files,
    }
}

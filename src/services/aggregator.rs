// src/services/aggregator.rs
use chrono::NaiveDate;
use csv::Writer;
use log::{error, info, warn};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};
use crate::models::{ArtifactRow, Category, EnrichedRecord, ARTIFACT_DATE_FORMAT};

pub const ARTIFACT_PREFIX: &str = "ATH_companies_with_market_cap_";
pub const ARTIFACT_SUFFIX: &str = ".csv";

pub fn artifact_file_name(date: NaiveDate) -> String {
    format!("{}{}{}", ARTIFACT_PREFIX, date.format(ARTIFACT_DATE_FORMAT), ARTIFACT_SUFFIX)
}

pub fn category_file_name(category: Category, date: NaiveDate) -> String {
    format!(
        "{}_with_market_cap_{}.csv",
        category.file_prefix(),
        date.format(ARTIFACT_DATE_FORMAT)
    )
}

fn dated_file_name(stem: &str, date: NaiveDate) -> String {
    format!("{}_{}.csv", stem, date.format(ARTIFACT_DATE_FORMAT))
}

/// Category ascending, then market cap descending with absent caps last.
/// Company name breaks remaining ties so the order is fully deterministic.
pub fn sort_records(records: &mut [EnrichedRecord]) {
    records.sort_by(|a, b| {
        a.record
            .category
            .cmp(&b.record.category)
            .then_with(|| match (a.market_cap, b.market_cap) {
                (Some(x), Some(y)) => y.total_cmp(&x),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
            .then_with(|| a.record.company.cmp(&b.record.company))
    });
}

/// Frequency table, count descending then name ascending.
pub fn value_counts<'a, I>(values: I) -> Vec<(String, usize)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for v in values {
        *counts.entry(v).or_default() += 1;
    }
    let mut table: Vec<(String, usize)> = counts.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    table.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    table
}

/// Category x sector counts. Sectors are the alphabetical union; missing cells are zero.
#[derive(Debug, Clone, PartialEq)]
pub struct CategorySectorPivot {
    pub sectors: Vec<String>,
    pub rows: Vec<(Category, Vec<usize>)>,
}

pub fn category_sector_pivot(records: &[EnrichedRecord]) -> CategorySectorPivot {
    let sectors: Vec<String> = records
        .iter()
        .map(|r| r.record.sector.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut by_category: BTreeMap<Category, Vec<usize>> = BTreeMap::new();
    for r in records {
        let counts = by_category
            .entry(r.record.category)
            .or_insert_with(|| vec![0; sectors.len()]);
        if let Ok(idx) = sectors.binary_search(&r.record.sector) {
            counts[idx] += 1;
        }
    }

    CategorySectorPivot {
        sectors,
        rows: by_category.into_iter().collect(),
    }
}

/// What one run wrote. `failed` lists derived files that could not be written.
#[derive(Debug, Default)]
pub struct WrittenArtifacts {
    pub artifact: PathBuf,
    pub category_files: Vec<PathBuf>,
    pub derived_files: Vec<PathBuf>,
    pub failed: Vec<String>,
}

/// Sorts the records and writes the dated artifact set into `dir`.
///
/// The full artifact is written first and its failure is the only fatal one;
/// every other file is attempted independently afterwards.
pub fn write_run(
    dir: &Path,
    date: NaiveDate,
    records: &mut [EnrichedRecord],
    skipped: &[String],
) -> Result<WrittenArtifacts> {
    fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;
    sort_records(records);

    let artifact = dir.join(artifact_file_name(date));
    write_records(&artifact, records.iter())?;
    info!("Main results: {}", artifact.display());

    let mut written = WrittenArtifacts {
        artifact,
        ..Default::default()
    };

    for category in Category::ALL {
        let mut subset = records.iter().filter(|r| r.record.category == category).peekable();
        if subset.peek().is_none() {
            continue;
        }
        let path = dir.join(category_file_name(category, date));
        match write_records(&path, subset) {
            Ok(()) => {
                info!("Created: {}", path.display());
                written.category_files.push(path);
            }
            Err(e) => record_failure(&mut written, &path, e),
        }
    }

    let path = dir.join(dated_file_name("Sector_Counts", date));
    let outcome = write_counts(
        &path,
        "Sector",
        value_counts(records.iter().map(|r| r.record.sector.as_str())),
    );
    track(&mut written, path, outcome);

    let path = dir.join(dated_file_name("Industry_Counts", date));
    let outcome = write_counts(
        &path,
        "Industry",
        value_counts(records.iter().map(|r| r.record.industry.as_str())),
    );
    track(&mut written, path, outcome);

    let path = dir.join(dated_file_name("Category_Sector_Analysis", date));
    let outcome = write_pivot(&path, &category_sector_pivot(records));
    track(&mut written, path, outcome);

    let path = dir.join(dated_file_name("Skipped_Tickers", date));
    let outcome = write_skipped(&path, skipped);
    track(&mut written, path, outcome);

    Ok(written)
}

fn track(written: &mut WrittenArtifacts, path: PathBuf, outcome: Result<()>) {
    match outcome {
        Ok(()) => written.derived_files.push(path),
        Err(e) => record_failure(written, &path, e),
    }
}

fn record_failure(written: &mut WrittenArtifacts, path: &Path, e: PipelineError) {
    error!("Failed to write {}: {}", path.display(), e);
    written.failed.push(format!("{}: {}", path.display(), e));
}

fn create_writer(path: &Path) -> Result<Writer<fs::File>> {
    let file = fs::File::create(path).map_err(|e| PipelineError::io(path, e))?;
    Ok(Writer::from_writer(file))
}

fn finish(mut wtr: Writer<fs::File>, path: &Path) -> Result<()> {
    wtr.flush().map_err(|e| PipelineError::io(path, e))
}

fn write_records<'a, I>(path: &Path, records: I) -> Result<()>
where
    I: Iterator<Item = &'a EnrichedRecord>,
{
    let mut wtr = create_writer(path)?;
    let mut any = false;
    for record in records {
        wtr.serialize(ArtifactRow::from(record))?;
        any = true;
    }
    if !any {
        // serialize() emits the header with the first row only
        wtr.write_record(ARTIFACT_COLUMNS)?;
    }
    finish(wtr, path)
}

pub const ARTIFACT_COLUMNS: [&str; 9] = [
    "Company",
    "Peak Date",
    "Peak Price",
    "Status",
    "Category",
    "Sector",
    "Industry",
    "Market Cap (Cr)",
    "Market Cap Category",
];

fn write_counts(path: &Path, label: &str, counts: Vec<(String, usize)>) -> Result<()> {
    let mut wtr = create_writer(path)?;
    wtr.write_record([label, "Count"])?;
    for (name, count) in counts {
        wtr.write_record([name, count.to_string()])?;
    }
    finish(wtr, path)
}

fn write_pivot(path: &Path, pivot: &CategorySectorPivot) -> Result<()> {
    let mut wtr = create_writer(path)?;
    let mut header = vec!["Category".to_string()];
    header.extend(pivot.sectors.iter().cloned());
    wtr.write_record(&header)?;
    for (category, counts) in &pivot.rows {
        let mut row = vec![category.code().to_string()];
        row.extend(counts.iter().map(|c| c.to_string()));
        wtr.write_record(&row)?;
    }
    finish(wtr, path)
}

fn write_skipped(path: &Path, skipped: &[String]) -> Result<()> {
    let mut wtr = create_writer(path)?;
    wtr.write_record(["Skipped Ticker"])?;
    for symbol in skipped {
        wtr.write_record([symbol])?;
    }
    finish(wtr, path)
}

/// Logs the end-of-run summary.
pub fn log_summary(records: &[EnrichedRecord], skipped: usize) {
    let count = |c: Category| records.iter().filter(|r| r.record.category == c).count();
    info!("New ATH companies: {}", count(Category::NewAth));
    info!("Within 5% of ATH: {}", count(Category::Within5));
    info!("Within 10% of ATH: {}", count(Category::Within10));
    info!("Total qualifying companies: {}", records.len());
    info!("Skipped due to no data: {}", skipped);

    let caps: Vec<f64> = records.iter().filter_map(|r| r.market_cap).collect();
    if records.is_empty() {
        return;
    }
    info!(
        "Market cap success rate: {:.1}% ({} with data, {} without)",
        caps.len() as f64 / records.len() as f64 * 100.0,
        caps.len(),
        records.len() - caps.len()
    );
    if caps.len() > 5 {
        let large = caps.iter().filter(|&&c| c >= 20000.0).count();
        let mid = caps.iter().filter(|&&c| (5000.0..20000.0).contains(&c)).count();
        info!(
            "Distribution: Large Cap {}, Mid Cap {}, Small Cap {}",
            large,
            mid,
            caps.len() - large - mid
        );
    } else if caps.is_empty() {
        warn!("No market caps were found for this run");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScanRecord;

    fn record(company: &str, category: Category, sector: &str, cap: Option<f64>) -> EnrichedRecord {
        EnrichedRecord {
            record: ScanRecord {
                company: company.to_string(),
                peak_date: NaiveDate::from_ymd_opt(2025, 7, 15).unwrap(),
                peak_price: 100.0,
                category,
                sector: sector.to_string(),
                industry: format!("{} industry", sector),
            },
            market_cap: cap,
        }
    }

    fn names(records: &[EnrichedRecord]) -> Vec<&str> {
        records.iter().map(|r| r.record.company.as_str()).collect()
    }

    #[test]
    fn sorts_by_category_then_cap_with_absent_last() {
        let mut records = vec![
            record("E", Category::Within10, "IT", Some(1.0)),
            record("D", Category::NewAth, "IT", None),
            record("C", Category::NewAth, "IT", Some(50.0)),
            record("B", Category::Within5, "IT", Some(10.0)),
            record("A", Category::NewAth, "IT", Some(500.0)),
        ];
        sort_records(&mut records);
        assert_eq!(names(&records), vec!["A", "C", "D", "B", "E"]);
    }

    #[test]
    fn value_counts_orders_by_frequency() {
        let counts = value_counts(["IT", "Energy", "IT", "Auto", "Energy", "IT"]);
        assert_eq!(
            counts,
            vec![("IT".to_string(), 3), ("Energy".to_string(), 2), ("Auto".to_string(), 1)]
        );
    }

    #[test]
    fn pivot_zero_fills_missing_cells() {
        let records = vec![
            record("A", Category::NewAth, "IT", None),
            record("B", Category::Within10, "Auto", None),
            record("C", Category::NewAth, "IT", None),
        ];
        let pivot = category_sector_pivot(&records);
        assert_eq!(pivot.sectors, vec!["Auto", "IT"]);
        assert_eq!(
            pivot.rows,
            vec![(Category::NewAth, vec![0, 2]), (Category::Within10, vec![1, 0])]
        );
    }

    #[test]
    fn failed_derived_write_keeps_the_rest() {
        let dir = tempfile::TempDir::new().unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 7, 31).unwrap();
        fs::create_dir(dir.path().join("Sector_Counts_31_07_2025.csv")).unwrap();

        let mut records = vec![
            record("A", Category::NewAth, "IT", Some(100.0)),
            record("B", Category::Within5, "Auto", None),
        ];
        let written = write_run(dir.path(), date, &mut records, &["Z".to_string()]).unwrap();

        assert!(written.artifact.exists());
        assert_eq!(written.category_files.len(), 2);
        assert_eq!(written.failed.len(), 1);
        assert!(written.failed[0].contains("Sector_Counts_31_07_2025.csv"));
        for name in [
            "Industry_Counts_31_07_2025.csv",
            "Category_Sector_Analysis_31_07_2025.csv",
            "Skipped_Tickers_31_07_2025.csv",
        ] {
            assert!(dir.path().join(name).is_file(), "missing {}", name);
        }
        assert_eq!(written.derived_files.len(), 3);
    }
}

use std::fs;
use std::path::Path;
use tempfile::TempDir;

use ath_dashboard::error::PipelineError;
use ath_dashboard::models::{Category, PresenceStatus};
use ath_dashboard::services::matrix::{build_presence_matrix, latest_artifact};

const HEADER: &str =
    "Company,Peak Date,Peak Price,Status,Category,Sector,Industry,Market Cap (Cr),Market Cap Category\n";

fn write(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(name), body).unwrap();
}

fn artifact(dir: &Path, label: &str, rows: &[&str]) {
    let mut body = HEADER.to_string();
    for row in rows {
        body.push_str(row);
        body.push('\n');
    }
    write(dir, &format!("ATH_companies_with_market_cap_{}.csv", label), &body);
}

#[test]
fn presence_across_three_runs() {
    let dir = TempDir::new().unwrap();
    artifact(
        dir.path(),
        "31_01_2025",
        &["X,2025-01-20,120.0,New ATH,0,IT,Software,15234.0,Mid Cap"],
    );
    artifact(
        dir.path(),
        "28_02_2025",
        &["Y,2025-02-11,50.0,Within 5% of ATH,5,Energy,Oil,,Unknown"],
    );
    artifact(
        dir.path(),
        "31_03_2025",
        &["X,2025-03-03,118.0,Within 10% of ATH,10,IT,Software,14000.0,Mid Cap"],
    );
    // derived files in the same directory are not artifacts
    write(dir.path(), "Sector_Counts_31_03_2025.csv", "Sector,Count\nIT,1\n");

    let matrix = build_presence_matrix(dir.path()).unwrap();

    let labels: Vec<_> = matrix.dates.iter().map(|d| d.label.as_str()).collect();
    assert_eq!(labels, vec!["31_03_2025", "28_02_2025", "31_01_2025"]);
    assert_eq!(matrix.dates[0].display, "31 March 2025");

    let companies: Vec<_> = matrix.rows.iter().map(|r| r.company.as_str()).collect();
    assert_eq!(companies, vec!["X", "Y"]);

    let x_d3 = matrix.cell("X", "31_03_2025").unwrap();
    assert_eq!(x_d3.category, Some(Category::Within10));
    assert_eq!(x_d3.presence, PresenceStatus::Distant);
    assert_eq!(x_d3.status, "No");
    assert_eq!(x_d3.class, "within-10");

    let x_d2 = matrix.cell("X", "28_02_2025").unwrap();
    assert_eq!(x_d2.category, None);
    assert_eq!(x_d2.presence, PresenceStatus::NotPresent);

    let x_d1 = matrix.cell("X", "31_01_2025").unwrap();
    assert_eq!((x_d1.status, x_d1.class), ("Yes", "new-ath"));

    let y_d2 = matrix.cell("Y", "28_02_2025").unwrap();
    assert_eq!((y_d2.status, y_d2.class), ("Yes", "within-5"));

    assert_eq!(matrix.rows[0].market_cap, "₹15.2K Cr");
    assert_eq!(matrix.rows[1].market_cap, "N/A");
    assert!(matrix.skipped_files.is_empty());
}

#[test]
fn malformed_artifact_is_skipped_not_fatal() {
    let dir = TempDir::new().unwrap();
    artifact(
        dir.path(),
        "31_01_2025",
        &["X,2025-01-20,120.0,New ATH,0,IT,Software,15234.0,Mid Cap"],
    );
    write(
        dir.path(),
        "ATH_companies_with_market_cap_28_02_2025.csv",
        "Ticker,Price\nX,1\n",
    );

    let matrix = build_presence_matrix(dir.path()).unwrap();

    assert_eq!(matrix.total_dates(), 1);
    assert_eq!(matrix.total_companies(), 1);
    assert_eq!(matrix.skipped_files.len(), 1);
    assert!(matrix.skipped_files[0].ends_with("ATH_companies_with_market_cap_28_02_2025.csv"));
}

#[test]
fn legacy_headers_and_bad_rows() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "ATH_companies_with_market_cap_15_06_2024.csv",
        "Company Name,Status,Sector\nX,New ATH,nan\nnan,0,IT\nZ,maybe,IT\n",
    );

    let matrix = build_presence_matrix(dir.path()).unwrap();

    assert_eq!(matrix.total_companies(), 1);
    assert_eq!(matrix.rows[0].company, "X");
    assert_eq!(matrix.rows[0].sector, "N/A");
    assert_eq!(matrix.rows[0].industry, "N/A");
    assert_eq!(
        matrix.cell("X", "15_06_2024").unwrap().category,
        Some(Category::NewAth)
    );
}

#[test]
fn no_artifacts_is_no_data() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "notes.csv", "a,b\n1,2\n");

    match build_presence_matrix(dir.path()) {
        Err(PipelineError::NoData(message)) => assert_eq!(message, "No ATH CSV files found"),
        other => panic!("expected NoData, got {:?}", other),
    }
    assert!(matches!(latest_artifact(dir.path()), Err(PipelineError::NoData(_))));
}

#[test]
fn latest_is_chosen_by_filename_date() {
    let dir = TempDir::new().unwrap();
    artifact(dir.path(), "01_12_2024", &[]);
    artifact(dir.path(), "15_01_2025", &[]);
    artifact(dir.path(), "02_01_2025", &[]);

    assert_eq!(latest_artifact(dir.path()).unwrap().label, "15_01_2025");
}

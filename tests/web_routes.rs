use serde_json::Value;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use warp::http::StatusCode;

use ath_dashboard::handlers::AppState;
use ath_dashboard::routes::routes;

fn state(dir: &TempDir) -> Arc<AppState> {
    Arc::new(AppState {
        pipeline: None,
        artifact_dir: dir.path().to_path_buf(),
    })
}

fn seed_artifact(dir: &TempDir) {
    fs::write(
        dir.path().join("ATH_companies_with_market_cap_31_07_2025.csv"),
        "Company,Peak Date,Peak Price,Status,Category,Sector,Industry,Market Cap (Cr),Market Cap Category\n\
         TCS,2025-07-10,4100.5,New ATH,0,IT,Software,1500000.0,Large Cap\n",
    )
    .unwrap();
}

#[tokio::test]
async fn data_returns_latest_artifact_rows() {
    let dir = TempDir::new().unwrap();
    seed_artifact(&dir);

    let res = warp::test::request()
        .method("GET")
        .path("/api/ath/data")
        .reply(&routes(state(&dir)))
        .await;

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(body[0]["Company"], "TCS");
    assert_eq!(body[0]["Category"], 0);
    assert_eq!(body[0]["Market Cap Category"], "Large Cap");
}

#[tokio::test]
async fn data_without_artifacts_is_404() {
    let dir = TempDir::new().unwrap();

    let res = warp::test::request()
        .method("GET")
        .path("/api/ath/data")
        .reply(&routes(state(&dir)))
        .await;

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(body["error"], "No ATH data found");
}

#[tokio::test]
async fn matrix_reports_totals() {
    let dir = TempDir::new().unwrap();
    seed_artifact(&dir);

    let res = warp::test::request()
        .method("GET")
        .path("/api/ath/matrix")
        .reply(&routes(state(&dir)))
        .await;

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(body["total_companies"], 1);
    assert_eq!(body["total_dates"], 1);
    assert_eq!(body["matrix"]["rows"][0]["market_cap"], "₹1500.0K Cr");
    assert_eq!(body["matrix"]["rows"][0]["cells"][0]["class"], "new-ath");
}

#[tokio::test]
async fn refresh_without_pipeline_is_unavailable() {
    let dir = TempDir::new().unwrap();

    let res = warp::test::request()
        .method("POST")
        .path("/api/ath/refresh")
        .reply(&routes(state(&dir)))
        .await;

    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn refresh_requires_post() {
    let dir = TempDir::new().unwrap();

    let res = warp::test::request()
        .method("GET")
        .path("/api/ath/refresh")
        .reply(&routes(state(&dir)))
        .await;

    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
}

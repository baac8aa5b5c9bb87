// src/handlers/ath.rs
use log::{error, info, warn};
use serde_json::json;
use std::sync::Arc;
use warp::reply::Json;
use warp::Rejection;

use super::error::ApiError;
use super::AppState;
use crate::error::PipelineError;
use crate::services::matrix::{build_presence_matrix, latest_artifact, read_artifact_rows};

/// Runs the pipeline for today in the market timezone.
pub async fn refresh_ath(state: Arc<AppState>) -> Result<Json, Rejection> {
    let pipeline = state.pipeline.clone().ok_or_else(|| {
        warp::reject::custom(ApiError::unavailable(
            "ATH pipeline unavailable: reference table not loaded",
        ))
    })?;

    let today = pipeline.today();
    info!("Handling ATH refresh for {}", today);

    match pipeline.run(today).await {
        Ok(report) => Ok(warp::reply::json(&json!({
            "message": "Refreshed successfully",
            "file": report.file,
            "report": report,
        }))),
        Err(failure) => {
            error!("ATH refresh failed: {}", failure);
            Err(warp::reject::custom(ApiError::new(format!(
                "ATH refresh failed at {}: {}",
                failure.stage, failure.source
            ))))
        }
    }
}

/// Records of the most recent artifact.
pub async fn get_ath_data(state: Arc<AppState>) -> Result<Json, Rejection> {
    let latest = latest_artifact(&state.artifact_dir).map_err(|e| {
        warn!("No ATH data: {}", e);
        warp::reject::custom(ApiError::not_found("No ATH data found"))
    })?;

    let rows = read_artifact_rows(&latest.path).map_err(|e| {
        error!("Failed to read {}: {}", latest.path.display(), e);
        warp::reject::custom(ApiError::new(e.to_string()))
    })?;

    info!("Serving {} ATH records from {}", rows.len(), latest.label);
    Ok(warp::reply::json(&rows))
}

pub async fn get_ath_matrix(state: Arc<AppState>) -> Result<Json, Rejection> {
    match build_presence_matrix(&state.artifact_dir) {
        Ok(matrix) => Ok(warp::reply::json(&json!({
            "total_companies": matrix.total_companies(),
            "total_dates": matrix.total_dates(),
            "matrix": matrix,
        }))),
        Err(PipelineError::NoData(message)) => Err(warp::reject::custom(ApiError::not_found(message))),
        Err(e) => {
            warn!("Presence matrix unavailable: {}", e);
            Err(warp::reject::custom(ApiError::not_found("No ATH CSV files found")))
        }
    }
}

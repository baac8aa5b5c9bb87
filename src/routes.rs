// src/routes.rs
use log::info;
use std::convert::Infallible;
use std::sync::Arc;
use warp::reject::Rejection;
use warp::{Filter, Reply};

use crate::handlers::ath::{get_ath_data, get_ath_matrix, refresh_ath};
use crate::handlers::error::ApiError;
use crate::handlers::AppState;

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let code;
    let message;

    if err.is_not_found() {
        code = warp::http::StatusCode::NOT_FOUND;
        message = "Not Found".to_string();
    } else if let Some(api_error) = err.find::<ApiError>() {
        code = api_error.status;
        message = api_error.message.clone();
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        code = warp::http::StatusCode::METHOD_NOT_ALLOWED;
        message = "Method Not Allowed".to_string();
    } else {
        code = warp::http::StatusCode::INTERNAL_SERVER_ERROR;
        message = "Internal Server Error".to_string();
    }

    Ok(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({
            "error": message,
        })),
        code,
    ))
}

pub fn routes(state: Arc<AppState>) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    info!("Configuring routes...");

    let state_filter = warp::any().map(move || state.clone());

    let refresh_route = warp::path!("api" / "ath" / "refresh")
        .and(warp::post())
        .and(state_filter.clone())
        .and_then(refresh_ath);

    let data_route = warp::path!("api" / "ath" / "data")
        .and(warp::get())
        .and(state_filter.clone())
        .and_then(get_ath_data);

    let matrix_route = warp::path!("api" / "ath" / "matrix")
        .and(warp::get())
        .and(state_filter.clone())
        .and_then(get_ath_matrix);

    info!("All routes configured successfully.");

    refresh_route
        .or(data_route)
        .or(matrix_route)
        .recover(handle_rejection)
}

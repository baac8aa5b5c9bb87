use dotenv::dotenv;
use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use warp::Filter;

use ath_dashboard::config::AppConfig;
use ath_dashboard::handlers::AppState;
use ath_dashboard::routes;
use ath_dashboard::services::pipeline::Pipeline;

/// 06:00 IST on the first day of each quarter, expressed in UTC.
const QUARTERLY_SCHEDULE: &str = "0 30 0 1 1,4,7,10 *";

async fn start_scheduler(pipeline: Arc<Pipeline>) -> Option<JobScheduler> {
    let scheduler = match JobScheduler::new().await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create scheduler: {:?}", e);
            return None;
        }
    };

    let job = Job::new_async(QUARTERLY_SCHEDULE, move |_uuid, _lock| {
        let pipeline = pipeline.clone();
        Box::pin(async move {
            let today = pipeline.today();
            info!("Running quarterly ATH refresh for {}", today);
            match pipeline.run(today).await {
                Ok(report) => info!("Quarterly ATH refresh wrote {} ({} companies)", report.file, report.total()),
                Err(failure) => error!("Quarterly ATH refresh failed: {}", failure),
            }
        })
    });

    let job = match job {
        Ok(job) => job,
        Err(e) => {
            error!("Invalid quarterly schedule: {:?}", e);
            return None;
        }
    };

    if let Err(e) = scheduler.add(job).await {
        error!("Failed to register quarterly job: {:?}", e);
        return None;
    }
    if let Err(e) = scheduler.start().await {
        error!("Failed to start scheduler: {:?}", e);
        return None;
    }

    info!("Quarterly ATH refresh scheduled ({})", QUARTERLY_SCHEDULE);
    Some(scheduler)
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    info!("Logger initialized. Starting the application...");

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Using PORT: {}", config.port);

    let artifact_dir = config.artifact_dir.clone();
    let port = config.port;

    let pipeline = match Pipeline::from_config(config) {
        Ok(pipeline) => Some(Arc::new(pipeline)),
        Err(e) => {
            warn!("ATH pipeline disabled: {}", e);
            None
        }
    };

    let _scheduler = match &pipeline {
        Some(pipeline) => start_scheduler(pipeline.clone()).await,
        None => None,
    };

    let state = Arc::new(AppState {
        pipeline,
        artifact_dir,
    });

    // Bind to 0.0.0.0 for Heroku
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!("Will bind to: {}", addr);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_header("content-type")
        .allow_methods(vec!["GET", "POST"]);

    let api = routes::routes(state).with(cors);
    info!("Routes configured successfully with CORS.");

    info!("Starting server on {}", addr);
    warp::serve(api).run(addr).await;
}

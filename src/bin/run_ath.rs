use anyhow::{Context, Result};
use chrono::NaiveDate;
use dotenv::dotenv;
use log::info;
use std::env;

use ath_dashboard::config::AppConfig;
use ath_dashboard::services::pipeline::Pipeline;

/// Runs the ATH pipeline once: `run_ath [YYYY-MM-DD]`, defaulting to today.
#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let pipeline = Pipeline::from_config(config).context("failed to set up the ATH pipeline")?;

    let target = match env::args().nth(1) {
        Some(arg) => NaiveDate::parse_from_str(&arg, "%Y-%m-%d")
            .with_context(|| format!("target date must be YYYY-MM-DD, got {:?}", arg))?,
        None => pipeline.today(),
    };
    info!("Running ATH pipeline for {}", target);

    let report = pipeline.run(target).await?;

    println!("ATH run for {}", report.target_date);
    println!("  Artifact:           {}", report.artifact.display());
    println!("  New ATH:            {}", report.new_ath);
    println!("  Within 5% of ATH:   {}", report.within_5);
    println!("  Within 10% of ATH:  {}", report.within_10);
    println!("  With market cap:    {}/{}", report.with_market_cap, report.total());
    println!("  Skipped (no data):  {}", report.skipped.len());
    for failed in &report.failed_writes {
        println!("  Not written:        {}", failed);
    }
    Ok(())
}

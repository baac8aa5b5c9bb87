// src/services/pipeline.rs
use chrono::{NaiveDate, Utc};
use log::{error, info};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::error::{PipelineError, Result};
use crate::models::{Category, EvaluationWindow};
use crate::services::aggregator::{log_summary, write_run};
use crate::services::market_cap::{enrich, MarketCapSource, ScreenerClient, ScreenerOptions};
use crate::services::price_history::{PriceSource, YahooPriceSource};
use crate::services::rate_limiter::RateLimiter;
use crate::services::reference::ReferenceTable;
use crate::services::scanner::scan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Scan,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Stage::Scan => "ATH scan",
            Stage::Write => "artifact write",
        };
        write!(f, "{}", name)
    }
}

/// A run that stopped at `stage`.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: Stage,
    pub source: PipelineError,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.source)
    }
}

impl std::error::Error for StageFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub target_date: NaiveDate,
    pub file: String,
    pub artifact: PathBuf,
    pub new_ath: usize,
    pub within_5: usize,
    pub within_10: usize,
    pub with_market_cap: usize,
    pub skipped: Vec<String>,
    /// Derived files that could not be written.
    pub failed_writes: Vec<String>,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.new_ath + self.within_5 + self.within_10
    }
}

/// Scan -> enrich -> write for one target date, with every stage called in process.
/// Enrichment has no failure mode of its own: missing caps stay `None`.
pub struct Pipeline {
    config: AppConfig,
    reference: Arc<ReferenceTable>,
    prices: Arc<dyn PriceSource>,
    market_caps: Arc<dyn MarketCapSource>,
    run_lock: Mutex<()>,
}

impl Pipeline {
    pub fn new(
        config: AppConfig,
        reference: Arc<ReferenceTable>,
        prices: Arc<dyn PriceSource>,
        market_caps: Arc<dyn MarketCapSource>,
    ) -> Self {
        Pipeline {
            config,
            reference,
            prices,
            market_caps,
            run_lock: Mutex::new(()),
        }
    }

    /// Wires the Yahoo and screener clients, sharing one rate limiter across
    /// all market-cap workers.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let reference = ReferenceTable::load(&config.reference_table, &config.market_suffix)?;
        let prices = YahooPriceSource::new(config.yahoo_base_url.clone())?;
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let market_caps = ScreenerClient::new(
            config.screener_base_url.clone(),
            limiter,
            ScreenerOptions::default(),
        )?;
        Ok(Pipeline::new(
            config,
            Arc::new(reference),
            Arc::new(prices),
            Arc::new(market_caps),
        ))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Today's date in the market timezone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.config.market_timezone).date_naive()
    }

    /// Runs the whole pipeline for `target_end`. Concurrent calls queue up.
    pub async fn run(&self, target_end: NaiveDate) -> std::result::Result<RunReport, StageFailure> {
        let _guard = self.run_lock.lock().await;
        let window = EvaluationWindow::new(target_end);
        info!("Starting ATH pipeline for {}", target_end);

        if self.reference.is_empty() {
            return Err(self.fail(
                Stage::Scan,
                PipelineError::NoData("reference table has no tickers".into()),
            ));
        }

        let outcome = scan(
            &self.reference,
            self.prices.as_ref(),
            &window,
            &self.config.market_suffix,
            self.config.scan_workers,
        )
        .await;
        info!(
            "Scan finished: {} qualifying, {} not qualifying, {} skipped",
            outcome.records.len(),
            outcome.not_qualifying,
            outcome.skipped.len()
        );

        if outcome.records.is_empty() && outcome.skipped.len() == self.reference.len() {
            return Err(self.fail(
                Stage::Scan,
                PipelineError::NoData("price provider returned no data for any ticker".into()),
            ));
        }

        let mut enriched = enrich(
            outcome.records,
            self.market_caps.as_ref(),
            self.config.enrich_workers,
        )
        .await;

        let written = write_run(&self.config.artifact_dir, target_end, &mut enriched, &outcome.skipped)
            .map_err(|e| self.fail(Stage::Write, e))?;
        log_summary(&enriched, outcome.skipped.len());

        let count = |c: Category| enriched.iter().filter(|r| r.record.category == c).count();
        let file = written
            .artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        info!("Pipeline finished for {}: {}", target_end, file);
        Ok(RunReport {
            target_date: target_end,
            file,
            new_ath: count(Category::NewAth),
            within_5: count(Category::Within5),
            within_10: count(Category::Within10),
            with_market_cap: enriched.iter().filter(|r| r.market_cap.is_some()).count(),
            artifact: written.artifact,
            skipped: outcome.skipped,
            failed_writes: written.failed,
        })
    }

    fn fail(&self, stage: Stage, source: PipelineError) -> StageFailure {
        error!("{} failed: {}", stage, source);
        StageFailure { stage, source }
    }
}

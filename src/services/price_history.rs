// src/services/price_history.rs
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{PipelineError, Result};
use crate::models::{PricePoint, PriceSeries};

/// Source of daily OHLCV history.
///
/// Implementations never fail: transport, HTTP and format problems all come
/// back as an empty series so the caller sees a well-defined "no data".
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> PriceSeries;
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Option<ChartResult>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

/// Yahoo Finance v8 chart API.
#[derive(Debug, Clone)]
pub struct YahooPriceSource {
    client: Client,
    base_url: String,
}

impl YahooPriceSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0")
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(YahooPriceSource {
            client,
            base_url: base_url.into(),
        })
    }

    async fn try_fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<PriceSeries> {
        let (period1, period2) = unix_range(start, end);
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), symbol);
        debug!("Fetching {} from {} ({} -> {})", symbol, url, start, end);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
                ("includePrePost", "true".to_string()),
                ("events", "div,split".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Status(status));
        }

        let body = response.text().await?;
        parse_chart(&body)
    }
}

#[async_trait]
impl PriceSource for YahooPriceSource {
    async fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> PriceSeries {
        match self.try_fetch(symbol, start, end).await {
            Ok(series) => series,
            Err(e) => {
                warn!("Error fetching Yahoo data for {}: {}", symbol, e);
                PriceSeries::empty()
            }
        }
    }
}

/// Start of `start` to end of `end`, as UNIX seconds.
pub fn unix_range(start: NaiveDate, end: NaiveDate) -> (i64, i64) {
    let from = start.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp()).unwrap_or(0);
    let to = end
        .and_hms_opt(23, 59, 59)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(from);
    (from, to)
}

/// Parses a chart response body. A body without the expected structure is
/// "no data" (empty series); only undecodable JSON is an error.
pub fn parse_chart(body: &str) -> Result<PriceSeries> {
    let response: ChartResponse = serde_json::from_str(body)
        .map_err(|e| PipelineError::Format(format!("chart response: {}", e)))?;

    let data = match response
        .chart
        .and_then(|c| c.result)
        .and_then(|r| r.into_iter().next())
    {
        Some(data) => data,
        None => return Ok(PriceSeries::empty()),
    };

    let (timestamps, quote) = match (
        data.timestamp,
        data.indicators.and_then(|i| i.quote.into_iter().next()),
    ) {
        (Some(ts), Some(q)) => (ts, q),
        _ => return Ok(PriceSeries::empty()),
    };

    let at = |column: &[Option<f64>], i: usize| column.get(i).copied().flatten().filter(|v| v.is_finite());

    let points = timestamps
        .iter()
        .enumerate()
        .filter_map(|(i, &ts)| {
            // rows with any missing field are dropped
            Some(PricePoint {
                date: DateTime::from_timestamp(ts, 0)?.date_naive(),
                open: at(&quote.open, i)?,
                high: at(&quote.high, i)?,
                low: at(&quote.low, i)?,
                close: at(&quote.close, i)?,
                volume: at(&quote.volume, i)? as u64,
            })
        })
        .collect();

    Ok(PriceSeries::new(points))
}

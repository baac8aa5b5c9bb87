// src/services/scanner.rs
use futures::stream::{self, StreamExt};
use log::{info, warn};

use crate::models::{EvaluationWindow, ScanRecord, Ticker};
use crate::services::classifier::classify;
use crate::services::price_history::PriceSource;
use crate::services::reference::ReferenceTable;

/// Everything one scan produced. Record order is completion order.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub records: Vec<ScanRecord>,
    /// Base symbols for which the provider returned no data.
    pub skipped: Vec<String>,
    /// Tickers with data that did not qualify.
    pub not_qualifying: usize,
}

enum TickerOutcome {
    Qualified(ScanRecord),
    NotQualifying,
    NoData(String),
}

/// Fetches and classifies every ticker of the universe, `workers` at a time.
pub async fn scan<P>(
    universe: &ReferenceTable,
    source: &P,
    window: &EvaluationWindow,
    market_suffix: &str,
    workers: usize,
) -> ScanOutcome
where
    P: PriceSource + ?Sized,
{
    info!(
        "Scanning {} tickers for {} with {} workers",
        universe.len(),
        window.target_end,
        workers
    );

    // collected eagerly so the scan future stays Send
    let pending: Vec<_> = universe
        .tickers()
        .iter()
        .map(|ticker| scan_ticker(ticker, universe, source, window, market_suffix))
        .collect();
    let mut outcomes = stream::iter(pending).buffer_unordered(workers.max(1));

    let mut result = ScanOutcome::default();
    while let Some(outcome) = outcomes.next().await {
        match outcome {
            TickerOutcome::Qualified(record) => {
                info!(
                    "{} - {} on {} (₹{})",
                    record.company, record.category, record.peak_date, record.peak_price
                );
                result.records.push(record);
            }
            TickerOutcome::NotQualifying => result.not_qualifying += 1,
            TickerOutcome::NoData(symbol) => {
                warn!("No data for {}", symbol);
                result.skipped.push(symbol);
            }
        }
    }

    result
}

async fn scan_ticker<P>(
    ticker: &Ticker,
    universe: &ReferenceTable,
    source: &P,
    window: &EvaluationWindow,
    market_suffix: &str,
) -> TickerOutcome
where
    P: PriceSource + ?Sized,
{
    let provider_symbol = format!("{}{}", ticker.symbol, market_suffix);
    let series = source
        .fetch(&provider_symbol, window.fetch_start(), window.target_end)
        .await;

    if series.is_empty() {
        return TickerOutcome::NoData(ticker.symbol.clone());
    }

    match classify(&series, window) {
        Some(result) => {
            let (sector, industry) = universe.classification_of(&ticker.symbol);
            TickerOutcome::Qualified(ScanRecord {
                company: ticker.symbol.clone(),
                peak_date: result.peak_date,
                peak_price: round2(result.peak_price),
                category: result.category,
                sector,
                industry,
            })
        }
        None => TickerOutcome::NotQualifying,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, PricePoint, PriceSeries};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    struct FixedPrices(HashMap<String, PriceSeries>);

    #[async_trait]
    impl PriceSource for FixedPrices {
        async fn fetch(&self, symbol: &str, _start: NaiveDate, _end: NaiveDate) -> PriceSeries {
            self.0.get(symbol).cloned().unwrap_or_default()
        }
    }

    fn series(history_close: f64, target_close: f64) -> PriceSeries {
        let p = |date: NaiveDate, close: f64| PricePoint {
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 10,
        };
        PriceSeries::new(vec![
            p(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), history_close),
            p(NaiveDate::from_ymd_opt(2025, 7, 10).unwrap(), target_close),
        ])
    }

    fn ticker(symbol: &str) -> Ticker {
        Ticker {
            symbol: symbol.to_string(),
            sector: "Tech".to_string(),
            industry: "Software".to_string(),
        }
    }

    #[tokio::test]
    async fn collects_qualifying_and_skipped_tickers() {
        let universe = ReferenceTable::from_tickers(vec![ticker("A"), ticker("B"), ticker("C"), ticker("D")]);
        let mut prices = HashMap::new();
        prices.insert("A.NS".to_string(), series(100.0, 110.456));
        prices.insert("B.NS".to_string(), series(100.0, 94.0));
        prices.insert("C.NS".to_string(), series(100.0, 80.0));
        let source = FixedPrices(prices);
        let window = EvaluationWindow::new(NaiveDate::from_ymd_opt(2025, 7, 31).unwrap());

        let outcome = scan(&universe, &source, &window, ".NS", 3).await;

        let mut records = outcome.records;
        records.sort_by(|a, b| a.company.cmp(&b.company));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].company, "A");
        assert_eq!(records[0].category, Category::NewAth);
        assert_eq!(records[0].peak_price, 110.46);
        assert_eq!(records[0].sector, "Tech");
        assert_eq!(records[1].category, Category::Within10);
        assert_eq!(outcome.skipped, vec!["D".to_string()]);
        assert_eq!(outcome.not_qualifying, 1);
    }
}

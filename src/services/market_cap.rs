// src/services/market_cap.rs
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use rand::Rng;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION};
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::models::{EnrichedRecord, ScanRecord};
use crate::services::rate_limiter::RateLimiter;

lazy_static! {
    static ref VALUE_AND_UNIT: Regex = Regex::new(r"(\d+(?:\.\d+)?)([A-Z]*)").unwrap();
    static ref TOP_RATIO_CAP: Regex =
        Regex::new(r"₹[^0-9]*[\d,]+(?:\.\d+)?\s*(?:Cr\.?|Crore)").unwrap();
    static ref PAGE_TEXT_CAP: Regex =
        Regex::new(r"Market Cap[^₹]*₹[^0-9]*[\d,]+(?:\.\d+)?\s*Cr\.?").unwrap();
    static ref TOP_RATIOS: Selector = Selector::parse("ul#top-ratios li").unwrap();
    static ref NON_ALPHANUMERIC: Regex = Regex::new(r"[^A-Z0-9]").unwrap();
}

/// Parses free-form market-cap text into crore.
///
/// Lakh and thousand figures are scaled down, lakh crore scaled up, crore and
/// unit-less figures are taken as-is. Missing, unparseable or zero values are `None`, never `0.0`.
pub fn parse_market_cap(text: &str) -> Option<f64> {
    if text.trim().is_empty() || text.trim() == "Not Available" {
        return None;
    }

    let cleaned = text
        .replace(',', "")
        .replace(char::is_whitespace, "")
        .replace('₹', "")
        .replace("Rs", "")
        .to_uppercase();

    let caps = VALUE_AND_UNIT.captures(&cleaned)?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps.get(2).map_or("", |m| m.as_str());

    let crore = if unit.contains("LAKH") && unit.contains("CR") {
        value * 100_000.0
    } else if unit.contains("LAKH") {
        value / 100.0
    } else if unit.contains("CR") {
        value
    } else if unit.contains("THOUSAND") {
        value / 10_000.0
    } else {
        value
    };

    if crore > 0.0 && crore.is_finite() {
        Some(crore)
    } else {
        None
    }
}

/// Pulls the market cap out of a company page: the top-ratios list first,
/// then the page text as a whole.
pub fn extract_market_cap(html: &str) -> Option<f64> {
    let document = Html::parse_document(html);

    let from_ratios = document
        .select(&TOP_RATIOS)
        .map(|li| li.text().map(str::trim).collect::<Vec<_>>().join(" "))
        .filter(|text| text.contains("Market Cap"))
        .find_map(|text| {
            TOP_RATIO_CAP
                .find(&text)
                .and_then(|m| parse_market_cap(m.as_str()))
        });

    from_ratios.or_else(|| {
        let page_text = document.root_element().text().collect::<Vec<_>>().join(" ");
        PAGE_TEXT_CAP
            .find(&page_text)
            .and_then(|m| parse_market_cap(m.as_str()))
    })
}

/// Symbol in the form the market-cap site uses in its URLs.
pub fn clean_symbol(ticker: &str) -> String {
    let upper = ticker.to_uppercase().replace(".NS", "").replace(".BO", "");
    NON_ALPHANUMERIC.replace_all(&upper, "").into_owned()
}

/// Current market capitalization lookup, in crore.
#[async_trait]
pub trait MarketCapSource: Send + Sync {
    async fn market_cap(&self, symbol: &str) -> Option<f64>;
}

#[derive(Debug, Clone)]
pub struct ScreenerOptions {
    pub timeout: Duration,
    /// Random pause before each request, in seconds.
    pub jitter: Range<f64>,
    /// Random pause before the single retry after a 429, in seconds.
    pub backoff: Range<f64>,
}

impl Default for ScreenerOptions {
    fn default() -> Self {
        ScreenerOptions {
            timeout: Duration::from_secs(12),
            jitter: 0.5..1.2,
            backoff: 8.0..12.0,
        }
    }
}

/// Scrapes company pages, consolidated view first, standalone view second.
pub struct ScreenerClient {
    client: Client,
    base_url: String,
    limiter: Arc<RateLimiter>,
    options: ScreenerOptions,
}

impl ScreenerClient {
    pub fn new(base_url: impl Into<String>, limiter: Arc<RateLimiter>, options: ScreenerOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert("upgrade-insecure-requests", HeaderValue::from_static("1"));

        let client = Client::builder()
            .user_agent(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            )
            .default_headers(headers)
            .timeout(options.timeout)
            .build()?;

        Ok(ScreenerClient {
            client,
            base_url: base_url.into(),
            limiter,
            options,
        })
    }

    fn page_urls(&self, symbol: &str) -> [String; 2] {
        let base = self.base_url.trim_end_matches('/');
        let clean = clean_symbol(symbol);
        [
            format!("{}/{}/consolidated/", base, clean),
            format!("{}/{}/", base, clean),
        ]
    }

    async fn pause(range: &Range<f64>) {
        if range.is_empty() {
            return;
        }
        let secs = rand::thread_rng().gen_range(range.clone());
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }

    /// Page body on 200, `None` on any other outcome. A 429 gets exactly one
    /// retry after a randomized backoff.
    async fn fetch_page(&self, url: &str) -> Option<String> {
        self.limiter.acquire().await;
        Self::pause(&self.options.jitter).await;

        let mut response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!("Request to {} failed: {}", url, e);
                return None;
            }
        };

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            warn!("429 from {}, backing off before one retry", url);
            Self::pause(&self.options.backoff).await;
            self.limiter.acquire().await;
            response = match self.client.get(url).send().await {
                Ok(r) => r,
                Err(e) => {
                    debug!("Retry to {} failed: {}", url, e);
                    return None;
                }
            };
        }

        if response.status() != StatusCode::OK {
            debug!("{} returned {}", url, response.status());
            return None;
        }

        response.text().await.ok()
    }
}

#[async_trait]
impl MarketCapSource for ScreenerClient {
    async fn market_cap(&self, symbol: &str) -> Option<f64> {
        for url in self.page_urls(symbol) {
            if let Some(body) = self.fetch_page(&url).await {
                if let Some(cap) = extract_market_cap(&body) {
                    return Some(cap);
                }
            }
        }
        None
    }
}

/// Looks up a market cap for every record, `workers` at a time. Records
/// without a market cap are kept with `market_cap: None`.
pub async fn enrich<S>(records: Vec<ScanRecord>, source: &S, workers: usize) -> Vec<EnrichedRecord>
where
    S: MarketCapSource + ?Sized,
{
    let total = records.len();
    let started = Instant::now();
    info!("Processing {} companies with {} workers...", total, workers);

    let mut lookups = stream::iter(records)
        .map(|record| async move {
            let market_cap = source.market_cap(&record.company).await;
            match market_cap {
                Some(cap) => info!("{}: ₹{:.0} Cr", record.company, cap),
                None => warn!("{}: Market Cap not found", record.company),
            }
            EnrichedRecord { record, market_cap }
        })
        .buffer_unordered(workers.max(1));

    let mut enriched = Vec::with_capacity(total);
    while let Some(record) = lookups.next().await {
        enriched.push(record);
        let done = enriched.len();
        if done % 25 == 0 || done == total {
            let elapsed = started.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 { done as f64 / elapsed } else { 0.0 };
            info!(
                "Progress: {}/{} ({:.1}%) - Rate: {:.1}/min",
                done,
                total,
                done as f64 / total as f64 * 100.0,
                rate * 60.0
            );
        }
    }

    enriched
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_crore_lakh_and_thousand() {
        assert_eq!(parse_market_cap("₹1,234.5 Cr"), Some(1234.5));
        assert_eq!(parse_market_cap("₹12 Lakh"), Some(0.12));
        assert_eq!(parse_market_cap("Rs. 5,00,000 Thousand"), Some(50.0));
        assert_eq!(parse_market_cap("₹ 2,10,567 Crore"), Some(210567.0));
        assert_eq!(parse_market_cap("Market Cap ₹ 9,876 Cr."), Some(9876.0));
        assert_eq!(parse_market_cap("₹1.5 Lakh Crore"), Some(150_000.0));
        assert_eq!(parse_market_cap("₹2 Lakh Cr."), Some(200_000.0));
    }

    #[test]
    fn unparseable_is_absent_never_zero() {
        assert_eq!(parse_market_cap("Not Available"), None);
        assert_eq!(parse_market_cap(""), None);
        assert_eq!(parse_market_cap("₹ -- Cr"), None);
        assert_eq!(parse_market_cap("₹0 Cr"), None);
    }

    #[test]
    fn extracts_from_top_ratios() {
        let html = r#"<html><body>
            <ul id="top-ratios">
              <li class="flex flex-space-between"><span class="name">Current Price</span><span>₹ 3,400</span></li>
              <li class="flex flex-space-between">
                <span class="name">Market Cap</span>
                <span class="nowrap value">₹ <span class="number">12,34,567</span> Cr.</span>
              </li>
            </ul></body></html>"#;
        assert_eq!(extract_market_cap(html), Some(1234567.0));
    }

    #[test]
    fn falls_back_to_page_text() {
        let html = "<html><body><div><p>Market Cap</p><p>₹ 4,321.75 Cr.</p></div></body></html>";
        assert_eq!(extract_market_cap(html), Some(4321.75));
    }

    #[test]
    fn page_without_market_cap_is_absent() {
        assert_eq!(extract_market_cap("<html><body>Page not found</body></html>"), None);
    }

    #[test]
    fn cleans_symbols_for_urls() {
        assert_eq!(clean_symbol("m&m.NS"), "MM");
        assert_eq!(clean_symbol("bajaj-auto.bo"), "BAJAJAUTO");
        assert_eq!(clean_symbol("TCS"), "TCS");
    }
}

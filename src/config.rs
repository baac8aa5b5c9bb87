// src/config.rs
use chrono_tz::Tz;
use log::warn;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{PipelineError, Result};

pub const DEFAULT_YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
pub const DEFAULT_SCREENER_BASE_URL: &str = "https://www.screener.in/company";

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests_per_minute: usize,
    pub burst_size: usize,
    pub burst_window: Duration,
    pub minute_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            max_requests_per_minute: 25,
            burst_size: 8,
            burst_window: Duration::from_secs(10),
            minute_window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Where run artifacts are written and read back from.
    pub artifact_dir: PathBuf,
    pub reference_table: PathBuf,
    /// Appended to base symbols for the price provider, stripped from the reference table.
    pub market_suffix: String,
    pub scan_workers: usize,
    pub enrich_workers: usize,
    pub rate_limit: RateLimitConfig,
    pub yahoo_base_url: String,
    pub screener_base_url: String,
    pub market_timezone: Tz,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            port: 8080,
            artifact_dir: PathBuf::from("csv"),
            reference_table: PathBuf::from("csv/tickers.csv"),
            market_suffix: ".NS".to_string(),
            scan_workers: 8,
            enrich_workers: 4,
            rate_limit: RateLimitConfig::default(),
            yahoo_base_url: DEFAULT_YAHOO_BASE_URL.to_string(),
            screener_base_url: DEFAULT_SCREENER_BASE_URL.to_string(),
            market_timezone: chrono_tz::Asia::Kolkata,
        }
    }
}

impl AppConfig {
    /// Reads the process environment; call `dotenv().ok()` first to pick up `.env`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AppConfig::default();

        let port = parse_var(&lookup, "PORT", defaults.port)?;
        let scan_workers = parse_var(&lookup, "SCAN_WORKERS", defaults.scan_workers)?;
        let enrich_workers = parse_var(&lookup, "ENRICH_WORKERS", defaults.enrich_workers)?;
        let max_requests_per_minute = parse_var(
            &lookup,
            "MARKET_CAP_MAX_PER_MINUTE",
            defaults.rate_limit.max_requests_per_minute,
        )?;
        let burst_size = parse_var(&lookup, "MARKET_CAP_BURST", defaults.rate_limit.burst_size)?;

        if scan_workers == 0 || enrich_workers == 0 {
            return Err(PipelineError::Config("worker counts must be at least 1".into()));
        }
        if burst_size == 0 || max_requests_per_minute == 0 {
            return Err(PipelineError::Config("rate limits must be at least 1".into()));
        }

        let market_timezone = match lookup("MARKET_TIMEZONE") {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|e| PipelineError::Config(format!("MARKET_TIMEZONE: {}", e)))?,
            None => defaults.market_timezone,
        };

        Ok(AppConfig {
            port,
            artifact_dir: lookup("ARTIFACT_DIR").map(PathBuf::from).unwrap_or(defaults.artifact_dir),
            reference_table: lookup("REFERENCE_TABLE")
                .map(PathBuf::from)
                .unwrap_or(defaults.reference_table),
            market_suffix: lookup("MARKET_SUFFIX").unwrap_or(defaults.market_suffix),
            scan_workers,
            enrich_workers,
            rate_limit: RateLimitConfig {
                max_requests_per_minute,
                burst_size,
                ..defaults.rate_limit
            },
            yahoo_base_url: lookup("YAHOO_BASE_URL").unwrap_or(defaults.yahoo_base_url),
            screener_base_url: lookup("SCREENER_BASE_URL").unwrap_or(defaults.screener_base_url),
            market_timezone,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| PipelineError::Config(format!("{} must be a number, got '{}'", key, raw))),
        None => {
            if key == "PORT" {
                warn!("$PORT not set, defaulting to {}", default);
            }
            Ok(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = AppConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.market_suffix, ".NS");
        assert_eq!(config.rate_limit.burst_size, 8);
        assert_eq!(config.rate_limit.max_requests_per_minute, 25);
        assert_eq!(config.market_timezone, chrono_tz::Asia::Kolkata);
    }

    #[test]
    fn overrides_are_applied() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("PORT", "9000"),
            ("ARTIFACT_DIR", "/tmp/ath"),
            ("SCAN_WORKERS", "2"),
            ("MARKET_CAP_BURST", "3"),
            ("MARKET_TIMEZONE", "UTC"),
        ]))
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.artifact_dir, PathBuf::from("/tmp/ath"));
        assert_eq!(config.scan_workers, 2);
        assert_eq!(config.rate_limit.burst_size, 3);
        assert_eq!(config.market_timezone, chrono_tz::UTC);
    }

    #[test]
    fn bad_numbers_are_config_errors() {
        let err = AppConfig::from_lookup(lookup_from(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        let err = AppConfig::from_lookup(lookup_from(&[("ENRICH_WORKERS", "0")])).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}

use anyhow::{bail, Result};
use dotenv::dotenv;
use log::{error, info};
use std::env;
use std::sync::Arc;

use ath_dashboard::config::AppConfig;
use ath_dashboard::services::market_cap::{clean_symbol, MarketCapSource, ScreenerClient, ScreenerOptions};
use ath_dashboard::services::rate_limiter::RateLimiter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();

    let symbol = match env::args().nth(1) {
        Some(s) => s,
        None => bail!("usage: debug_market_cap SYMBOL"),
    };

    let config = AppConfig::from_env()?;
    let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
    let client = ScreenerClient::new(config.screener_base_url.clone(), limiter, ScreenerOptions::default())?;

    info!("Looking up market cap for {} ({})", symbol, clean_symbol(&symbol));
    match client.market_cap(&symbol).await {
        Some(cap) => println!("{}: ₹{:.2} Cr", symbol, cap),
        None => {
            error!("Market cap not found for {}", symbol);
            println!("{}: Market Cap not found", symbol);
        }
    }
    Ok(())
}

// src/services/reference.rs
use csv::{Reader, StringRecord};
use log::{info, warn};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::models::Ticker;

pub const UNKNOWN: &str = "Unknown";

const TICKER_COLUMNS: &[&str] = &["Stock Ticker", "Ticker", "Symbol"];
const SECTOR_COLUMNS: &[&str] = &["Sector"];
const INDUSTRY_COLUMNS: &[&str] = &["Industry"];

/// Ticker -> sector/industry table, loaded once and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    tickers: Vec<Ticker>,
    index: HashMap<String, usize>,
}

impl ReferenceTable {
    pub fn load(path: &Path, market_suffix: &str) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| PipelineError::io(path, e))?;
        let table = Self::from_reader(file, market_suffix, path)?;
        info!("Loaded {} tickers from {}", table.len(), path.display());
        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R, market_suffix: &str, source: &Path) -> Result<Self> {
        let mut rdr = Reader::from_reader(reader);
        let headers = rdr.headers()?.clone();

        let ticker_idx = required_column(&headers, TICKER_COLUMNS, "Stock Ticker", source)?;
        let sector_idx = required_column(&headers, SECTOR_COLUMNS, "Sector", source)?;
        let industry_idx = required_column(&headers, INDUSTRY_COLUMNS, "Industry", source)?;

        let mut table = ReferenceTable::default();
        for (line, record) in rdr.records().enumerate() {
            let row = match record {
                Ok(row) => row,
                Err(e) => {
                    warn!("Skipping malformed reference row {}: {}", line + 2, e);
                    continue;
                }
            };

            let symbol = base_symbol(row.get(ticker_idx).unwrap_or(""), market_suffix);
            if symbol.is_empty() {
                warn!("Skipping reference row {} with empty ticker", line + 2);
                continue;
            }
            if table.index.contains_key(&symbol) {
                continue;
            }

            table.index.insert(symbol.clone(), table.tickers.len());
            table.tickers.push(Ticker {
                symbol,
                sector: cell_or_unknown(&row, sector_idx),
                industry: cell_or_unknown(&row, industry_idx),
            });
        }

        Ok(table)
    }

    pub fn from_tickers(tickers: impl IntoIterator<Item = Ticker>) -> Self {
        let mut table = ReferenceTable::default();
        for ticker in tickers {
            if table.index.contains_key(&ticker.symbol) {
                continue;
            }
            table.index.insert(ticker.symbol.clone(), table.tickers.len());
            table.tickers.push(ticker);
        }
        table
    }

    /// Tickers in first-occurrence order.
    pub fn tickers(&self) -> &[Ticker] {
        &self.tickers
    }

    pub fn get(&self, symbol: &str) -> Option<&Ticker> {
        self.index.get(symbol).map(|&i| &self.tickers[i])
    }

    /// (sector, industry), "Unknown" for tickers not in the table.
    pub fn classification_of(&self, symbol: &str) -> (String, String) {
        match self.get(symbol) {
            Some(t) => (t.sector.clone(), t.industry.clone()),
            None => (UNKNOWN.to_string(), UNKNOWN.to_string()),
        }
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }
}

/// Trimmed ticker with the market suffix removed.
pub fn base_symbol(raw: &str, market_suffix: &str) -> String {
    let trimmed = raw.trim();
    if market_suffix.is_empty() {
        return trimmed.to_string();
    }
    trimmed.replace(market_suffix, "")
}

/// Index of the first header matching any alias, in alias priority order.
pub(crate) fn find_column(headers: &StringRecord, aliases: &[&str]) -> Option<usize> {
    aliases
        .iter()
        .find_map(|alias| headers.iter().position(|h| h.trim() == *alias))
}

fn required_column(
    headers: &StringRecord,
    aliases: &[&str],
    column: &'static str,
    source: &Path,
) -> Result<usize> {
    find_column(headers, aliases).ok_or_else(|| PipelineError::MissingColumn {
        column,
        path: source.to_path_buf(),
    })
}

fn cell_or_unknown(row: &StringRecord, idx: usize) -> String {
    match row.get(idx).map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => UNKNOWN.to_string(),
    }
}

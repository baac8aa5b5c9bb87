// src/services/mod.rs
pub mod aggregator;
pub mod classifier;
pub mod market_cap;
pub mod matrix;
pub mod pipeline;
pub mod price_history;
pub mod rate_limiter;
pub mod reference;
pub mod scanner;

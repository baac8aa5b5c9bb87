// src/services/classifier.rs
use crate::models::{Category, ClassificationResult, EvaluationWindow, PriceSeries};

pub const WITHIN_5_RATIO: f64 = 0.95;
pub const WITHIN_10_RATIO: f64 = 0.90;

/// Classifies the target-span peak close against the trailing 5-year high.
///
/// Returns `None` when either span has no data or the peak is more than 10%
/// below the historical high.
pub fn classify(series: &PriceSeries, window: &EvaluationWindow) -> Option<ClassificationResult> {
    let mut historical_ath: Option<f64> = None;
    let mut peak: Option<(chrono::NaiveDate, f64)> = None;

    for point in series.points() {
        if window.in_history(point.date) {
            historical_ath = Some(historical_ath.map_or(point.close, |h| h.max(point.close)));
        } else if window.in_target(point.date) {
            // points are date-ordered, so >= keeps the latest date on ties
            match peak {
                Some((_, best)) if point.close < best => {}
                _ => peak = Some((point.date, point.close)),
            }
        }
    }

    let historical_ath = historical_ath?;
    let (peak_date, peak_price) = peak?;
    let category = categorize(peak_price, historical_ath)?;

    Some(ClassificationResult {
        peak_date,
        peak_price,
        historical_ath,
        category,
    })
}

/// Strictly above the high is a new ATH; the 5% and 10% bands are inclusive.
pub fn categorize(peak: f64, historical_ath: f64) -> Option<Category> {
    if peak > historical_ath {
        Some(Category::NewAth)
    } else if peak >= historical_ath * WITHIN_5_RATIO {
        Some(Category::Within5)
    } else if peak >= historical_ath * WITHIN_10_RATIO {
        Some(Category::Within10)
    } else {
        None
    }
}

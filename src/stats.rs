//! Volatility estimates over a raw price series.
//!
//! Both functions return `None` when the estimate is undefined: fewer than two
//! prices, or a zero price that would make a return infinite.

use crate::config::TRADING_DAYS;

/// Population standard deviation (divides by N).
fn population_std(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt())
}

fn has_zero(prices: &[f64]) -> bool {
    prices.iter().any(|&p| p == 0.0)
}

/// Standard deviation of simple period-over-period returns, in percent.
pub fn short_volatility(prices: &[f64]) -> Option<f64> {
    if prices.len() < 2 || has_zero(prices) {
        return None;
    }
    let returns: Vec<f64> = prices.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect();
    population_std(&returns).map(|std| std * 100.0)
}

/// Annualized standard deviation of log returns, in percent.
pub fn historical_volatility(prices: &[f64]) -> Option<f64> {
    if prices.len() < 2 || has_zero(prices) {
        return None;
    }
    let log_returns: Vec<f64> = prices.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
    population_std(&log_returns).map(|std| std * TRADING_DAYS.sqrt() * 100.0)
}

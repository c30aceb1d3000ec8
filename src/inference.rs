use candle_core::Device;
use tracing::debug;

use crate::config::{DECAY_SCALE, MAX_SHORT_VOL_PERCENT};
use crate::error::{Error, Result};
use crate::models::feed_forward::FeedForward;
use crate::progress::{Progress, ProgressSink};
use crate::stats;

/// Anything that maps a normalized window to the next normalized value.
pub trait StepModel {
    fn step(&self, window: &[f64]) -> Result<f64>;
}

/// A trained network bound to the device its weights live on.
pub struct DeviceModel<'a> {
    pub net: &'a FeedForward,
    pub device: &'a Device,
}

impl StepModel for DeviceModel<'_> {
    fn step(&self, window: &[f64]) -> Result<f64> {
        Ok(self.net.run(window, self.device)?)
    }
}

/// Blend weight for forecast step `step`.
pub fn decay(step: usize) -> f64 {
    (-(step as f64) / DECAY_SCALE).exp()
}

/// Projects `horizon` steps ahead in normalized space.
///
/// The running prediction starts at `start` and is blended with each step's
/// output using a weight that decays with the step index. The blended value is
/// appended to the window, which drops its oldest element to keep its length.
pub fn recursive_forecast<M: StepModel, S: ProgressSink>(
    model: &M,
    window: &[f64],
    start: f64,
    horizon: usize,
    sink: &mut S,
) -> Result<f64> {
    let mut input = window.to_vec();
    let mut prediction = start;

    for i in 0..horizon {
        let output = model.step(&input)?;
        let weight = decay(i);
        prediction = prediction * (1.0 - weight) + output * weight;
        if !prediction.is_finite() {
            return Err(Error::NonFinite { stage: "forecast" });
        }

        if !input.is_empty() {
            input.remove(0);
            input.push(prediction);
        }

        debug!(
            "Step {}: output={:.6} weight={:.4} blended={:.6}",
            i + 1,
            output,
            weight,
            prediction
        );
        sink.report(Progress::Forecasting {
            step: i + 1,
            total: horizon,
        });
    }

    Ok(prediction)
}

/// Symmetric band around the current price derived from recent and
/// historical volatility.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VolatilityBand {
    pub current_price: f64,
    /// Short volatility of the recent window, in percent
    pub short_volatility: f64,
    /// Annualized volatility of the whole series, in percent
    pub historical_volatility: f64,
    /// Largest allowed distance from the current price
    pub half_width: f64,
}

impl VolatilityBand {
    pub fn new(current_price: f64, recent_prices: &[f64], all_prices: &[f64]) -> Result<Self> {
        if !current_price.is_finite() || current_price <= 0.0 {
            return Err(Error::Validation(format!(
                "current price must be positive, got {}",
                current_price
            )));
        }
        let short_volatility = stats::short_volatility(recent_prices).ok_or_else(|| {
            Error::Validation("short volatility is undefined for the recent prices".into())
        })?;
        let historical_volatility = stats::historical_volatility(all_prices).ok_or_else(|| {
            Error::Validation("historical volatility is undefined for the price series".into())
        })?;

        let cap = current_price * short_volatility.min(MAX_SHORT_VOL_PERCENT) / 100.0;
        let hist_cap = current_price * historical_volatility / 100.0;

        Ok(Self {
            current_price,
            short_volatility,
            historical_volatility,
            half_width: cap.min(hist_cap),
        })
    }

    pub fn lower(&self) -> f64 {
        self.current_price - self.half_width
    }

    pub fn upper(&self) -> f64 {
        self.current_price + self.half_width
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.lower()).min(self.upper())
    }
}

use std::fmt;

use candle_core::Device;
use tracing::{info, warn};

use crate::config::{ModelConfig, FORECAST_HORIZON, RECENT_WINDOW};
use crate::error::{Error, Result};
use crate::inference::{self, DeviceModel, VolatilityBand};
use crate::models::feed_forward::FeedForward;
use crate::preprocess::PreparedData;
use crate::progress::ProgressSink;
use crate::train::{self, TrainingReport};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForecasterState {
    Untrained,
    Training,
    Trained,
    Predicting,
    Done,
    Failed,
}

impl ForecasterState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForecasterState::Untrained => "untrained",
            ForecasterState::Training => "training",
            ForecasterState::Trained => "trained",
            ForecasterState::Predicting => "predicting",
            ForecasterState::Done => "done",
            ForecasterState::Failed => "failed",
        }
    }
}

impl fmt::Display for ForecasterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one forecast, in price units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Forecast {
    /// Clamped projection
    pub predicted: f64,
    /// Projection before the volatility clamp
    pub denormalized: f64,
    pub band: VolatilityBand,
}

/// Owns the network for one train-then-predict cycle.
pub struct Forecaster {
    config: ModelConfig,
    device: Device,
    state: ForecasterState,
    net: Option<FeedForward>,
    report: Option<TrainingReport>,
}

impl Forecaster {
    pub fn new(config: ModelConfig, device: Device) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            device,
            state: ForecasterState::Untrained,
            net: None,
            report: None,
        })
    }

    pub fn state(&self) -> ForecasterState {
        self.state
    }

    pub fn training_report(&self) -> Option<&TrainingReport> {
        self.report.as_ref()
    }

    fn expect_state(&self, expected: ForecasterState, operation: &'static str) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidState {
                state: self.state.as_str(),
                operation,
            });
        }
        Ok(())
    }

    pub async fn train<S: ProgressSink>(
        &mut self,
        data: &PreparedData,
        sink: &mut S,
    ) -> Result<TrainingReport> {
        self.expect_state(ForecasterState::Untrained, "train")?;
        self.state = ForecasterState::Training;

        match train::train_network(&data.examples, &self.config, &self.device, sink).await {
            Ok((net, report)) => {
                self.net = Some(net);
                self.report = Some(report);
                self.state = ForecasterState::Trained;
                Ok(report)
            }
            Err(e) => {
                warn!("Training failed: {}", e);
                self.state = ForecasterState::Failed;
                Err(e)
            }
        }
    }

    /// Projects the price `FORECAST_HORIZON` steps ahead of `current_price`.
    ///
    /// Denormalization uses the training scale carried in `data`.
    pub fn predict<S: ProgressSink>(
        &mut self,
        data: &PreparedData,
        current_price: f64,
        sink: &mut S,
    ) -> Result<Forecast> {
        self.expect_state(ForecasterState::Trained, "predict")?;
        self.state = ForecasterState::Predicting;

        let result = self.predict_inner(data, current_price, sink);
        self.state = if result.is_ok() {
            ForecasterState::Done
        } else {
            ForecasterState::Failed
        };
        // The network only serves a single prediction
        self.net = None;
        result
    }

    fn predict_inner<S: ProgressSink>(
        &self,
        data: &PreparedData,
        current_price: f64,
        sink: &mut S,
    ) -> Result<Forecast> {
        let net = self.net.as_ref().ok_or(Error::InvalidState {
            state: self.state.as_str(),
            operation: "predict",
        })?;
        let window = data
            .latest_window()
            .ok_or_else(|| Error::Validation("no window to forecast from".into()))?;

        let band = VolatilityBand::new(
            current_price,
            data.recent_prices(RECENT_WINDOW),
            &data.prices,
        )?;

        let model = DeviceModel {
            net,
            device: &self.device,
        };
        let start = data.scale.normalize(current_price);
        let normalized =
            inference::recursive_forecast(&model, window, start, FORECAST_HORIZON, sink)?;

        let denormalized = data.scale.denormalize(normalized);
        let predicted = band.clamp(denormalized);

        info!(
            "Forecast: raw={:.4} band=[{:.4}, {:.4}] clamped={:.4}",
            denormalized,
            band.lower(),
            band.upper(),
            predicted
        );

        Ok(Forecast {
            predicted,
            denormalized,
            band,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SequenceSet;
    use crate::preprocess::{Preprocessor, SequenceVariant};
    use crate::progress::Progress;

    fn prepared() -> Result<PreparedData> {
        // Hourly prices wobbling around 100
        let prices: Vec<f64> = [100.0, 101.0, 99.0, 102.0, 98.0]
            .iter()
            .cycle()
            .take(45)
            .enumerate()
            .map(|(i, p)| p + (i % 7) as f64 * 0.1)
            .collect();
        let set = SequenceSet::FeatureTarget(
            prices
                .windows(5)
                .map(|w| (w[..4].to_vec(), w[4]))
                .collect(),
        );
        Preprocessor::new(SequenceVariant::FeatureTarget).prepare(&set)
    }

    fn small_config() -> ModelConfig {
        ModelConfig {
            hidden_neurons: 6,
            iterations: 40,
            batch_size: 10,
            learning_rate: 0.01,
            error_threshold: 0.001,
        }
    }

    #[tokio::test]
    async fn test_full_cycle_stays_in_band() -> Result<()> {
        let data = prepared()?;
        let mut forecaster = Forecaster::new(small_config(), Device::Cpu)?;
        assert_eq!(forecaster.state(), ForecasterState::Untrained);

        let mut events = Vec::new();
        let mut sink = |p: Progress| events.push(p);

        forecaster.train(&data, &mut sink).await?;
        assert_eq!(forecaster.state(), ForecasterState::Trained);
        assert!(forecaster.training_report().is_some());

        let forecast = forecaster.predict(&data, 100.0, &mut sink)?;
        assert_eq!(forecaster.state(), ForecasterState::Done);

        assert!(forecast.predicted >= forecast.band.lower());
        assert!(forecast.predicted <= forecast.band.upper());
        assert!((forecast.predicted - 100.0).abs() <= 2.0 + 1e-9);

        let forecast_steps = events
            .iter()
            .filter(|p| matches!(p, Progress::Forecasting { .. }))
            .count();
        assert_eq!(forecast_steps, FORECAST_HORIZON);
        Ok(())
    }

    #[tokio::test]
    async fn test_state_transitions_are_enforced() -> Result<()> {
        let data = prepared()?;
        let mut forecaster = Forecaster::new(small_config(), Device::Cpu)?;
        let mut sink = |_: Progress| {};

        assert!(matches!(
            forecaster.predict(&data, 100.0, &mut sink),
            Err(Error::InvalidState { state: "untrained", .. })
        ));
        // A rejected call leaves the state untouched
        assert_eq!(forecaster.state(), ForecasterState::Untrained);

        forecaster.train(&data, &mut sink).await?;
        assert!(matches!(
            forecaster.train(&data, &mut sink).await,
            Err(Error::InvalidState { .. })
        ));

        forecaster.predict(&data, 100.0, &mut sink)?;
        assert!(forecaster.predict(&data, 100.0, &mut sink).is_err());
        assert_eq!(forecaster.state(), ForecasterState::Done);
        Ok(())
    }

    #[tokio::test]
    async fn test_bad_current_price_fails_the_run() -> Result<()> {
        let data = prepared()?;
        let mut forecaster = Forecaster::new(small_config(), Device::Cpu)?;
        let mut sink = |_: Progress| {};
        forecaster.train(&data, &mut sink).await?;

        assert!(matches!(
            forecaster.predict(&data, -1.0, &mut sink),
            Err(Error::Validation(_))
        ));
        assert_eq!(forecaster.state(), ForecasterState::Failed);
        Ok(())
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = ModelConfig {
            batch_size: 0,
            ..small_config()
        };
        assert!(Forecaster::new(config, Device::Cpu).is_err());
    }
}

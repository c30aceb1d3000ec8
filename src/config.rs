use candle_core::Device;
use tracing::{info, warn};

use crate::error::{Error, Result};

pub fn get_device(use_cuda: bool) -> Device {
    if use_cuda {
        #[cfg(feature = "cuda")]
        {
            match Device::new_cuda(0) {
                Ok(device) => {
                    info!("Using CUDA device 0");
                    return device;
                }
                Err(e) => {
                    warn!("Failed to initialize CUDA: {}. Falling back to CPU.", e);
                }
            }
        }
        #[cfg(not(feature = "cuda"))]
        {
            warn!("--cuda flag set but binary was compiled without the 'cuda' feature. Falling back to CPU.");
        }
    }
    info!("Using CPU device");
    Device::Cpu
}

pub const ISS_BASE_URL: &str = "https://iss.moex.com";
pub const ISS_BOARD: &str = "TQBR";
pub const FETCH_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_TICKERS: &str = "SBER,MGNT";
pub const DEFAULT_DATA_DIR: &str = "data";

/// Hourly steps projected ahead
pub const FORECAST_HORIZON: usize = 24;
/// Blend weight at step i is exp(-i / DECAY_SCALE)
pub const DECAY_SCALE: f64 = 12.0;
/// Number of most recent prices feeding the short volatility cap
pub const RECENT_WINDOW: usize = 30;
/// Short volatility cap never exceeds this many percent
pub const MAX_SHORT_VOL_PERCENT: f64 = 2.0;
pub const TRADING_DAYS: f64 = 252.0;

pub const DEFAULT_SPEED_ACCURACY: f64 = 50.0;

/// Hyperparameters for one training run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelConfig {
    pub hidden_neurons: usize,
    pub iterations: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub error_threshold: f64,
}

impl ModelConfig {
    /// Maps a single speed/accuracy setting (0 = fastest, 100 = most accurate)
    /// onto the five hyperparameters.
    pub fn from_speed_accuracy(percent: f64) -> Self {
        let s = (percent / 100.0).clamp(0.0, 1.0);
        let rate_step = (99.0 * (1.0 - s) + 1.0).round();

        Self {
            hidden_neurons: (15.0 * (1.0 - s) + 5.0).round() as usize,
            iterations: (450.0 * s + 50.0).round() as usize,
            batch_size: (45.0 * (1.0 - s) + 5.0).round() as usize,
            learning_rate: rate_step / 10_000.0,
            error_threshold: rate_step / 1_000.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.hidden_neurons == 0 {
            return Err(Error::Validation("hidden_neurons must be at least 1".into()));
        }
        if self.iterations == 0 {
            return Err(Error::Validation("iterations must be at least 1".into()));
        }
        if self.batch_size == 0 || self.batch_size > self.iterations {
            return Err(Error::Validation(format!(
                "batch_size must be between 1 and iterations ({}), got {}",
                self.iterations, self.batch_size
            )));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(Error::Validation(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !self.error_threshold.is_finite() || self.error_threshold < 0.0 {
            return Err(Error::Validation(format!(
                "error_threshold must be non-negative, got {}",
                self.error_threshold
            )));
        }
        Ok(())
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::from_speed_accuracy(DEFAULT_SPEED_ACCURACY)
    }
}

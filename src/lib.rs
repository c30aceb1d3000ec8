//! Short-horizon share price projection for MOEX securities.
//!
//! Current prices come from the MOEX ISS API; a small feed-forward network is
//! trained on historical hourly sequences and rolled forward 24 steps, then the
//! result is bounded by a volatility band around the current price.

pub mod app;
pub mod config;
pub mod data;
pub mod error;
pub mod forecaster;
pub mod inference;
pub mod models;
pub mod preprocess;
pub mod progress;
pub mod stats;
pub mod train;

pub use app::{App, ForecastResult, TickerOutcome};
pub use config::ModelConfig;
pub use data::{MoexClient, PriceQuote, SequenceSet};
pub use error::{Error, Result};
pub use forecaster::{Forecast, Forecaster, ForecasterState};
pub use preprocess::{PreparedData, Preprocessor, Scale, SequenceVariant, TrainingExample};
pub use progress::{Progress, ProgressSink};

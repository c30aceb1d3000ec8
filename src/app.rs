use std::fmt;
use std::path::PathBuf;

use candle_core::Device;
use tracing::{error, info};

use crate::config::ModelConfig;
use crate::data::{self, MoexClient, SequenceSet};
use crate::error::{Error, Result};
use crate::forecaster::Forecaster;
use crate::preprocess::{Preprocessor, SequenceVariant};
use crate::progress::{Progress, ProgressSink};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ForecastResult {
    pub current_price: f64,
    pub predicted_price: f64,
    pub absolute_delta: f64,
    pub percent_delta: f64,
}

impl ForecastResult {
    pub fn new(current_price: f64, predicted_price: f64) -> Self {
        let absolute_delta = predicted_price - current_price;
        Self {
            current_price,
            predicted_price,
            absolute_delta,
            percent_delta: absolute_delta / current_price * 100.0,
        }
    }
}

fn sign(value: f64) -> char {
    if value >= 0.0 {
        '+'
    } else {
        '-'
    }
}

impl fmt::Display for ForecastResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2} ₽ {}{:.2} ₽ = {:.2} ₽ ({}{:.2}%)",
            self.current_price,
            sign(self.absolute_delta),
            self.absolute_delta.abs(),
            self.predicted_price,
            sign(self.percent_delta),
            self.percent_delta.abs()
        )
    }
}

/// Preprocess, train and predict for one security.
pub async fn forecast_sequences<S: ProgressSink>(
    set: &SequenceSet,
    current_price: f64,
    config: ModelConfig,
    variant: SequenceVariant,
    device: Device,
    sink: &mut S,
) -> Result<ForecastResult> {
    let data = Preprocessor::new(variant).prepare(set)?;
    info!(
        "Prepared {} examples, scale [{}, {}]",
        data.examples.len(),
        data.scale.min,
        data.scale.max
    );

    let mut forecaster = Forecaster::new(config, device)?;
    forecaster.train(&data, sink).await?;
    let forecast = forecaster.predict(&data, current_price, sink)?;

    Ok(ForecastResult::new(current_price, forecast.predicted))
}

#[derive(Debug)]
pub struct TickerOutcome {
    pub ticker: String,
    pub result: Result<ForecastResult>,
}

impl fmt::Display for TickerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            Ok(result) => write!(f, "{}: {}", self.ticker, result),
            Err(e) => write!(f, "{}: error: {}", self.ticker, e),
        }
    }
}

/// Runs the fetch, train and forecast pipeline for each ticker in turn.
pub struct App {
    client: MoexClient,
    config: ModelConfig,
    variant: SequenceVariant,
    data_dir: PathBuf,
    device: Device,
}

impl App {
    pub fn new(
        client: MoexClient,
        config: ModelConfig,
        variant: SequenceVariant,
        data_dir: PathBuf,
        device: Device,
    ) -> Self {
        Self {
            client,
            config,
            variant,
            data_dir,
            device,
        }
    }

    pub fn sequences_path(&self, ticker: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", ticker))
    }

    /// Forecasts every ticker. A failing ticker only reports its own error;
    /// the run as a whole fails only when no ticker has a quote.
    pub async fn run<F>(&self, tickers: &str, mut on_progress: F) -> Result<Vec<TickerOutcome>>
    where
        F: FnMut(&str, Progress),
    {
        let symbols = data::parse_tickers(tickers);
        if symbols.is_empty() {
            return Err(Error::Validation("no tickers given".into()));
        }

        let quotes = self.client.fetch_quotes(tickers).await;
        if quotes.iter().all(|(_, quote)| quote.is_none()) {
            return Err(Error::QuoteUnavailable(symbols.join(",")));
        }

        let mut outcomes = Vec::with_capacity(quotes.len());
        for (ticker, quote) in quotes {
            let result = match quote {
                Some(quote) => {
                    info!("{}: current price {}", ticker, quote.last);
                    let mut sink = |p: Progress| on_progress(&ticker, p);
                    self.forecast_ticker(&ticker, quote.last, &mut sink).await
                }
                None => Err(Error::QuoteUnavailable(ticker.clone())),
            };

            match &result {
                Ok(r) => info!("{}: {}", ticker, r),
                Err(e) => error!("{}: {}", ticker, e),
            }
            outcomes.push(TickerOutcome { ticker, result });
        }

        Ok(outcomes)
    }

    async fn forecast_ticker<S: ProgressSink>(
        &self,
        ticker: &str,
        current_price: f64,
        sink: &mut S,
    ) -> Result<ForecastResult> {
        let set = data::load_sequences(&self.sequences_path(ticker))?;
        forecast_sequences(
            &set,
            current_price,
            self.config,
            self.variant,
            self.device.clone(),
            sink,
        )
        .await
    }
}

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{debug, error, info};

use moex_forecast::config::{self, ModelConfig};
use moex_forecast::{App, MoexClient, Progress, SequenceVariant};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Variant {
    /// [[features...], target] pairs
    FeatureTarget,
    /// Plain price runs, last value is the target
    TimeSeries,
}

impl From<Variant> for SequenceVariant {
    fn from(v: Variant) -> Self {
        match v {
            Variant::FeatureTarget => SequenceVariant::FeatureTarget,
            Variant::TimeSeries => SequenceVariant::TimeSeries,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "MOEX share price projection 24 hours ahead with a small neural network",
    after_help = "EXAMPLES:
    # Forecast SBER and MGNT with the balanced preset
    cargo run --release

    # Favour accuracy over speed
    cargo run --release -- --speed-accuracy 90

    # Custom hyperparameters
    cargo run --release -- --hidden-neurons 12 --iterations 300 --batch-size 20 --learning-rate 0.005

    # Only print current quotes
    cargo run --release -- --quotes-only --tickers SBER,GAZP,LKOH"
)]
struct Args {
    /// Comma-separated ticker symbols on the TQBR board
    #[arg(long, default_value = config::DEFAULT_TICKERS)]
    tickers: String,

    /// Directory holding {TICKER}.json historical sequences
    #[arg(long, default_value = config::DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Shape of the historical sequences
    #[arg(long, value_enum, default_value_t = Variant::FeatureTarget)]
    variant: Variant,

    /// Preset from 0 (fastest) to 100 (most accurate); individual flags override it
    #[arg(long, default_value_t = config::DEFAULT_SPEED_ACCURACY)]
    speed_accuracy: f64,

    /// Neurons in the hidden layer
    #[arg(long)]
    hidden_neurons: Option<usize>,

    /// Training iteration budget
    #[arg(long)]
    iterations: Option<usize>,

    /// Iterations between progress reports
    #[arg(long)]
    batch_size: Option<usize>,

    /// Optimizer learning rate
    #[arg(long)]
    learning_rate: Option<f64>,

    /// Training stops once the error falls below this value
    #[arg(long)]
    error_threshold: Option<f64>,

    /// ISS API base URL
    #[arg(long, default_value = config::ISS_BASE_URL)]
    endpoint: String,

    /// Per-request timeout for quote fetches
    #[arg(long, default_value_t = config::FETCH_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Print current quotes and exit without training
    #[arg(long)]
    quotes_only: bool,

    /// Use CUDA GPU acceleration (requires --features cuda at compile time)
    #[arg(long)]
    cuda: bool,
}

impl Args {
    fn model_config(&self) -> ModelConfig {
        let preset = ModelConfig::from_speed_accuracy(self.speed_accuracy);
        ModelConfig {
            hidden_neurons: self.hidden_neurons.unwrap_or(preset.hidden_neurons),
            iterations: self.iterations.unwrap_or(preset.iterations),
            batch_size: self.batch_size.unwrap_or(preset.batch_size),
            learning_rate: self.learning_rate.unwrap_or(preset.learning_rate),
            error_threshold: self.error_threshold.unwrap_or(preset.error_threshold),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let client = MoexClient::with_options(&args.endpoint, Duration::from_secs(args.timeout_secs))
        .context("failed to build HTTP client")?;

    if args.quotes_only {
        for (ticker, quote) in client.fetch_quotes(&args.tickers).await {
            match quote {
                Some(q) => {
                    println!("{}: {:.2} ₽ (previous {:.2} ₽)", ticker, q.last, q.previous)
                }
                None => println!("{}: price unavailable", ticker),
            }
        }
        return Ok(());
    }

    let model_config = args.model_config();
    model_config.validate().context("invalid model configuration")?;
    info!("Model configuration: {:?}", model_config);

    let device = config::get_device(args.cuda);
    let app = App::new(
        client,
        model_config,
        args.variant.into(),
        args.data_dir.clone(),
        device,
    );

    let outcomes = app
        .run(&args.tickers, |ticker, progress| match progress {
            Progress::Training { error, .. } => {
                info!("{}: training {:.0}% (error {:.5})", ticker, progress.percent(), error)
            }
            Progress::Forecasting { step, total } => {
                debug!("{}: forecast step {}/{}", ticker, step, total)
            }
        })
        .await
        .context("could not fetch prices for any ticker")?;

    for outcome in &outcomes {
        println!("{}", outcome);
    }
    if outcomes.iter().all(|o| o.result.is_err()) {
        error!("No ticker produced a forecast");
    }

    Ok(())
}

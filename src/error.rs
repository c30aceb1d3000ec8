use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Transport failure talking to the ISS endpoint
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response decoded but did not have the expected tables
    #[error("malformed response for {ticker}: {reason}")]
    MalformedResponse { ticker: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no quote available for {0}")]
    QuoteUnavailable(String),

    /// Every training value is the same, so min-max scaling is undefined
    #[error("all training values are equal to {value}, cannot normalize")]
    DegenerateData { value: f64 },

    #[error("model error: {0}")]
    Model(#[from] candle_core::Error),

    #[error("non-finite value produced during {stage}")]
    NonFinite { stage: &'static str },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("cannot {operation} while forecaster is {state}")]
    InvalidState {
        state: &'static str,
        operation: &'static str,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}


use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{FETCH_TIMEOUT_SECS, ISS_BASE_URL, ISS_BOARD};
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PriceQuote {
    pub last: f64,
    pub previous: f64,
}

#[derive(Deserialize, Debug)]
struct IssResponse {
    securities: Option<IssTable>,
    marketdata: Option<IssTable>,
}

#[derive(Deserialize, Debug)]
struct IssTable {
    #[serde(default)]
    data: Vec<Vec<Value>>,
}

/// Decodes an ISS `securities` + `marketdata` body into a quote.
///
/// The last trade price falls back to the previous close when the market has
/// not traded yet and `LAST` is null or zero.
pub fn parse_quote(ticker: &str, body: &str) -> Result<PriceQuote> {
    let resp: IssResponse = serde_json::from_str(body)?;
    let malformed = |reason: &str| Error::MalformedResponse {
        ticker: ticker.to_string(),
        reason: reason.to_string(),
    };

    let security_row = resp
        .securities
        .as_ref()
        .and_then(|t| t.data.first())
        .ok_or_else(|| malformed("securities table is missing or empty"))?;
    let market_row = resp
        .marketdata
        .as_ref()
        .and_then(|t| t.data.first())
        .ok_or_else(|| malformed("marketdata table is missing or empty"))?;

    let previous = security_row.get(1).and_then(Value::as_f64);
    let last = market_row
        .first()
        .and_then(Value::as_f64)
        .filter(|&price| price > 0.0);

    match (last, previous) {
        (Some(last), Some(previous)) => Ok(PriceQuote { last, previous }),
        (None, Some(previous)) => Ok(PriceQuote { last: previous, previous }),
        (Some(last), None) => Ok(PriceQuote { last, previous: last }),
        (None, None) => Err(malformed("neither LAST nor PREVPRICE is set")),
    }
}

/// Client for the MOEX ISS quote endpoint.
#[derive(Clone, Debug)]
pub struct MoexClient {
    client: reqwest::Client,
    base_url: String,
}

impl MoexClient {
    pub fn new() -> Result<Self> {
        Self::with_options(ISS_BASE_URL, Duration::from_secs(FETCH_TIMEOUT_SECS))
    }

    pub fn with_options(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0")
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn quote_url(&self, ticker: &str) -> String {
        format!(
            "{}/iss/engines/stock/markets/shares/boards/{}/securities/{}.json?iss.meta=off&iss.only=securities,marketdata&securities.columns=SECID,PREVPRICE&marketdata.columns=LAST",
            self.base_url, ISS_BOARD, ticker
        )
    }

    pub async fn fetch_quote(&self, ticker: &str) -> Result<PriceQuote> {
        let url = self.quote_url(ticker);
        debug!("Requesting {}", url);

        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_quote(ticker, &body)
    }

    /// Fetches every ticker in a comma-separated list, one request each, in
    /// the order given.
    ///
    /// A failure only affects its own ticker, which maps to `None`.
    pub async fn fetch_quotes(&self, tickers: &str) -> Vec<(String, Option<PriceQuote>)> {
        let mut results = Vec::new();

        for ticker in parse_tickers(tickers) {
            let quote = quote_or_none(&ticker, self.fetch_quote(&ticker).await);
            results.push((ticker, quote));
        }

        results
    }
}

/// Degrades a failed fetch to a missing quote, logging the cause.
pub fn quote_or_none(ticker: &str, result: Result<PriceQuote>) -> Option<PriceQuote> {
    match result {
        Ok(quote) => {
            debug!("{}: last={} previous={}", ticker, quote.last, quote.previous);
            Some(quote)
        }
        Err(e) => {
            warn!("Failed to fetch price for {}: {}", ticker, e);
            None
        }
    }
}

pub fn parse_tickers(tickers: &str) -> Vec<String> {
    tickers
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Historical training sequences for one security.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SequenceSet {
    /// `[[features...], target]` pairs
    FeatureTarget(Vec<(Vec<f64>, f64)>),
    /// Plain ordered runs of prices
    TimeSeries(Vec<Vec<f64>>),
}

impl SequenceSet {
    pub fn len(&self) -> usize {
        match self {
            SequenceSet::FeatureTarget(seqs) => seqs.len(),
            SequenceSet::TimeSeries(seqs) => seqs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Each sequence as one flat run, features followed by the target.
    pub fn flattened(&self) -> Vec<Vec<f64>> {
        match self {
            SequenceSet::FeatureTarget(seqs) => seqs
                .iter()
                .map(|(features, target)| {
                    let mut flat = Vec::with_capacity(features.len() + 1);
                    flat.extend_from_slice(features);
                    flat.push(*target);
                    flat
                })
                .collect(),
            SequenceSet::TimeSeries(seqs) => seqs.clone(),
        }
    }

    /// The price observed at the end of each sequence, in order.
    pub fn closing_prices(&self) -> Vec<f64> {
        match self {
            SequenceSet::FeatureTarget(seqs) => {
                seqs.iter().map(|(_, target)| *target).collect()
            }
            SequenceSet::TimeSeries(seqs) => {
                seqs.iter().filter_map(|s| s.last().copied()).collect()
            }
        }
    }
}

pub fn parse_sequences(json: &str) -> Result<SequenceSet> {
    serde_json::from_str(json).map_err(|e| {
        Error::Validation(format!(
            "sequences must be [[features, target], ...] or [[prices...], ...]: {}",
            e
        ))
    })
}

pub fn load_sequences(path: &Path) -> Result<SequenceSet> {
    let json = std::fs::read_to_string(path)?;
    let set = parse_sequences(&json)?;
    debug!("Loaded {} sequences from {}", set.len(), path.display());
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quote_uses_last_price() -> Result<()> {
        let body = r#"{"securities":{"data":[["SBER",301.5]]},"marketdata":{"data":[[305.25]]}}"#;
        let quote = parse_quote("SBER", body)?;
        assert_eq!(quote, PriceQuote { last: 305.25, previous: 301.5 });
        Ok(())
    }

    #[test]
    fn test_parse_quote_falls_back_to_previous() -> Result<()> {
        let body = r#"{"securities":{"data":[["MGNT",5120.0]]},"marketdata":{"data":[[null]]}}"#;
        let quote = parse_quote("MGNT", body)?;
        assert_eq!(quote.last, 5120.0);
        assert_eq!(quote.previous, 5120.0);
        Ok(())
    }

    #[test]
    fn test_parse_quote_zero_last_uses_previous() -> Result<()> {
        let body = r#"{"securities":{"data":[["SBER",301.5]]},"marketdata":{"data":[[0]]}}"#;
        let quote = parse_quote("SBER", body)?;
        assert_eq!(quote, PriceQuote { last: 301.5, previous: 301.5 });
        Ok(())
    }

    #[test]
    fn test_malformed_body_degrades_to_none() {
        let body = r#"{"securities":{"data":[["SBER",301.5]]},"marketdata":{"columns":["LAST"]}}"#;
        assert_eq!(quote_or_none("SBER", parse_quote("SBER", body)), None);

        let body = r#"{"securities":{"data":[["SBER",301.5]]},"marketdata":{"data":[[305.0]]}}"#;
        assert_eq!(
            quote_or_none("SBER", parse_quote("SBER", body)),
            Some(PriceQuote { last: 305.0, previous: 301.5 })
        );
    }

    #[test]
    fn test_parse_quote_missing_marketdata() {
        let body = r#"{"securities":{"data":[["SBER",301.5]]},"marketdata":{}}"#;
        assert!(matches!(
            parse_quote("SBER", body),
            Err(Error::MalformedResponse { .. })
        ));

        let body = r#"{"securities":{"data":[["SBER",301.5]]}}"#;
        assert!(parse_quote("SBER", body).is_err());
    }

    #[test]
    fn test_parse_quote_empty_securities() {
        let body = r#"{"securities":{"data":[]},"marketdata":{"data":[[300.0]]}}"#;
        assert!(matches!(
            parse_quote("SBER", body),
            Err(Error::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_parse_quote_invalid_json() {
        assert!(matches!(parse_quote("SBER", "<html>"), Err(Error::Json(_))));
    }

    #[test]
    fn test_quote_url() -> Result<()> {
        let client = MoexClient::with_options("http://localhost:8080/", Duration::from_secs(1))?;
        assert_eq!(
            client.quote_url("SBER"),
            "http://localhost:8080/iss/engines/stock/markets/shares/boards/TQBR/securities/SBER.json?iss.meta=off&iss.only=securities,marketdata&securities.columns=SECID,PREVPRICE&marketdata.columns=LAST"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_quotes_isolates_failures() -> Result<()> {
        // Nothing listens on the discard port, so every request fails fast
        let client = MoexClient::with_options("http://127.0.0.1:9", Duration::from_secs(2))?;
        let quotes = client.fetch_quotes("SBER, MGNT,").await;

        assert_eq!(
            quotes,
            vec![("SBER".to_string(), None), ("MGNT".to_string(), None)]
        );
        Ok(())
    }

    #[test]
    fn test_parse_sequences_variants() -> Result<()> {
        let set = parse_sequences("[[[1,2,3],4],[[2,3,4],5]]")?;
        assert!(matches!(set, SequenceSet::FeatureTarget(_)));
        assert_eq!(set.flattened(), vec![vec![1.0, 2.0, 3.0, 4.0], vec![2.0, 3.0, 4.0, 5.0]]);
        assert_eq!(set.closing_prices(), vec![4.0, 5.0]);

        let set = parse_sequences("[[1,2,3],[2,3,4]]")?;
        assert!(matches!(set, SequenceSet::TimeSeries(_)));
        assert_eq!(set.closing_prices(), vec![3.0, 4.0]);
        Ok(())
    }

    #[test]
    fn test_load_bundled_sequences() -> Result<()> {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("data");
        for ticker in ["SBER", "MGNT"] {
            let set = load_sequences(&dir.join(format!("{}.json", ticker)))?;
            assert!(matches!(set, SequenceSet::FeatureTarget(_)));
            assert!(set.len() > 30);
        }
        assert!(matches!(
            load_sequences(&dir.join("MISSING.json")),
            Err(Error::Io(_))
        ));
        Ok(())
    }

    #[test]
    fn test_parse_sequences_rejects_bad_shape() {
        assert!(matches!(
            parse_sequences(r#"[["a", 1]]"#),
            Err(Error::Validation(_))
        ));
    }
}

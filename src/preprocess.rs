use crate::data::SequenceSet;
use crate::error::{Error, Result};

/// Shape of the raw sequences a preprocessor accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequenceVariant {
    FeatureTarget,
    TimeSeries,
}

impl SequenceVariant {
    pub fn of(set: &SequenceSet) -> Self {
        match set {
            SequenceSet::FeatureTarget(_) => SequenceVariant::FeatureTarget,
            SequenceSet::TimeSeries(_) => SequenceVariant::TimeSeries,
        }
    }
}

/// Global min-max scale shared by training and denormalization.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scale {
    pub min: f64,
    pub max: f64,
}

impl Scale {
    /// Fails with `DegenerateData` when every value is identical.
    pub fn fit<'a, I>(values: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a f64>,
    {
        let (min, max) = values
            .into_iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

        if !min.is_finite() || !max.is_finite() {
            return Err(Error::Validation("no values to scale".into()));
        }
        if max == min {
            return Err(Error::DegenerateData { value: min });
        }
        Ok(Self { min, max })
    }

    pub fn normalize(&self, value: f64) -> f64 {
        (value - self.min) / (self.max - self.min)
    }

    pub fn denormalize(&self, value: f64) -> f64 {
        value * (self.max - self.min) + self.min
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrainingExample {
    pub input: Vec<f64>,
    pub output: [f64; 1],
}

/// Normalized sequences, their training frames, and the scale that produced them.
#[derive(Clone, Debug)]
pub struct PreparedData {
    pub variant: SequenceVariant,
    pub scale: Scale,
    pub sequences: Vec<Vec<f64>>,
    pub examples: Vec<TrainingExample>,
    /// Raw (unscaled) closing price of each sequence, used for volatility.
    pub prices: Vec<f64>,
}

impl PreparedData {
    pub fn input_size(&self) -> usize {
        self.examples.first().map(|e| e.input.len()).unwrap_or(0)
    }

    /// Input window of the most recent example, the seed for forecasting.
    pub fn latest_window(&self) -> Option<&[f64]> {
        self.examples.last().map(|e| e.input.as_slice())
    }

    pub fn recent_prices(&self, count: usize) -> &[f64] {
        &self.prices[self.prices.len().saturating_sub(count)..]
    }
}

pub struct Preprocessor {
    variant: SequenceVariant,
}

impl Preprocessor {
    pub fn new(variant: SequenceVariant) -> Self {
        Self { variant }
    }

    /// Checks shape and values before anything is scaled or trained.
    pub fn validate(&self, set: &SequenceSet) -> Result<()> {
        let found = SequenceVariant::of(set);
        if found != self.variant {
            return Err(Error::Validation(format!(
                "expected {:?} sequences, found {:?}",
                self.variant, found
            )));
        }
        if set.len() < 2 {
            return Err(Error::Validation(format!(
                "need at least 2 sequences, found {}",
                set.len()
            )));
        }

        let flat = set.flattened();
        let len = flat[0].len();
        if len < 2 {
            return Err(Error::Validation(
                "each sequence needs at least one input value and a target".into(),
            ));
        }
        if let Some(i) = flat.iter().position(|s| s.len() != len) {
            return Err(Error::Validation(format!(
                "sequence {} has length {}, expected {}",
                i,
                flat[i].len(),
                len
            )));
        }
        if flat.iter().flatten().any(|v| !v.is_finite()) {
            return Err(Error::Validation("sequences contain non-finite values".into()));
        }
        Ok(())
    }

    pub fn prepare(&self, set: &SequenceSet) -> Result<PreparedData> {
        self.validate(set)?;

        let flat = set.flattened();
        let scale = Scale::fit(flat.iter().flatten())?;

        let sequences: Vec<Vec<f64>> = flat
            .iter()
            .map(|seq| seq.iter().map(|&v| scale.normalize(v)).collect())
            .collect();

        let examples = sequences
            .iter()
            .map(|seq| {
                let (input, target) = seq.split_at(seq.len() - 1);
                TrainingExample {
                    input: input.to_vec(),
                    output: [target[0]],
                }
            })
            .collect();

        Ok(PreparedData {
            variant: self.variant,
            scale,
            sequences,
            examples,
            prices: set.closing_prices(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> SequenceSet {
        SequenceSet::FeatureTarget(vec![
            (vec![1.0, 2.0, 3.0], 4.0),
            (vec![2.0, 3.0, 4.0], 5.0),
        ])
    }

    #[test]
    fn test_global_normalization_and_framing() -> Result<()> {
        let prepared = Preprocessor::new(SequenceVariant::FeatureTarget).prepare(&corpus())?;

        assert_eq!(prepared.scale, Scale { min: 1.0, max: 5.0 });
        assert_eq!(prepared.examples.len(), 2);
        assert_eq!(prepared.examples[0].input, vec![0.0, 0.25, 0.5]);
        assert_eq!(prepared.examples[0].output, [0.75]);
        assert_eq!(prepared.examples[1].input, vec![0.25, 0.5, 0.75]);
        assert_eq!(prepared.examples[1].output, [1.0]);
        assert_eq!(prepared.input_size(), 3);
        assert_eq!(prepared.latest_window(), Some(&[0.25, 0.5, 0.75][..]));
        assert_eq!(prepared.prices, vec![4.0, 5.0]);
        Ok(())
    }

    #[test]
    fn test_round_trip() -> Result<()> {
        let values = [312.4, 298.15, 305.0, 301.77, 289.9];
        let scale = Scale::fit(values.iter())?;
        for v in values {
            let back = scale.denormalize(scale.normalize(v));
            assert!((back - v).abs() < 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_degenerate_iff_all_equal() {
        assert!(matches!(
            Scale::fit([7.0, 7.0, 7.0].iter()),
            Err(Error::DegenerateData { value }) if value == 7.0
        ));
        assert!(Scale::fit([7.0, 7.0, 7.000001].iter()).is_ok());

        let flat = SequenceSet::TimeSeries(vec![vec![3.0, 3.0], vec![3.0, 3.0]]);
        assert!(matches!(
            Preprocessor::new(SequenceVariant::TimeSeries).prepare(&flat),
            Err(Error::DegenerateData { .. })
        ));
    }

    #[test]
    fn test_time_series_variant() -> Result<()> {
        let set = SequenceSet::TimeSeries(vec![vec![10.0, 20.0, 30.0], vec![20.0, 30.0, 50.0]]);
        let prepared = Preprocessor::new(SequenceVariant::TimeSeries).prepare(&set)?;
        assert_eq!(prepared.sequences[1], vec![0.25, 0.5, 1.0]);
        assert_eq!(prepared.examples[1].input, vec![0.25, 0.5]);
        assert_eq!(prepared.examples[1].output, [1.0]);
        Ok(())
    }

    #[test]
    fn test_validation_errors() {
        let pre = Preprocessor::new(SequenceVariant::TimeSeries);
        assert!(matches!(pre.prepare(&corpus()), Err(Error::Validation(_))));

        let pre = Preprocessor::new(SequenceVariant::FeatureTarget);
        let ragged = SequenceSet::FeatureTarget(vec![(vec![1.0, 2.0], 3.0), (vec![1.0], 2.0)]);
        assert!(matches!(pre.prepare(&ragged), Err(Error::Validation(_))));

        let single = SequenceSet::FeatureTarget(vec![(vec![1.0, 2.0], 3.0)]);
        assert!(matches!(pre.prepare(&single), Err(Error::Validation(_))));

        let no_inputs = SequenceSet::FeatureTarget(vec![(vec![], 3.0), (vec![], 4.0)]);
        assert!(matches!(pre.prepare(&no_inputs), Err(Error::Validation(_))));

        let nan = SequenceSet::FeatureTarget(vec![
            (vec![1.0, f64::NAN], 3.0),
            (vec![1.0, 2.0], 4.0),
        ]);
        assert!(matches!(pre.prepare(&nan), Err(Error::Validation(_))));
    }
}

use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{Optimizer, VarBuilder, VarMap};
use tracing::{debug, info};

use crate::config::ModelConfig;
use crate::error::{Error, Result};
use crate::models::feed_forward::FeedForward;
use crate::preprocess::TrainingExample;
use crate::progress::{Progress, ProgressSink};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrainingReport {
    pub iterations: usize,
    /// Mean squared error at the last iteration run
    pub error: f64,
    /// True when training stopped below the error threshold
    pub converged: bool,
}

/// Trains a fresh network on the examples.
///
/// Each iteration is one full pass over the examples. Iterations run in
/// batches of `config.batch_size`; after every batch the sink is told how far
/// training got and control is yielded back to the runtime.
pub async fn train_network<S: ProgressSink>(
    examples: &[TrainingExample],
    config: &ModelConfig,
    device: &Device,
    sink: &mut S,
) -> Result<(FeedForward, TrainingReport)> {
    config.validate()?;
    let input_size = examples
        .first()
        .map(|e| e.input.len())
        .ok_or_else(|| Error::Validation("no training examples".into()))?;
    if examples.iter().any(|e| e.input.len() != input_size) {
        return Err(Error::Validation("training examples differ in input size".into()));
    }

    let num_samples = examples.len();
    let inputs: Vec<f32> = examples
        .iter()
        .flat_map(|e| e.input.iter().map(|&v| v as f32))
        .collect();
    let targets: Vec<f32> = examples.iter().map(|e| e.output[0] as f32).collect();

    let x = Tensor::from_vec(inputs, (num_samples, input_size), device)?;
    let y = Tensor::from_vec(targets, (num_samples, 1), device)?;

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
    let net = FeedForward::new(input_size, config.hidden_neurons, vb.pp("net"))?;
    let mut opt = candle_nn::AdamW::new_lr(varmap.all_vars(), config.learning_rate)?;

    info!(
        "Training on {} samples: inputs={}, hidden={}, iterations={}, batch={}",
        num_samples, input_size, config.hidden_neurons, config.iterations, config.batch_size
    );

    let total = config.iterations;
    let mut completed = 0;
    let mut error = f64::INFINITY;
    let mut converged = false;

    while completed < total && !converged {
        let batch_end = (completed + config.batch_size).min(total);

        while completed < batch_end {
            let pred = net.forward(&x)?;
            let loss = candle_nn::loss::mse(&pred, &y)?;
            error = loss.to_scalar::<f32>()? as f64;
            if !error.is_finite() {
                return Err(Error::NonFinite { stage: "training" });
            }
            completed += 1;

            if error < config.error_threshold {
                converged = true;
                break;
            }
            opt.backward_step(&loss)?;
        }

        debug!("Iteration {}/{}: error = {:.6}", completed, total, error);
        sink.report(Progress::Training {
            iteration: completed,
            total,
            error,
        });

        tokio::task::yield_now().await;
    }

    info!(
        "Training finished after {} iterations, error = {:.6}{}",
        completed,
        error,
        if converged { " (below threshold)" } else { "" }
    );

    Ok((
        net,
        TrainingReport {
            iterations: completed,
            error,
            converged,
        },
    ))
}

use candle_core::{Device, Module, Result, Tensor};
use candle_nn::{Linear, VarBuilder};

/// One-hidden-layer network with sigmoid activations, mapping a price window
/// in [0, 1] to the next normalized price.
pub struct FeedForward {
    hidden: Linear,
    output: Linear,
    input_size: usize,
}

impl FeedForward {
    pub fn new(input_size: usize, hidden_size: usize, vb: VarBuilder) -> Result<Self> {
        let hidden = candle_nn::linear(input_size, hidden_size, vb.pp("hidden"))?;
        let output = candle_nn::linear(hidden_size, 1, vb.pp("output"))?;
        Ok(Self { hidden, output, input_size })
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Runs a single window through the network.
    pub fn run(&self, input: &[f64], device: &Device) -> Result<f64> {
        if input.len() != self.input_size {
            return Err(candle_core::Error::Msg(format!(
                "expected window of {} values, got {}",
                self.input_size,
                input.len()
            )));
        }
        let data: Vec<f32> = input.iter().map(|&v| v as f32).collect();
        let x = Tensor::from_vec(data, (1, self.input_size), device)?;
        let y = self.forward(&x)?; // [1, 1]
        Ok(y.squeeze(0)?.squeeze(0)?.to_scalar::<f32>()? as f64)
    }
}

impl Module for FeedForward {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        // xs: [batch, input_size]
        let h = candle_nn::ops::sigmoid(&self.hidden.forward(xs)?)?;
        candle_nn::ops::sigmoid(&self.output.forward(&h)?)
    }
}

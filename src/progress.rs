/// Checkpoint reached by a running forecast pipeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Progress {
    /// Emitted after each training batch.
    Training {
        iteration: usize,
        total: usize,
        error: f64,
    },
    /// Emitted after each recursive forecast step.
    Forecasting { step: usize, total: usize },
}

impl Progress {
    /// Completion of the current phase in percent, within [0, 100].
    pub fn percent(&self) -> f64 {
        let (done, total) = match *self {
            Progress::Training { iteration, total, .. } => (iteration, total),
            Progress::Forecasting { step, total } => (step, total),
        };
        if total == 0 {
            return 100.0;
        }
        (done as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
    }
}

/// Receives progress synchronously from the pipeline.
pub trait ProgressSink {
    fn report(&mut self, progress: Progress);
}

impl<F: FnMut(Progress)> ProgressSink for F {
    fn report(&mut self, progress: Progress) {
        self(progress)
    }
}

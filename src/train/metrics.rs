//! Evaluation metrics reported during warm-up.

use crate::Tensor;

/// Trait for evaluation metrics.
pub trait Metric {
    /// Compute the metric given predictions and targets.
    fn compute(&self, predictions: &Tensor, targets: &Tensor) -> f32;

    /// Name of the metric.
    fn name(&self) -> &str;

    /// Whether higher values are better (true) or lower (false).
    fn higher_is_better(&self) -> bool {
        true
    }
}

/// Accuracy metric for binary classification.
///
/// Continuous predictions are thresholded into labels; targets are treated
/// as positive at 0.5 and above.
#[derive(Debug, Clone)]
pub struct Accuracy {
    threshold: f32,
}

impl Accuracy {
    /// Create an accuracy metric with the given decision threshold.
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Default for Accuracy {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl Metric for Accuracy {
    fn compute(&self, predictions: &Tensor, targets: &Tensor) -> f32 {
        assert_eq!(
            predictions.len(),
            targets.len(),
            "Predictions and targets must have same length"
        );

        if predictions.is_empty() {
            return 0.0;
        }

        let correct = predictions
            .data()
            .iter()
            .zip(targets.data().iter())
            .filter(|(&p, &t)| (p >= self.threshold) == (t >= 0.5))
            .count();
        correct as f32 / predictions.len() as f32
    }

    fn name(&self) -> &str {
        "Accuracy"
    }
}

/// Root Mean Squared Error for regression.
#[derive(Debug, Clone, Copy, Default)]
pub struct RMSE;

impl Metric for RMSE {
    fn compute(&self, predictions: &Tensor, targets: &Tensor) -> f32 {
        assert_eq!(
            predictions.len(),
            targets.len(),
            "Predictions and targets must have same length"
        );

        if predictions.is_empty() {
            return 0.0;
        }

        let mse: f32 = predictions
            .data()
            .iter()
            .zip(targets.data().iter())
            .map(|(&p, &t)| (p - t).powi(2))
            .sum::<f32>()
            / predictions.len() as f32;
        mse.sqrt()
    }

    fn name(&self) -> &str {
        "RMSE"
    }

    fn higher_is_better(&self) -> bool {
        false
    }
}

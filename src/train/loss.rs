//! Loss functions for warm-up training.
//!
//! Losses consume the activated output (probabilities for classification,
//! raw values for regression):
//!
//! - [`MSELoss`] - Mean Squared Error for regression
//! - [`BCELoss`] - Binary Cross-Entropy over probabilities
//! - [`CrossEntropyLoss`] - Cross-entropy over a probability distribution
//!   with one-hot targets

use std::rc::Rc;

use ndarray::Array1;

use crate::tensor::BackwardOp;
use crate::Tensor;

/// Trait for loss functions.
pub trait LossFn {
    /// Compute loss given predictions and targets.
    ///
    /// Returns a scalar loss tensor and sets up gradients for
    /// backpropagation into `predictions`.
    fn forward(&self, predictions: &Tensor, targets: &Tensor) -> Tensor;

    /// Name of the loss function.
    fn name(&self) -> &'static str;
}

/// Shared backward step: push a precomputed gradient into the prediction
/// tensor and continue down its chain.
struct LossBackward {
    pred: Tensor,
    grad: Array1<f32>,
}

impl BackwardOp for LossBackward {
    fn backward(&self) {
        self.pred.accumulate_grad(&self.grad);
        if let Some(op) = self.pred.backward_op() {
            op.backward();
        }
    }
}

fn scalar_loss(value: f32, predictions: &Tensor, grad: Array1<f32>) -> Tensor {
    let loss = Tensor::from_vec(vec![value], true);
    if predictions.requires_grad() {
        loss.set_backward_op(Rc::new(LossBackward {
            pred: predictions.clone(),
            grad,
        }));
    }
    loss
}

/// Mean Squared Error Loss.
///
/// L = mean((predictions - targets)²)
pub struct MSELoss;

impl LossFn for MSELoss {
    fn forward(&self, predictions: &Tensor, targets: &Tensor) -> Tensor {
        assert_eq!(
            predictions.len(),
            targets.len(),
            "Predictions and targets must have same length"
        );

        let diff = &*predictions.data() - &*targets.data();
        let mse = (&diff * &diff).mean().unwrap_or(0.0);

        // d(MSE)/d(pred) = 2 * (pred - target) / n
        let n = predictions.len() as f32;
        let grad = &diff * (2.0 / n);

        scalar_loss(mse, predictions, grad)
    }

    fn name(&self) -> &'static str {
        "MSE"
    }
}

/// Binary Cross-Entropy over probabilities.
///
/// L = -mean(t * ln(p) + (1 - t) * ln(1 - p))
///
/// Expects predictions already squashed into (0, 1); pair with
/// [`Sigmoid`](crate::train::Sigmoid). Probabilities are clamped away from
/// 0 and 1 before the logs.
pub struct BCELoss;

const PROB_EPS: f32 = 1e-7;

impl LossFn for BCELoss {
    fn forward(&self, predictions: &Tensor, targets: &Tensor) -> Tensor {
        assert_eq!(
            predictions.len(),
            targets.len(),
            "Predictions and targets must have same length"
        );

        let p = predictions.data().mapv(|v| v.clamp(PROB_EPS, 1.0 - PROB_EPS));
        let n = predictions.len() as f32;

        let bce: f32 = p
            .iter()
            .zip(targets.data().iter())
            .map(|(&p, &t)| -(t * p.ln() + (1.0 - t) * (1.0 - p).ln()))
            .sum::<f32>()
            / n;

        // dL/dp = (p - t) / (p * (1 - p)) / n
        let grad: Array1<f32> = p
            .iter()
            .zip(targets.data().iter())
            .map(|(&p, &t)| (p - t) / (p * (1.0 - p)) / n)
            .collect();

        scalar_loss(bce, predictions, grad)
    }

    fn name(&self) -> &'static str {
        "BCE"
    }
}

/// Cross-entropy over a probability distribution with one-hot targets.
///
/// L = -sum(targets * ln(predictions))
///
/// Expects predictions already normalized into a distribution; pair with
/// [`Softmax`](crate::train::Softmax), which makes the end-to-end gradient
/// the classic `probs - targets`.
pub struct CrossEntropyLoss;

impl LossFn for CrossEntropyLoss {
    fn forward(&self, predictions: &Tensor, targets: &Tensor) -> Tensor {
        assert_eq!(
            predictions.len(),
            targets.len(),
            "Predictions and targets must have same length"
        );

        let p = predictions.data().mapv(|v| v.max(PROB_EPS));

        let ce: f32 = targets
            .data()
            .iter()
            .zip(p.iter())
            .map(|(&t, &p)| -t * p.ln())
            .sum();

        // dL/dp = -t / p
        let grad: Array1<f32> = targets
            .data()
            .iter()
            .zip(p.iter())
            .map(|(&t, &p)| -t / p)
            .collect();

        scalar_loss(ce, predictions, grad)
    }

    fn name(&self) -> &'static str {
        "CrossEntropy"
    }
}

//! Training-time function seams: activations, losses, and metrics.
//!
//! These are the capability interfaces the warm-up driver consumes:
//! - [`Activation`] - tensor → tensor output transform
//! - [`LossFn`] - (prediction, target) → scalar loss tensor
//! - [`Metric`] - (prediction, target) → reportable score

mod activation;
mod loss;
mod metrics;

pub use activation::{Activation, Identity, Sigmoid, Softmax};
pub use loss::{BCELoss, CrossEntropyLoss, LossFn, MSELoss};
pub use metrics::{Accuracy, Metric, RMSE};

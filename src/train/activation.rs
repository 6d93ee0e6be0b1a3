//! Output activations applied between the model forward and the loss.

use std::cell::RefCell;
use std::rc::Rc;

use ndarray::Array1;

use crate::tensor::BackwardOp;
use crate::Tensor;

/// Trait for output activation functions.
pub trait Activation {
    /// Apply the activation, wiring gradients back to the input.
    fn apply(&self, input: &Tensor) -> Tensor;

    /// Name of the activation.
    fn name(&self) -> &'static str;
}

/// Pass-through activation (regression outputs).
pub struct Identity;

impl Activation for Identity {
    fn apply(&self, input: &Tensor) -> Tensor {
        // Same node: gradients flow through untouched
        input.clone()
    }

    fn name(&self) -> &'static str {
        "Identity"
    }
}

/// Element-wise sigmoid (binary outputs).
pub struct Sigmoid;

impl Sigmoid {
    /// Numerically stable σ(x) = 1 / (1 + exp(-x)).
    pub(crate) fn sigmoid(x: &Array1<f32>) -> Array1<f32> {
        x.mapv(|v| {
            if v >= 0.0 {
                let exp_neg = (-v).exp();
                1.0 / (1.0 + exp_neg)
            } else {
                let exp_v = v.exp();
                exp_v / (1.0 + exp_v)
            }
        })
    }
}

struct SigmoidBackward {
    input: Tensor,
    out_grad: Rc<RefCell<Option<Array1<f32>>>>,
    out_vals: Array1<f32>,
}

impl BackwardOp for SigmoidBackward {
    fn backward(&self) {
        let upstream = self.out_grad.borrow().clone();
        let Some(upstream) = upstream else { return };

        // dσ/dx = σ(x) * (1 - σ(x))
        let downstream = self.out_vals.mapv(|p| p * (1.0 - p)) * &upstream;
        self.input.accumulate_grad(&downstream);
        if let Some(op) = self.input.backward_op() {
            op.backward();
        }
    }
}

impl Activation for Sigmoid {
    fn apply(&self, input: &Tensor) -> Tensor {
        let out_vals = Self::sigmoid(&input.data());
        let output = Tensor::new(out_vals.clone(), input.requires_grad());
        if input.requires_grad() {
            output.set_backward_op(Rc::new(SigmoidBackward {
                input: input.clone(),
                out_grad: output.grad_cell(),
                out_vals,
            }));
        }
        output
    }

    fn name(&self) -> &'static str {
        "Sigmoid"
    }
}

/// Softmax over the whole tensor (multiclass outputs).
pub struct Softmax;

impl Softmax {
    /// Numerically stable softmax: exp(x_i - max) / sum(exp(x_j - max)).
    pub(crate) fn softmax(x: &Array1<f32>) -> Array1<f32> {
        let max = x.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        let exp_x: Array1<f32> = x.mapv(|v| (v - max).exp());
        let sum: f32 = exp_x.sum();
        exp_x / sum
    }
}

struct SoftmaxBackward {
    input: Tensor,
    out_grad: Rc<RefCell<Option<Array1<f32>>>>,
    probs: Array1<f32>,
}

impl BackwardOp for SoftmaxBackward {
    fn backward(&self) {
        let upstream = self.out_grad.borrow().clone();
        let Some(upstream) = upstream else { return };

        // Jacobian-vector product: p ⊙ (g - (g · p))
        let dot: f32 = (&upstream * &self.probs).sum();
        let downstream = &self.probs * &(upstream - dot);
        self.input.accumulate_grad(&downstream);
        if let Some(op) = self.input.backward_op() {
            op.backward();
        }
    }
}

impl Activation for Softmax {
    fn apply(&self, input: &Tensor) -> Tensor {
        let probs = Self::softmax(&input.data());
        let output = Tensor::new(probs.clone(), input.requires_grad());
        if input.requires_grad() {
            output.set_backward_op(Rc::new(SoftmaxBackward {
                input: input.clone(),
                out_grad: output.grad_cell(),
                probs,
            }));
        }
        output
    }

    fn name(&self) -> &'static str {
        "Softmax"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr1;

    #[test]
    fn test_identity_shares_node() {
        let input = Tensor::from_vec(vec![1.0, -2.0], true);
        let output = Identity.apply(&input);
        assert!(input.same_storage(&output));
    }

    #[test]
    fn test_sigmoid_values() {
        let input = Tensor::from_vec(vec![0.0, 100.0, -100.0], false);
        let output = Sigmoid.apply(&input);
        let vals = output.to_vec();
        assert_abs_diff_eq!(vals[0], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(vals[1], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(vals[2], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_sigmoid_gradient_matches_closed_form() {
        let input = Tensor::from_vec(vec![0.0], true);
        let output = Sigmoid.apply(&input);

        output.set_grad(arr1(&[1.0]));
        output.backward_op().unwrap().backward();

        // σ'(0) = 0.5 * (1 - 0.5) = 0.25
        let grad = input.grad().unwrap();
        assert_abs_diff_eq!(grad[0], 0.25, epsilon = 1e-6);
    }

    #[test]
    fn test_sigmoid_skips_frozen_input() {
        let input = Tensor::from_vec(vec![0.0], false);
        let output = Sigmoid.apply(&input);
        assert!(output.backward_op().is_none());
        assert!(!output.requires_grad());
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let input = Tensor::from_vec(vec![2.0, 1.0, 0.5], false);
        let output = Softmax.apply(&input);
        let sum: f32 = output.to_vec().iter().sum();
        assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_softmax_stable_for_large_logits() {
        let input = Tensor::from_vec(vec![1000.0, 1000.0], false);
        let output = Softmax.apply(&input);
        let vals = output.to_vec();
        assert_abs_diff_eq!(vals[0], 0.5, epsilon = 1e-6);
        assert!(vals.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_softmax_gradient_jvp() {
        // Uniform probabilities with a one-hot upstream gradient:
        // downstream_i = p_i * (g_i - g·p) = 1/3 * (g_i - 1/3)
        let input = Tensor::from_vec(vec![0.0, 0.0, 0.0], true);
        let output = Softmax.apply(&input);

        output.set_grad(arr1(&[1.0, 0.0, 0.0]));
        output.backward_op().unwrap().backward();

        let grad = input.grad().unwrap();
        assert_abs_diff_eq!(grad[0], (1.0 - 1.0 / 3.0) / 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(grad[1], (0.0 - 1.0 / 3.0) / 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_activation_names() {
        assert_eq!(Identity.name(), "Identity");
        assert_eq!(Sigmoid.name(), "Sigmoid");
        assert_eq!(Softmax.name(), "Softmax");
    }
}

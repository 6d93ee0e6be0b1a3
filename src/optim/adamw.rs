//! AdamW optimizer (Adam with decoupled weight decay) over parameter groups.

use ndarray::Array1;

use super::{Optimizer, ParamGroup};

/// AdamW optimizer.
///
/// AdamW decouples weight decay from the gradient-based update. Instead of
/// adding weight decay to the gradient, it applies decay directly to the
/// parameters:
///
/// Standard Adam with L2: θ_t = θ_{t-1} - lr * (m_t / (√v_t + ε) + λ * θ_{t-1})
/// AdamW: θ_t = (1 - lr * λ) * θ_{t-1} - lr_t * m_t / (√v_t + ε)
///
/// Each parameter group carries its own learning rate; moments are kept per
/// parameter and start empty, so a freshly constructed optimizer carries no
/// history from any previous one.
pub struct AdamW {
    groups: Vec<ParamGroup>,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    weight_decay: f32,
    t: u64,
    m: Vec<Vec<Option<Array1<f32>>>>, // First moment, per group per param
    v: Vec<Vec<Option<Array1<f32>>>>, // Second moment
}

impl AdamW {
    /// Create a new AdamW optimizer over the given parameter groups.
    pub fn new(
        groups: Vec<ParamGroup>,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
        weight_decay: f32,
    ) -> Self {
        let m = groups.iter().map(|g| vec![None; g.params.len()]).collect();
        let v = groups.iter().map(|g| vec![None; g.params.len()]).collect();
        Self { groups, beta1, beta2, epsilon, weight_decay, t: 0, m, v }
    }

    /// Create AdamW with default hyperparameters (weight_decay = 0.01).
    pub fn default_params(groups: Vec<ParamGroup>) -> Self {
        Self::new(groups, 0.9, 0.999, 1e-8, 0.01)
    }

    /// Get optimizer step counter.
    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.t
    }

    /// Get beta1 hyperparameter.
    #[must_use]
    pub fn beta1(&self) -> f32 {
        self.beta1
    }

    /// Get beta2 hyperparameter.
    #[must_use]
    pub fn beta2(&self) -> f32 {
        self.beta2
    }

    /// Get weight decay hyperparameter.
    #[must_use]
    pub fn weight_decay(&self) -> f32 {
        self.weight_decay
    }
}

impl Optimizer for AdamW {
    fn zero_grad(&mut self) {
        for group in &self.groups {
            for param in &group.params {
                param.zero_grad();
            }
        }
    }

    fn step(&mut self) {
        self.t += 1;

        // Bias correction factor shared by every group
        let correction = (1.0 - self.beta2.powi(self.t as i32)).sqrt()
            / (1.0 - self.beta1.powi(self.t as i32));

        for (gi, group) in self.groups.iter().enumerate() {
            let lr = group.lr;
            let lr_t = lr * correction;

            for (pi, param) in group.params.iter().enumerate() {
                // Frozen parameters are skipped outright
                if !param.requires_grad() {
                    continue;
                }
                let Some(grad) = param.grad() else { continue };

                // m_t = β1 * m_{t-1} + (1 - β1) * g
                let m_t = match &self.m[gi][pi] {
                    Some(m) => m * self.beta1 + &grad * (1.0 - self.beta1),
                    None => &grad * (1.0 - self.beta1),
                };

                // v_t = β2 * v_{t-1} + (1 - β2) * g²
                let grad_sq = &grad * &grad;
                let v_t = match &self.v[gi][pi] {
                    Some(v) => v * self.beta2 + &grad_sq * (1.0 - self.beta2),
                    None => &grad_sq * (1.0 - self.beta2),
                };

                // θ_t = (1 - lr * λ) * θ_{t-1} - lr_t * m_t / (√v_t + ε)
                let adaptive_update = &m_t / &(v_t.mapv(f32::sqrt) + self.epsilon) * lr_t;
                let weight_decay_factor = 1.0 - lr * self.weight_decay;
                let updated = {
                    let data = param.data();
                    &*data * weight_decay_factor - &adaptive_update
                };
                *param.data_mut() = updated;

                self.m[gi][pi] = Some(m_t);
                self.v[gi][pi] = Some(v_t);
            }
        }
    }

    fn groups(&self) -> &[ParamGroup] {
        &self.groups
    }

    fn set_group_lr(&mut self, idx: usize, lr: f32) {
        if let Some(group) = self.groups.get_mut(idx) {
            group.lr = lr;
        }
    }
}

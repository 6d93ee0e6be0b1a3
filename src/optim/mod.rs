//! Optimizers and learning-rate schedules for warm-up training.

mod adamw;
mod scheduler;

pub use adamw::AdamW;
pub use scheduler::{CyclicLR, LRScheduler};

use crate::Tensor;

/// One optimizer parameter group: a parameter set and its learning rate.
#[derive(Clone)]
pub struct ParamGroup {
    /// Parameter handles updated at this group's rate.
    pub params: Vec<Tensor>,
    /// Current learning rate for the group.
    pub lr: f32,
}

impl ParamGroup {
    /// Create a parameter group.
    pub fn new(params: Vec<Tensor>, lr: f32) -> Self {
        Self { params, lr }
    }
}

/// Trait for optimization algorithms over parameter groups.
///
/// Optimizers are built fresh from a group specification; any internal
/// state (momentum, moments) starts empty.
pub trait Optimizer {
    /// Clear gradients on every grouped parameter.
    fn zero_grad(&mut self);

    /// Apply one update step to every trainable grouped parameter.
    fn step(&mut self);

    /// The parameter groups, in construction order.
    fn groups(&self) -> &[ParamGroup];

    /// Set the learning rate of group `idx`. Out-of-range indexes are ignored.
    fn set_group_lr(&mut self, idx: usize, lr: f32);

    /// Learning rate of the first group.
    fn lr(&self) -> f32 {
        self.groups().first().map_or(0.0, |g| g.lr)
    }

    /// Set the same learning rate on every group.
    fn set_lr(&mut self, lr: f32) {
        for idx in 0..self.groups().len() {
            self.set_group_lr(idx, lr);
        }
    }
}

//! Learning rate schedulers.
//!
//! Provides the cyclical schedule used by the warm-up routines:
//! - `CyclicLR` - Triangular cycle between a base and a peak rate,
//!   optionally with one (base, max) pair per optimizer parameter group.

use super::Optimizer;
use crate::error::{CalentarError, Result};

/// Learning rate scheduler trait.
pub trait LRScheduler {
    /// Get the current learning rate (first group).
    fn get_lr(&self) -> f32;

    /// Step the scheduler (typically called after each batch).
    fn step(&mut self);

    /// Push the current rate(s) into an optimizer.
    fn apply(&self, optimizer: &mut dyn Optimizer) {
        optimizer.set_lr(self.get_lr());
    }
}

/// Triangular cyclical learning rate scheduler.
///
/// Linearly ramps each group's rate from base to max over `step_size_up`
/// steps, then back down to base over `step_size_down` steps:
///
/// ```text
/// lr_t = base + (max - base) * scale(t)
///
/// scale(t) = t / up                for t in [0, up)
///          = 1 - (t - up) / down   for t in [up, up + down)
/// ```
///
/// The cycle repeats after `up + down` steps. Only learning rates are
/// cycled; optimizer momentum terms are left alone.
pub struct CyclicLR {
    base_lrs: Vec<f32>,
    max_lrs: Vec<f32>,
    step_size_up: usize,
    step_size_down: usize,
    current_step: usize,
}

impl CyclicLR {
    /// Create a single-group triangular schedule.
    pub fn new(base_lr: f32, max_lr: f32, step_size_up: usize, step_size_down: usize) -> Self {
        Self {
            base_lrs: vec![base_lr],
            max_lrs: vec![max_lr],
            step_size_up,
            step_size_down,
            current_step: 0,
        }
    }

    /// Create a schedule with one (base, max) pair per parameter group.
    ///
    /// The two lists must be non-empty and of equal length.
    pub fn per_group(
        base_lrs: Vec<f32>,
        max_lrs: Vec<f32>,
        step_size_up: usize,
        step_size_down: usize,
    ) -> Result<Self> {
        if base_lrs.is_empty() || base_lrs.len() != max_lrs.len() {
            return Err(CalentarError::invalid_argument(
                "base_lrs/max_lrs",
                format!(
                    "need matching non-empty rate lists, got {} base and {} max",
                    base_lrs.len(),
                    max_lrs.len()
                ),
                "supply one (base, max) pair per optimizer parameter group",
            ));
        }
        Ok(Self {
            base_lrs,
            max_lrs,
            step_size_up,
            step_size_down,
            current_step: 0,
        })
    }

    /// Position inside the triangle, in [0, 1].
    fn scale(&self) -> f32 {
        let cycle_len = self.step_size_up + self.step_size_down;
        if cycle_len == 0 {
            return 0.0;
        }
        let s = self.current_step % cycle_len;
        if s < self.step_size_up {
            s as f32 / self.step_size_up as f32
        } else if self.step_size_down == 0 {
            1.0
        } else {
            1.0 - (s - self.step_size_up) as f32 / self.step_size_down as f32
        }
    }

    /// Current learning rate for every group.
    pub fn group_lrs(&self) -> Vec<f32> {
        let scale = self.scale();
        self.base_lrs
            .iter()
            .zip(self.max_lrs.iter())
            .map(|(&base, &max)| base + (max - base) * scale)
            .collect()
    }

    /// Number of scheduled groups.
    pub fn num_groups(&self) -> usize {
        self.base_lrs.len()
    }
}

impl LRScheduler for CyclicLR {
    fn get_lr(&self) -> f32 {
        // Constructors guarantee at least one group
        self.group_lrs()[0]
    }

    fn step(&mut self) {
        self.current_step += 1;
    }

    fn apply(&self, optimizer: &mut dyn Optimizer) {
        for (idx, lr) in self.group_lrs().into_iter().enumerate() {
            optimizer.set_group_lr(idx, lr);
        }
    }
}

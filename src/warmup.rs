//! Staged warm-up schedules for model components.
//!
//! Three warm-up procedures are available before joint training of a
//! composite model:
//! 1. Warm up all trainable layers at once ([`WarmUpController::warm_all`])
//! 2. Gradual warm up in the manner of Felbo et al., 2017 (DeepEmoji,
//!    <https://arxiv.org/abs/1708.00524>)
//! 3. Gradual warm up in the manner of Howard & Ruder, 2018 (ULMFiT,
//!    <https://arxiv.org/abs/1801.06146>)
//!
//! All three use a one-cycle triangular learning rate: the rate rises from
//! max/10 to max over the first 10% of steps, then falls back over the
//! remaining 90% (the "slanted triangular" schedule of ULMFiT). The
//! optimizer is AdamW, rebuilt from scratch for every schedule so no moment
//! history leaks between stages.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data::DataLoader;
use crate::error::{CalentarError, Result};
use crate::model::{Model, Module};
use crate::optim::{AdamW, CyclicLR, LRScheduler, Optimizer, ParamGroup};
use crate::tensor::backward;
use crate::train::{Activation, BCELoss, CrossEntropyLoss, Identity, LossFn, MSELoss, Metric,
    Sigmoid, Softmax};
use crate::Tensor;

/// Training objective of the component being warmed.
///
/// Decides the conventional activation/loss pairing and how targets are
/// interpreted: continuous values for `Regression`, {0, 1} labels for
/// `Binary`, one-hot rows for `Multiclass`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Objective {
    Binary,
    Regression,
    Multiclass,
}

impl FromStr for Objective {
    type Err = CalentarError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "binary" => Ok(Objective::Binary),
            "regression" => Ok(Objective::Regression),
            "multiclass" => Ok(Objective::Multiclass),
            other => Err(CalentarError::invalid_argument(
                "objective",
                format!("unrecognized objective '{other}'"),
                "use 'binary', 'regression' or 'multiclass'",
            )),
        }
    }
}

/// Gradual warm-up routine.
///
/// - `Felbo`: one layer at a time, re-freezing each before the next, plus
///   one final epoch with every layer trainable.
/// - `Howard`: cumulative; once a layer is unfrozen it stays trainable and
///   joins the optimizer as an extra parameter group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Routine {
    Felbo,
    Howard,
}

impl FromStr for Routine {
    type Err = CalentarError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "felbo" => Ok(Routine::Felbo),
            "howard" => Ok(Routine::Howard),
            other => Err(CalentarError::invalid_argument(
                "routine",
                format!("unrecognized routine '{other}'"),
                "use 'felbo' or 'howard'",
            )),
        }
    }
}

impl fmt::Display for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Routine::Felbo => write!(f, "felbo"),
            Routine::Howard => write!(f, "howard"),
        }
    }
}

/// Calculate the number of steps up and down for the one-cycle schedule.
///
/// 10% of the total steps (rounded) ramp the rate up, the rest ramp it
/// down; the two always sum to `steps * n_epochs`.
pub fn steps_up_down(steps: usize, n_epochs: usize) -> (usize, usize) {
    let total = steps * n_epochs;
    let up = (total as f64 * 0.1).round() as usize;
    (up, total - up)
}

/// Per-layer learning-rate ceilings for `n_layers` in warm-up order.
///
/// The layer closest to the output trains at 0.01; each deeper layer's
/// ceiling shrinks by a factor of 2.5 per position.
fn layer_max_lrs(n_layers: usize) -> Vec<f32> {
    (0..n_layers)
        .map(|i| if i == 0 { 0.01 } else { 0.01 / (2.5 * i as f32) })
        .collect()
}

/// Optimizer and schedule for the whole-model path: one group holding every
/// parameter, starting at max_lr / 10, with a single triangular cycle
/// spanning all epochs and peaking at max_lr.
fn whole_model_schedule(
    params: Vec<Tensor>,
    max_lr: f32,
    steps: usize,
    n_epochs: usize,
) -> (AdamW, CyclicLR) {
    let base_lr = max_lr / 10.0;
    let optimizer = AdamW::default_params(vec![ParamGroup::new(params, base_lr)]);
    let (step_size_up, step_size_down) = steps_up_down(steps, n_epochs);
    let scheduler = CyclicLR::new(base_lr, max_lr, step_size_up, step_size_down);
    (optimizer, scheduler)
}

/// Snapshot of every parameter's trainable flag, restored on drop.
///
/// Restoration runs on every exit path of the scope that holds it,
/// including `?` early returns and unwinding.
struct TrainableSnapshot {
    saved: Vec<(Tensor, bool)>,
}

impl TrainableSnapshot {
    fn capture(named: Vec<(String, Tensor)>) -> Self {
        let saved = named
            .into_iter()
            .map(|(_, tensor)| {
                let flag = tensor.requires_grad();
                (tensor, flag)
            })
            .collect();
        Self { saved }
    }
}

impl Drop for TrainableSnapshot {
    fn drop(&mut self) {
        for (tensor, flag) in &self.saved {
            tensor.set_requires_grad(*flag);
        }
    }
}

/// Accumulating per-layer schedule: parameter groups plus the matching
/// max/base learning-rate lists, grown one layer at a time.
struct GroupSchedule {
    groups: Vec<ParamGroup>,
    max_lrs: Vec<f32>,
    base_lrs: Vec<f32>,
}

impl GroupSchedule {
    fn new() -> Self {
        Self {
            groups: Vec::new(),
            max_lrs: Vec::new(),
            base_lrs: Vec::new(),
        }
    }

    /// Append one layer's parameters as a group at ceiling `lr`.
    fn push_layer(&mut self, params: Vec<Tensor>, lr: f32) {
        self.groups.push(ParamGroup::new(params, lr / 10.0));
        self.max_lrs.push(lr);
        self.base_lrs.push(lr / 10.0);
    }

    /// Fresh optimizer over the current groups (no inherited moments).
    fn optimizer(&self) -> AdamW {
        AdamW::default_params(self.groups.clone())
    }

    /// Matching triangular schedule over the current groups.
    fn scheduler(&self, step_size_up: usize, step_size_down: usize) -> Result<CyclicLR> {
        CyclicLR::per_group(
            self.base_lrs.clone(),
            self.max_lrs.clone(),
            step_size_up,
            step_size_down,
        )
    }
}

/// Warm-up driver for the components of a composite model.
///
/// Holds the activation, loss, optional metric, objective and verbosity
/// shared by every warm-up call; the model, loader and layer list are
/// supplied per call and never owned.
pub struct WarmUpController {
    activation: Box<dyn Activation>,
    loss_fn: Box<dyn LossFn>,
    metric: Option<Box<dyn Metric>>,
    objective: Objective,
    verbose: bool,
}

impl WarmUpController {
    /// Create a controller with an explicit activation/loss pairing.
    pub fn new(
        activation: Box<dyn Activation>,
        loss_fn: Box<dyn LossFn>,
        objective: Objective,
    ) -> Self {
        Self {
            activation,
            loss_fn,
            metric: None,
            objective,
            verbose: false,
        }
    }

    /// Create a controller with the conventional pairing for `objective`:
    /// sigmoid + BCE for binary, identity + MSE for regression,
    /// softmax + cross-entropy for multiclass.
    pub fn for_objective(objective: Objective) -> Self {
        let (activation, loss_fn): (Box<dyn Activation>, Box<dyn LossFn>) = match objective {
            Objective::Binary => (Box::new(Sigmoid), Box::new(BCELoss)),
            Objective::Regression => (Box::new(Identity), Box::new(MSELoss)),
            Objective::Multiclass => (Box::new(Softmax), Box::new(CrossEntropyLoss)),
        };
        Self::new(activation, loss_fn, objective)
    }

    /// Report a metric per batch instead of the RMSE-style loss fallback.
    pub fn with_metric(mut self, metric: Box<dyn Metric>) -> Self {
        self.metric = Some(metric);
        self
    }

    /// Print per-batch progress.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// The configured objective.
    pub fn objective(&self) -> Objective {
        self.objective
    }

    /// Warm up all trainable layers of `model` at once.
    ///
    /// One AdamW over every parameter, starting at `max_lr / 10`, driven by
    /// a single triangular cycle spanning `n_epochs` epochs that peaks at
    /// `max_lr`. Parameters are updated in place; trainable flags are left
    /// untouched (nothing is frozen here).
    ///
    /// `model_name` selects this component's input tensor from each batch.
    /// Returns the final epoch's mean loss.
    pub fn warm_all(
        &self,
        model: &mut dyn Model,
        model_name: &str,
        loader: &dyn DataLoader,
        n_epochs: usize,
        max_lr: f32,
    ) -> Result<f32> {
        if n_epochs == 0 {
            return Err(CalentarError::invalid_argument(
                "n_epochs",
                "warm-up needs at least one epoch",
                "pass n_epochs >= 1",
            ));
        }
        check_positive_lr(max_lr)?;

        if self.verbose {
            println!("Warming up {model_name} for {n_epochs} epochs");
        }
        model.set_training(true);

        let params: Vec<Tensor> = model
            .named_parameters()
            .into_iter()
            .map(|(_, tensor)| tensor)
            .collect();
        let (mut optimizer, mut scheduler) =
            whole_model_schedule(params, max_lr, loader.len(), n_epochs);

        self.run_warm(model, model_name, loader, &mut optimizer, &mut scheduler, n_epochs)
    }

    /// Warm up `layers` of `model` gradually, in warm-up order
    /// (closest-to-output first).
    ///
    /// Every layer's ceiling comes from the fixed schedule 0.01,
    /// 0.01/2.5, 0.01/5.0, ...: one ceiling per layer, shrinking by a
    /// factor of 2.5 per position. `max_lr` is validated but does not feed
    /// that schedule; it is kept for call-site symmetry with
    /// [`warm_all`](Self::warm_all).
    ///
    /// Whatever happens (normal completion, an error from the driver, a
    /// panic in a collaborator), every parameter's trainable flag is
    /// restored to its pre-call value before this function is done.
    /// Returns the final epoch's mean loss.
    pub fn warm_gradual(
        &self,
        model: &mut dyn Model,
        model_name: &str,
        loader: &dyn DataLoader,
        max_lr: f32,
        layers: &[&dyn Module],
        routine: Routine,
    ) -> Result<f32> {
        if layers.is_empty() {
            return Err(CalentarError::invalid_argument(
                "layers",
                "no layers to warm up",
                "pass the sub-modules to warm, closest to the output first",
            ));
        }
        check_positive_lr(max_lr)?;

        model.set_training(true);
        let (step_size_up, step_size_down) = steps_up_down(loader.len(), 1);

        // Restored on drop, on every exit path below
        let _restore = TrainableSnapshot::capture(model.named_parameters());

        let max_lrs = layer_max_lrs(layers.len());

        for layer in layers {
            set_trainable(&layer.parameters(), false);
        }

        let mut schedule = GroupSchedule::new();
        let mut final_loss = 0.0;

        for (i, (lr, layer)) in max_lrs.iter().copied().zip(layers.iter()).enumerate() {
            if self.verbose {
                println!("Warming up {model_name}, layer {} of {}", i + 1, layers.len());
            }
            set_trainable(&layer.parameters(), true);

            let (mut optimizer, mut scheduler) = match routine {
                Routine::Felbo => {
                    let mut single = GroupSchedule::new();
                    single.push_layer(layer.parameters(), lr);
                    (single.optimizer(), single.scheduler(step_size_up, step_size_down)?)
                }
                Routine::Howard => {
                    schedule.push_layer(layer.parameters(), lr);
                    (schedule.optimizer(), schedule.scheduler(step_size_up, step_size_down)?)
                }
            };

            final_loss =
                self.run_warm(model, model_name, loader, &mut optimizer, &mut scheduler, 1)?;

            if routine == Routine::Felbo {
                set_trainable(&layer.parameters(), false);
            }
        }

        if routine == Routine::Felbo {
            if self.verbose {
                println!("Warming up one last epoch with all warmed up layers trainable");
            }
            for layer in layers {
                set_trainable(&layer.parameters(), true);
            }

            let mut joint = GroupSchedule::new();
            for (lr, layer) in max_lrs.iter().copied().zip(layers.iter()) {
                joint.push_layer(layer.parameters(), lr);
            }
            let mut optimizer = joint.optimizer();
            let mut scheduler = joint.scheduler(step_size_up, step_size_down)?;

            final_loss =
                self.run_warm(model, model_name, loader, &mut optimizer, &mut scheduler, 1)?;
        }

        Ok(final_loss)
    }

    /// Shared per-epoch training driver.
    ///
    /// One pass: select the input keyed by `model_name`, forward, activate,
    /// compute loss, backward, optimizer step, scheduler step. Reports the
    /// metric per batch when one is configured, otherwise the square root
    /// of the running mean loss. Returns the final epoch's mean loss.
    fn run_warm(
        &self,
        model: &mut dyn Model,
        model_name: &str,
        loader: &dyn DataLoader,
        optimizer: &mut dyn Optimizer,
        scheduler: &mut dyn LRScheduler,
        n_epochs: usize,
    ) -> Result<f32> {
        let mut epoch_loss = 0.0;

        for epoch in 0..n_epochs {
            let mut running_loss = 0.0;

            for (batch_idx, batch) in loader.batches().enumerate() {
                let input = batch.input(model_name).ok_or_else(|| {
                    let mut available: Vec<&str> = batch.input_names().collect();
                    available.sort_unstable();
                    CalentarError::invalid_argument(
                        "model_name",
                        format!("batch has no input keyed '{model_name}'"),
                        format!("available inputs: {}", available.join(", ")),
                    )
                })?;

                optimizer.zero_grad();
                let output = model.forward(input);
                let y_pred = self.activation.apply(&output);
                let loss = self.loss_fn.forward(&y_pred, &batch.targets);
                backward(&loss);
                optimizer.step();
                scheduler.step();
                scheduler.apply(optimizer);

                running_loss += loss.item();
                let avg_loss = running_loss / (batch_idx as f32 + 1.0);

                let score = self
                    .metric
                    .as_ref()
                    .map(|metric| metric.compute(&y_pred, &batch.targets));
                if self.verbose {
                    match (&self.metric, score) {
                        (Some(metric), Some(score)) => println!(
                            "epoch {}: {}: {score:.4}, loss: {avg_loss:.4}",
                            epoch + 1,
                            metric.name()
                        ),
                        _ => println!("epoch {}: loss: {:.4}", epoch + 1, avg_loss.sqrt()),
                    }
                }

                epoch_loss = avg_loss;
            }
        }

        Ok(epoch_loss)
    }
}

fn set_trainable(params: &[Tensor], on: bool) {
    for param in params {
        param.set_requires_grad(on);
    }
}

fn check_positive_lr(max_lr: f32) -> Result<()> {
    if max_lr > 0.0 {
        Ok(())
    } else {
        Err(CalentarError::invalid_argument(
            "max_lr",
            format!("learning rate must be positive, got {max_lr}"),
            "pass a peak learning rate above zero",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    #[test]
    fn test_steps_up_down_examples() {
        assert_eq!(steps_up_down(100, 1), (10, 90));
        // round(6.6) = 7, 66 - 7 = 59
        assert_eq!(steps_up_down(33, 2), (7, 59));
    }

    #[test]
    fn test_steps_up_down_zero() {
        assert_eq!(steps_up_down(0, 1), (0, 0));
        assert_eq!(steps_up_down(10, 0), (0, 0));
    }

    proptest! {
        #[test]
        fn prop_steps_up_down_partition(steps in 0usize..10_000, n_epochs in 0usize..100) {
            let (up, down) = steps_up_down(steps, n_epochs);
            let total = steps * n_epochs;
            prop_assert_eq!(up + down, total);
            prop_assert_eq!(up, (total as f64 * 0.1).round() as usize);
        }
    }

    #[test]
    fn test_layer_max_lrs_sequence() {
        let lrs = layer_max_lrs(4);
        assert_abs_diff_eq!(lrs[0], 0.01, epsilon = 1e-8);
        assert_abs_diff_eq!(lrs[1], 0.01 / 2.5, epsilon = 1e-8);
        assert_abs_diff_eq!(lrs[2], 0.01 / 5.0, epsilon = 1e-8);
        assert_abs_diff_eq!(lrs[3], 0.01 / 7.5, epsilon = 1e-8);
    }

    #[test]
    fn test_layer_max_lrs_monotonically_decreasing() {
        let lrs = layer_max_lrs(8);
        for pair in lrs.windows(2) {
            assert!(pair[1] < pair[0]);
        }
    }

    #[test]
    fn test_routine_from_str() {
        assert_eq!("felbo".parse::<Routine>().unwrap(), Routine::Felbo);
        assert_eq!("howard".parse::<Routine>().unwrap(), Routine::Howard);

        let err = "chain-thaw".parse::<Routine>().unwrap_err();
        assert!(matches!(err, CalentarError::InvalidArgument { .. }));
        assert!(err.to_string().contains("chain-thaw"));
    }

    #[test]
    fn test_routine_rejects_case_variants() {
        assert!("Felbo".parse::<Routine>().is_err());
        assert!("HOWARD".parse::<Routine>().is_err());
        assert!("".parse::<Routine>().is_err());
    }

    #[test]
    fn test_objective_from_str() {
        assert_eq!("binary".parse::<Objective>().unwrap(), Objective::Binary);
        assert_eq!("regression".parse::<Objective>().unwrap(), Objective::Regression);
        assert_eq!("multiclass".parse::<Objective>().unwrap(), Objective::Multiclass);
        assert!("ranking".parse::<Objective>().is_err());
    }

    #[test]
    fn test_routine_serde_round_trip() {
        let json = serde_json::to_string(&Routine::Felbo).unwrap();
        assert_eq!(json, "\"felbo\"");
        let back: Routine = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Routine::Felbo);

        let objective: Objective = serde_json::from_str("\"multiclass\"").unwrap();
        assert_eq!(objective, Objective::Multiclass);
    }

    #[test]
    fn test_routine_display() {
        assert_eq!(Routine::Felbo.to_string(), "felbo");
        assert_eq!(Routine::Howard.to_string(), "howard");
    }

    #[test]
    fn test_whole_model_schedule_starts_at_tenth_and_peaks_at_max() {
        let (optimizer, mut scheduler) =
            whole_model_schedule(vec![Tensor::zeros(2, true)], 0.1, 100, 1);

        assert_abs_diff_eq!(optimizer.lr(), 0.01, epsilon = 1e-8);
        assert_abs_diff_eq!(scheduler.get_lr(), 0.01, epsilon = 1e-8);

        // Peak after the up phase: 10% of 100 steps
        for _ in 0..10 {
            scheduler.step();
        }
        assert_abs_diff_eq!(scheduler.get_lr(), 0.1, epsilon = 1e-8);
    }

    #[test]
    fn test_group_schedule_grows_in_lockstep() {
        let mut schedule = GroupSchedule::new();
        schedule.push_layer(vec![Tensor::zeros(2, true)], 0.01);
        schedule.push_layer(vec![Tensor::zeros(2, true)], 0.004);

        assert_eq!(schedule.groups.len(), 2);
        assert_eq!(schedule.max_lrs, vec![0.01, 0.004]);
        assert_abs_diff_eq!(schedule.base_lrs[0], 0.001, epsilon = 1e-8);
        assert_abs_diff_eq!(schedule.base_lrs[1], 0.0004, epsilon = 1e-8);
        // Groups start at their base rate
        assert_abs_diff_eq!(schedule.groups[1].lr, 0.0004, epsilon = 1e-8);
    }

    #[test]
    fn test_group_schedule_optimizer_is_fresh() {
        let mut schedule = GroupSchedule::new();
        schedule.push_layer(vec![Tensor::zeros(2, true)], 0.01);
        assert_eq!(schedule.optimizer().step_count(), 0);
    }

    #[test]
    fn test_trainable_snapshot_restores_on_drop() {
        let a = Tensor::zeros(1, true);
        let b = Tensor::zeros(1, false);

        {
            let _snapshot = TrainableSnapshot::capture(vec![
                ("a".to_string(), a.clone()),
                ("b".to_string(), b.clone()),
            ]);
            a.set_requires_grad(false);
            b.set_requires_grad(true);
        }

        assert!(a.requires_grad());
        assert!(!b.requires_grad());
    }

    #[test]
    fn test_trainable_snapshot_restores_on_panic() {
        let param = Tensor::zeros(1, true);
        let captured = param.clone();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _snapshot =
                TrainableSnapshot::capture(vec![("w".to_string(), captured.clone())]);
            captured.set_requires_grad(false);
            panic!("collaborator blew up");
        }));

        assert!(result.is_err());
        assert!(param.requires_grad(), "flag not restored across unwind");
    }

    #[test]
    fn test_check_positive_lr() {
        assert!(check_positive_lr(0.01).is_ok());
        assert!(check_positive_lr(0.0).is_err());
        assert!(check_positive_lr(-1.0).is_err());
        assert!(check_positive_lr(f32::NAN).is_err());
    }

    #[test]
    fn test_for_objective_pairings() {
        let controller = WarmUpController::for_objective(Objective::Regression);
        assert_eq!(controller.objective(), Objective::Regression);
        assert_eq!(controller.activation.name(), "Identity");
        assert_eq!(controller.loss_fn.name(), "MSE");

        let controller = WarmUpController::for_objective(Objective::Binary);
        assert_eq!(controller.activation.name(), "Sigmoid");
        assert_eq!(controller.loss_fn.name(), "BCE");

        let controller = WarmUpController::for_objective(Objective::Multiclass);
        assert_eq!(controller.activation.name(), "Softmax");
        assert_eq!(controller.loss_fn.name(), "CrossEntropy");
    }
}

//! Staged layer-wise warm-up training for neural network components.
//!
//! Before a composite model is trained jointly, each of its components can
//! be "warmed up" on its own with a one-cycle triangular learning rate.
//! This crate provides:
//! - Whole-model warm-up (one AdamW over every parameter)
//! - Gradual layer-by-layer warm-up (Felbo and Howard routines)
//! - The triangular `CyclicLR` schedule with per-group rates
//! - Activation, loss and metric seams for the step driver
//!
//! Trainable flags are snapshot before a gradual warm-up and restored on
//! every exit path, so a failed run never leaves a model partially frozen.
//!
//! # Example
//!
//! ```no_run
//! use calentar::{Batch, InMemoryLoader, Model, Objective, Routine, WarmUpController};
//!
//! let controller = WarmUpController::for_objective(Objective::Regression)
//!     .with_verbose(true);
//!
//! # let mut model: Box<dyn Model> = todo!();
//! # let batches: Vec<Batch> = vec![];
//! let loader = InMemoryLoader::new(batches);
//!
//! // Whole-model warm-up: 5 epochs, peaking at lr = 0.01
//! let loss = controller.warm_all(model.as_mut(), "dense", &loader, 5, 0.01)?;
//! println!("warmed up, final loss {loss:.4}");
//!
//! // Or gradually, layer by layer
//! let routine: Routine = "howard".parse()?;
//! # Ok::<(), calentar::CalentarError>(())
//! ```

mod data;
mod error;
mod model;
pub mod optim;
mod tensor;
pub mod train;
mod warmup;

pub use data::{Batch, DataLoader, InMemoryLoader};
pub use error::{CalentarError, Result};
pub use model::{Model, Module};
pub use tensor::{backward, BackwardOp, Tensor};
pub use warmup::{steps_up_down, Objective, Routine, WarmUpController};

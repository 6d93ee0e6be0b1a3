//! Model and sub-module seams.
//!
//! The warm-up controller never owns a model; it drives anything that can
//! enumerate its parameters as shared [`Tensor`] handles.

use crate::Tensor;

/// A trainable sub-module: anything that can enumerate its parameters.
///
/// The handles returned must share storage with the module's live
/// parameters, so that toggling a trainable flag or applying an optimizer
/// step through a handle is visible to the module itself.
pub trait Module {
    /// Parameter handles, in a stable order.
    fn parameters(&self) -> Vec<Tensor>;
}

/// A model component that can be warmed up.
pub trait Model: Module {
    /// Forward pass over one input tensor.
    fn forward(&self, input: &Tensor) -> Tensor;

    /// Every parameter with its dotted name (e.g. `"dense.0.weight"`).
    fn named_parameters(&self) -> Vec<(String, Tensor)>;

    /// Toggle training mode.
    fn set_training(&mut self, training: bool);
}

//! Shared-storage parameter tensor with a gradient cell and trainable flag.
//!
//! A `Tensor` is a cheap handle: clones share the underlying data, gradient,
//! trainable flag, and backward hook. This is what lets a model, a caller's
//! layer list, and an optimizer's parameter groups all observe the same
//! parameter: freezing a layer through one handle freezes it everywhere.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::rc::Rc;

use ndarray::Array1;

/// Reverse-mode gradient hook.
///
/// An op captures whatever it needs at forward time (saved values, the
/// output's gradient cell, the input handles) and on `backward` writes
/// gradients into its inputs, then invokes their own hooks in turn.
pub trait BackwardOp {
    /// Propagate gradients one step down the graph.
    fn backward(&self);
}

/// A 1-D float tensor with shared storage.
#[derive(Clone)]
pub struct Tensor {
    data: Rc<RefCell<Array1<f32>>>,
    grad: Rc<RefCell<Option<Array1<f32>>>>,
    requires_grad: Rc<Cell<bool>>,
    backward_op: Rc<RefCell<Option<Rc<dyn BackwardOp>>>>,
}

impl Tensor {
    /// Create a tensor from an ndarray.
    pub fn new(data: Array1<f32>, requires_grad: bool) -> Self {
        Self {
            data: Rc::new(RefCell::new(data)),
            grad: Rc::new(RefCell::new(None)),
            requires_grad: Rc::new(Cell::new(requires_grad)),
            backward_op: Rc::new(RefCell::new(None)),
        }
    }

    /// Create a tensor from a plain vector.
    pub fn from_vec(data: Vec<f32>, requires_grad: bool) -> Self {
        Self::new(Array1::from(data), requires_grad)
    }

    /// Create a zero-filled tensor of the given length.
    pub fn zeros(len: usize, requires_grad: bool) -> Self {
        Self::new(Array1::zeros(len), requires_grad)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.borrow().len()
    }

    /// Whether the tensor holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the underlying data.
    pub fn data(&self) -> Ref<'_, Array1<f32>> {
        self.data.borrow()
    }

    /// Mutably borrow the underlying data.
    pub fn data_mut(&self) -> RefMut<'_, Array1<f32>> {
        self.data.borrow_mut()
    }

    /// Copy the data out as a plain vector.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.borrow().to_vec()
    }

    /// First element of a scalar tensor (e.g. a loss value).
    pub fn item(&self) -> f32 {
        self.data.borrow()[0]
    }

    /// Current gradient, if any.
    pub fn grad(&self) -> Option<Array1<f32>> {
        self.grad.borrow().clone()
    }

    /// The shared gradient cell, for backward ops that accumulate into it.
    pub fn grad_cell(&self) -> Rc<RefCell<Option<Array1<f32>>>> {
        Rc::clone(&self.grad)
    }

    /// Overwrite the gradient.
    pub fn set_grad(&self, grad: Array1<f32>) {
        *self.grad.borrow_mut() = Some(grad);
    }

    /// Add `grad` into the gradient cell, respecting the trainable flag.
    ///
    /// Frozen tensors (`requires_grad == false`) silently ignore incoming
    /// gradients, so downstream ops can propagate unconditionally.
    pub fn accumulate_grad(&self, grad: &Array1<f32>) {
        if !self.requires_grad.get() {
            return;
        }
        let mut cell = self.grad.borrow_mut();
        match cell.as_mut() {
            Some(existing) => *existing = &*existing + grad,
            None => *cell = Some(grad.clone()),
        }
    }

    /// Clear the gradient.
    pub fn zero_grad(&self) {
        *self.grad.borrow_mut() = None;
    }

    /// Trainable flag: whether gradients are accumulated and applied.
    pub fn requires_grad(&self) -> bool {
        self.requires_grad.get()
    }

    /// Toggle the trainable flag on the shared storage.
    pub fn set_requires_grad(&self, on: bool) {
        self.requires_grad.set(on);
    }

    /// The backward hook attached to this tensor, if any.
    pub fn backward_op(&self) -> Option<Rc<dyn BackwardOp>> {
        self.backward_op.borrow().clone()
    }

    /// Attach a backward hook.
    pub fn set_backward_op(&self, op: Rc<dyn BackwardOp>) {
        *self.backward_op.borrow_mut() = Some(op);
    }

    /// Whether two handles share the same underlying storage.
    pub fn same_storage(&self, other: &Tensor) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }
}

/// Run a reverse pass from `loss`.
///
/// Seeds the loss gradient with ones when absent, then invokes the loss
/// tensor's backward hook, which propagates down the graph.
pub fn backward(loss: &Tensor) {
    if loss.grad().is_none() {
        loss.set_grad(Array1::ones(loss.len()));
    }
    if let Some(op) = loss.backward_op() {
        op.backward();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_clone_shares_data() {
        let a = Tensor::from_vec(vec![1.0, 2.0], true);
        let b = a.clone();
        b.data_mut()[0] = 9.0;
        assert_eq!(a.data()[0], 9.0);
        assert!(a.same_storage(&b));
    }

    #[test]
    fn test_clone_shares_trainable_flag() {
        let a = Tensor::from_vec(vec![1.0], true);
        let b = a.clone();
        b.set_requires_grad(false);
        assert!(!a.requires_grad());
        a.set_requires_grad(true);
        assert!(b.requires_grad());
    }

    #[test]
    fn test_accumulate_grad_adds() {
        let t = Tensor::from_vec(vec![0.0, 0.0], true);
        t.accumulate_grad(&arr1(&[1.0, 2.0]));
        t.accumulate_grad(&arr1(&[0.5, 0.5]));
        let grad = t.grad().unwrap();
        assert_eq!(grad.to_vec(), vec![1.5, 2.5]);
    }

    #[test]
    fn test_accumulate_grad_respects_frozen_flag() {
        let t = Tensor::from_vec(vec![0.0], false);
        t.accumulate_grad(&arr1(&[1.0]));
        assert!(t.grad().is_none());
    }

    #[test]
    fn test_zero_grad_clears() {
        let t = Tensor::from_vec(vec![0.0], true);
        t.set_grad(arr1(&[3.0]));
        assert!(t.grad().is_some());
        t.zero_grad();
        assert!(t.grad().is_none());
    }

    #[test]
    fn test_backward_seeds_scalar_loss_with_ones() {
        let loss = Tensor::from_vec(vec![0.25], true);
        backward(&loss);
        assert_eq!(loss.grad().unwrap().to_vec(), vec![1.0]);
    }

    #[test]
    fn test_distinct_tensors_do_not_share() {
        let a = Tensor::from_vec(vec![1.0], true);
        let b = Tensor::from_vec(vec![1.0], true);
        assert!(!a.same_storage(&b));
    }
}

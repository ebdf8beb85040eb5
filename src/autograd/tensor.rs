//! Tensor type with shared gradient storage

use super::BackwardOp;
use crate::{Error, Result};
use ndarray::{Array1, ArrayD, IxDyn};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Shared gradient slot; every clone of a tensor points at the same cell
pub type GradCell = Rc<RefCell<Option<ArrayD<f32>>>>;

/// N-dimensional tensor participating in the autograd graph
///
/// Cloning is cheap: the data buffer is reference counted and the gradient
/// cell is shared, so a parameter cloned into a forward graph receives the
/// gradients accumulated by the backward pass.
#[derive(Clone)]
pub struct Tensor {
    data: Rc<ArrayD<f32>>,
    grad: GradCell,
    backward_op: Option<Rc<dyn BackwardOp>>,
    requires_grad: bool,
}

impl Tensor {
    /// Create a tensor from an n-d array
    pub fn new(data: ArrayD<f32>, requires_grad: bool) -> Self {
        Self {
            data: Rc::new(data),
            grad: Rc::new(RefCell::new(None)),
            backward_op: None,
            requires_grad,
        }
    }

    /// Create a 1-d tensor from a vector
    pub fn from_vec(data: Vec<f32>, requires_grad: bool) -> Self {
        Self::new(Array1::from(data).into_dyn(), requires_grad)
    }

    /// Create a tensor with an explicit shape
    pub fn from_shape_vec(shape: &[usize], data: Vec<f32>, requires_grad: bool) -> Result<Self> {
        let actual = data.len();
        let array = ArrayD::from_shape_vec(IxDyn(shape), data).map_err(|_| {
            Error::shape("tensor data", &[shape.iter().product()], &[actual])
        })?;
        Ok(Self::new(array, requires_grad))
    }

    /// Tensor of zeros
    pub fn zeros(shape: &[usize], requires_grad: bool) -> Self {
        Self::new(ArrayD::zeros(IxDyn(shape)), requires_grad)
    }

    /// Tensor of ones
    pub fn ones(shape: &[usize], requires_grad: bool) -> Self {
        Self::new(ArrayD::ones(IxDyn(shape)), requires_grad)
    }

    /// Underlying data
    pub fn data(&self) -> &ArrayD<f32> {
        &self.data
    }

    /// Mutable data; copies the buffer first if a graph still holds it
    pub fn data_mut(&mut self) -> &mut ArrayD<f32> {
        Rc::make_mut(&mut self.data)
    }

    /// Shape of the tensor
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the tensor holds no elements
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// First element, for scalar results such as losses
    pub fn item(&self) -> f32 {
        self.data.iter().next().copied().unwrap_or(0.0)
    }

    /// Whether gradients flow into this tensor
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Snapshot of the accumulated gradient
    pub fn grad(&self) -> Option<ArrayD<f32>> {
        self.grad.borrow().clone()
    }

    /// Shared gradient cell, captured by backward ops as their output slot
    pub fn grad_cell(&self) -> GradCell {
        Rc::clone(&self.grad)
    }

    /// Overwrite the gradient
    pub fn set_grad(&self, grad: ArrayD<f32>) {
        *self.grad.borrow_mut() = Some(grad);
    }

    /// Add to the gradient, initializing it on first use
    pub fn accumulate_grad(&self, grad: ArrayD<f32>) {
        let mut slot = self.grad.borrow_mut();
        match slot.as_mut() {
            Some(existing) => *existing += &grad,
            None => *slot = Some(grad),
        }
    }

    /// Clear the gradient
    pub fn zero_grad(&self) {
        *self.grad.borrow_mut() = None;
    }

    /// Backward op that produced this tensor, if any
    pub fn backward_op(&self) -> Option<Rc<dyn BackwardOp>> {
        self.backward_op.clone()
    }

    /// Attach the backward op that produced this tensor
    pub fn set_backward_op(&mut self, op: Rc<dyn BackwardOp>) {
        self.backward_op = Some(op);
    }

    /// Same data, cut from the graph
    pub fn detach(&self) -> Self {
        Self {
            data: Rc::clone(&self.data),
            grad: Rc::new(RefCell::new(None)),
            backward_op: None,
            requires_grad: false,
        }
    }

    /// Same data as a fresh leaf that collects gradients
    pub fn detach_requiring_grad(&self) -> Self {
        Self { requires_grad: true, ..self.detach() }
    }

    /// Copy the values of `other` into this tensor, keeping its gradient cell
    pub fn assign(&mut self, other: ArrayD<f32>) -> Result<()> {
        if other.shape() != self.shape() {
            return Err(Error::shape("tensor assignment", self.shape(), other.shape()));
        }
        self.data = Rc::new(other);
        Ok(())
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape())
            .field("requires_grad", &self.requires_grad)
            .field("has_grad", &self.grad.borrow().is_some())
            .field("has_backward_op", &self.backward_op.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_grad() {
        let a = Tensor::from_vec(vec![1.0, 2.0], true);
        let b = a.clone();
        b.accumulate_grad(ndarray::arr1(&[1.0, 1.0]).into_dyn());
        let grad = a.grad().expect("gradient shared through clone");
        assert_eq!(grad[[0]], 1.0);
    }

    #[test]
    fn test_detach_has_fresh_grad() {
        let a = Tensor::from_vec(vec![1.0, 2.0], true);
        let d = a.detach();
        assert!(!d.requires_grad());
        d.accumulate_grad(ndarray::arr1(&[1.0, 1.0]).into_dyn());
        assert!(a.grad().is_none());
    }

    #[test]
    fn test_data_mut_copies_on_write() {
        let mut a = Tensor::from_vec(vec![1.0, 2.0], true);
        let snapshot = a.clone();
        a.data_mut()[[0]] = 5.0;
        assert_eq!(a.data()[[0]], 5.0);
        assert_eq!(snapshot.data()[[0]], 1.0);
    }

    #[test]
    fn test_from_shape_vec_rejects_bad_len() {
        let result = Tensor::from_shape_vec(&[2, 3], vec![0.0; 5], false);
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_assign_checks_shape() {
        let mut a = Tensor::zeros(&[2, 2], true);
        assert!(a.assign(ArrayD::ones(IxDyn(&[4]))).is_err());
        a.assign(ArrayD::ones(IxDyn(&[2, 2]))).expect("same shape");
        assert_eq!(a.data().sum(), 4.0);
    }
}

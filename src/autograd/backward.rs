//! Backward op trait and graph traversal

use super::Tensor;
use std::collections::HashSet;
use std::rc::Rc;

/// A recorded operation that can push its output gradient into its inputs
///
/// Implementations read the gradient accumulated in their output cell and
/// add the partial derivatives to every input that requires gradients. They
/// do not recurse; [`run_backward`] visits each op exactly once.
pub trait BackwardOp {
    /// Propagate the output gradient to the inputs
    fn backward(&self);

    /// Tensors this op read during the forward pass
    fn inputs(&self) -> Vec<Tensor>;
}

fn op_id(op: &Rc<dyn BackwardOp>) -> usize {
    Rc::as_ptr(op).cast::<()>() as usize
}

/// Ops reachable from `root`, ordered so every op appears after all ops it
/// consumes from
pub(crate) fn topological_order(root: Rc<dyn BackwardOp>) -> Vec<Rc<dyn BackwardOp>> {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut stack: Vec<(Rc<dyn BackwardOp>, bool)> = vec![(root, false)];

    while let Some((op, expanded)) = stack.pop() {
        if expanded {
            order.push(op);
            continue;
        }
        if !visited.insert(op_id(&op)) {
            continue;
        }
        stack.push((Rc::clone(&op), true));
        for input in op.inputs() {
            if let Some(child) = input.backward_op() {
                if !visited.contains(&op_id(&child)) {
                    stack.push((child, false));
                }
            }
        }
    }

    order
}

/// Run every op reachable from `root` once, outputs before inputs
pub(crate) fn run_backward(root: Rc<dyn BackwardOp>) {
    for op in topological_order(root).iter().rev() {
        op.backward();
    }
}

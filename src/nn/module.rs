//! Module trait and train/eval mode

use crate::Tensor;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Whether layers use batch statistics (train) or running statistics (eval)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    Train,
    Eval,
    /// Batch statistics without touching running statistics
    Frozen,
}

/// Join a scope prefix and a local name with `/`
pub fn scoped(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

/// Anything that owns trainable parameters
///
/// Names are hierarchical (`generator/g_h0/dense/kernel`) and the order of
/// the returned vectors is stable, which optimizers and checkpoints rely on.
pub trait Module {
    /// Trainable parameters with their names
    fn named_parameters(&self, prefix: &str) -> Vec<(String, &Tensor)>;

    /// Mutable trainable parameters with their names, same order as
    /// [`Module::named_parameters`]
    fn named_parameters_mut(&mut self, prefix: &str) -> Vec<(String, &mut Tensor)>;

    /// Non-trainable state such as batch-norm running statistics
    fn named_buffers(&self, _prefix: &str) -> Vec<(String, Array1<f32>)> {
        Vec::new()
    }

    /// Mutable non-trainable state, same order as [`Module::named_buffers`]
    fn named_buffers_mut(&mut self, _prefix: &str) -> Vec<(String, &mut Array1<f32>)> {
        Vec::new()
    }

    fn parameters(&self) -> Vec<&Tensor> {
        self.named_parameters("").into_iter().map(|(_, t)| t).collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.named_parameters_mut("").into_iter().map(|(_, t)| t).collect()
    }

    /// Clear every parameter gradient
    fn zero_grad(&self) {
        for param in self.parameters() {
            param.zero_grad();
        }
    }

    /// Total number of trainable scalars
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_names() {
        assert_eq!(scoped("", "dense"), "dense");
        assert_eq!(scoped("generator/g_h0", "dense"), "generator/g_h0/dense");
    }
}

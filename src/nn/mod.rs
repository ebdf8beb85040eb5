//! Parameter-owning layers built on the autograd ops
//!
//! Layers hold their parameters as [`Tensor`]s with `requires_grad = true`.
//! Forward passes clone those tensors into the graph, so gradients land in
//! the layer's own gradient cells and the optimizer can update the values in
//! place afterwards.

mod conv;
mod init;
mod linear;
mod module;
mod norm;

pub use conv::{Conv2d, ConvTranspose2d};
pub use init::{normal, uniform};
pub use linear::Dense;
pub use module::{scoped, Mode, Module};
pub use norm::{BatchNorm, LayerNorm, Norm, NormKind};

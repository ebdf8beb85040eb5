//! Residual block shared by both networks

use crate::autograd::{add, leaky_relu, relu, Padding};
use crate::nn::{scoped, Conv2d, Mode, Module, Norm, NormKind};
use crate::Tensor;
use ndarray::Array1;
use rand::Rng;

/// Nonlinearity applied between layers
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activation {
    Relu,
    LeakyRelu(f32),
}

impl Activation {
    pub fn apply(self, x: &Tensor) -> Tensor {
        match self {
            Activation::Relu => relu(x),
            Activation::LeakyRelu(alpha) => leaky_relu(x, alpha),
        }
    }
}

/// Bottleneck residual block
///
/// 1x1 conv to `bottleneck` channels, 3x3 conv, 3x3 conv back to the input
/// depth, each followed by normalization; the first two are activated. The
/// result is added to the input and activated again.
#[derive(Debug, Clone)]
pub struct ResidualBlock {
    conv1: Conv2d,
    norm1: Norm,
    conv2: Conv2d,
    norm2: Norm,
    conv3: Conv2d,
    norm3: Norm,
    activation: Activation,
}

impl ResidualBlock {
    pub fn new<R: Rng>(
        channels: usize,
        bottleneck: usize,
        norm: NormKind,
        activation: Activation,
        rng: &mut R,
    ) -> Self {
        Self {
            conv1: Conv2d::new(channels, bottleneck, 1, 1, Padding::Valid, rng),
            norm1: Norm::new(norm, bottleneck, rng),
            conv2: Conv2d::new(bottleneck, bottleneck, 3, 1, Padding::Same, rng),
            norm2: Norm::new(norm, bottleneck, rng),
            conv3: Conv2d::new(bottleneck, channels, 3, 1, Padding::Same, rng),
            norm3: Norm::new(norm, channels, rng),
            activation,
        }
    }

    pub fn forward(&self, x: &Tensor, mode: Mode) -> Tensor {
        let act = self.activation;
        let h = act.apply(&self.norm1.forward(&self.conv1.forward(x), mode));
        let h = act.apply(&self.norm2.forward(&self.conv2.forward(&h), mode));
        let h = self.norm3.forward(&self.conv3.forward(&h), mode);
        act.apply(&add(x, &h))
    }

    fn layers(&self) -> [(&'static str, &Conv2d, &Norm); 3] {
        [("", &self.conv1, &self.norm1), ("2", &self.conv2, &self.norm2), ("3", &self.conv3, &self.norm3)]
    }
}

impl Module for ResidualBlock {
    fn named_parameters(&self, prefix: &str) -> Vec<(String, &Tensor)> {
        let mut params = Vec::new();
        for (suffix, conv, norm) in self.layers() {
            params.extend(conv.named_parameters(&scoped(prefix, &format!("conv2d{suffix}"))));
            params.extend(norm.named_parameters(&scoped(prefix, &format!("norm{suffix}"))));
        }
        params
    }

    fn named_parameters_mut(&mut self, prefix: &str) -> Vec<(String, &mut Tensor)> {
        let mut params = self.conv1.named_parameters_mut(&scoped(prefix, "conv2d"));
        params.extend(self.norm1.named_parameters_mut(&scoped(prefix, "norm")));
        params.extend(self.conv2.named_parameters_mut(&scoped(prefix, "conv2d2")));
        params.extend(self.norm2.named_parameters_mut(&scoped(prefix, "norm2")));
        params.extend(self.conv3.named_parameters_mut(&scoped(prefix, "conv2d3")));
        params.extend(self.norm3.named_parameters_mut(&scoped(prefix, "norm3")));
        params
    }

    fn named_buffers(&self, prefix: &str) -> Vec<(String, Array1<f32>)> {
        let mut buffers = Vec::new();
        for (suffix, _, norm) in self.layers() {
            buffers.extend(norm.named_buffers(&scoped(prefix, &format!("norm{suffix}"))));
        }
        buffers
    }

    fn named_buffers_mut(&mut self, prefix: &str) -> Vec<(String, &mut Array1<f32>)> {
        let mut buffers = self.norm1.named_buffers_mut(&scoped(prefix, "norm"));
        buffers.extend(self.norm2.named_buffers_mut(&scoped(prefix, "norm2")));
        buffers.extend(self.norm3.named_buffers_mut(&scoped(prefix, "norm3")));
        buffers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_residual_preserves_shape() {
        let block = ResidualBlock::new(8, 2, NormKind::Batch, Activation::Relu, &mut StdRng::seed_from_u64(0));
        let x = Tensor::ones(&[2, 4, 4, 8], false);
        let y = block.forward(&x, Mode::Train);
        assert_eq!(y.shape(), x.shape());
        assert!(y.data().iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_residual_names_are_stable_and_unique() {
        let mut block =
            ResidualBlock::new(4, 2, NormKind::Batch, Activation::LeakyRelu(0.2), &mut StdRng::seed_from_u64(0));
        let names: Vec<String> = block.named_parameters("g_h1_res").into_iter().map(|(n, _)| n).collect();
        let names_mut: Vec<String> =
            block.named_parameters_mut("g_h1_res").into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, names_mut);
        assert_eq!(names.len(), 12);
        assert_eq!(names[0], "g_h1_res/conv2d/kernel");
        assert_eq!(names[11], "g_h1_res/norm3/beta");
        let unique: std::collections::HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
        assert_eq!(block.named_buffers("g_h1_res").len(), 6);
    }
}

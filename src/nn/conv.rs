//! Convolution layers over NHWC feature maps

use super::{init, scoped, Module};
use crate::autograd::{conv2d, conv_transpose2d, ConvGeometry, Padding};
use crate::Tensor;
use rand::Rng;

fn spatial(x: &Tensor) -> (usize, usize) {
    assert_eq!(x.shape().len(), 4, "convolution input must be [batch, height, width, channels]");
    (x.shape()[1], x.shape()[2])
}

/// Strided 2-d convolution
#[derive(Debug, Clone)]
pub struct Conv2d {
    /// Kernel (kernel_h x kernel_w x in_channels x out_channels)
    pub kernel: Tensor,
    pub bias: Tensor,
    pub stride: usize,
    pub padding: Padding,
}

impl Conv2d {
    pub fn new<R: Rng>(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: Padding,
        rng: &mut R,
    ) -> Self {
        Self {
            kernel: init::normal(&[kernel_size, kernel_size, in_channels, out_channels], 0.0, 0.02, rng),
            bias: Tensor::zeros(&[out_channels], true),
            stride,
            padding,
        }
    }

    pub fn out_channels(&self) -> usize {
        self.kernel.shape()[3]
    }

    pub fn geometry(&self, input_hw: (usize, usize)) -> ConvGeometry {
        let k = (self.kernel.shape()[0], self.kernel.shape()[1]);
        ConvGeometry::conv(input_hw, k, (self.stride, self.stride), self.padding)
    }

    pub fn forward(&self, x: &Tensor) -> Tensor {
        conv2d(x, &self.kernel, &self.bias, self.geometry(spatial(x)))
    }
}

impl Module for Conv2d {
    fn named_parameters(&self, prefix: &str) -> Vec<(String, &Tensor)> {
        vec![(scoped(prefix, "kernel"), &self.kernel), (scoped(prefix, "bias"), &self.bias)]
    }

    fn named_parameters_mut(&mut self, prefix: &str) -> Vec<(String, &mut Tensor)> {
        vec![(scoped(prefix, "kernel"), &mut self.kernel), (scoped(prefix, "bias"), &mut self.bias)]
    }
}

/// Strided 2-d transposed convolution; `same` padding multiplies the spatial
/// size by the stride
#[derive(Debug, Clone)]
pub struct ConvTranspose2d {
    /// Kernel (kernel_h x kernel_w x out_channels x in_channels)
    pub kernel: Tensor,
    pub bias: Tensor,
    pub stride: usize,
    pub padding: Padding,
}

impl ConvTranspose2d {
    pub fn new<R: Rng>(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: Padding,
        rng: &mut R,
    ) -> Self {
        Self {
            kernel: init::normal(&[kernel_size, kernel_size, out_channels, in_channels], 0.0, 0.02, rng),
            bias: Tensor::zeros(&[out_channels], true),
            stride,
            padding,
        }
    }

    pub fn out_channels(&self) -> usize {
        self.kernel.shape()[2]
    }

    pub fn forward(&self, x: &Tensor) -> Tensor {
        let k = (self.kernel.shape()[0], self.kernel.shape()[1]);
        let geometry =
            ConvGeometry::transposed(spatial(x), k, (self.stride, self.stride), self.padding);
        conv_transpose2d(x, &self.kernel, &self.bias, geometry)
    }
}

impl Module for ConvTranspose2d {
    fn named_parameters(&self, prefix: &str) -> Vec<(String, &Tensor)> {
        vec![(scoped(prefix, "kernel"), &self.kernel), (scoped(prefix, "bias"), &self.bias)]
    }

    fn named_parameters_mut(&mut self, prefix: &str) -> Vec<(String, &mut Tensor)> {
        vec![(scoped(prefix, "kernel"), &mut self.kernel), (scoped(prefix, "bias"), &mut self.bias)]
    }
}

//! 2-d convolution and transposed convolution over NHWC tensors
//!
//! Both operations lower to a matrix product through `im2col`/`col2im`.
//! Kernels use the `[kernel_h, kernel_w, in, out]` layout for convolutions
//! and `[kernel_h, kernel_w, out, in]` for transposed convolutions, so a
//! transposed convolution is exactly the input-gradient of the convolution
//! described by the same [`ConvGeometry`].

use super::{reshape_array, to_matrix};
use crate::autograd::{BackwardOp, GradCell, Tensor};
use ndarray::{Array1, Array2, ArrayD, Axis};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Padding scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Padding {
    /// Output covers `ceil(in / stride)` positions; zero padding split with
    /// the extra cell at the bottom/right
    #[default]
    Same,
    /// No padding
    Valid,
}

/// Spatial geometry of a strided convolution from `in_h x in_w` to
/// `out_h x out_w`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvGeometry {
    pub in_h: usize,
    pub in_w: usize,
    pub out_h: usize,
    pub out_w: usize,
    pub kernel_h: usize,
    pub kernel_w: usize,
    pub stride_h: usize,
    pub stride_w: usize,
    pub pad_top: usize,
    pub pad_left: usize,
}

fn output_extent(input: usize, kernel: usize, stride: usize, padding: Padding) -> (usize, usize) {
    match padding {
        Padding::Same => {
            let out = input.div_ceil(stride);
            let total = ((out - 1) * stride + kernel).saturating_sub(input);
            (out, total / 2)
        }
        Padding::Valid => {
            assert!(input >= kernel, "valid convolution: kernel {kernel} exceeds input {input}");
            ((input - kernel) / stride + 1, 0)
        }
    }
}

impl ConvGeometry {
    /// Geometry of a convolution applied to an `input_hw` feature map
    pub fn conv(
        input_hw: (usize, usize),
        kernel: (usize, usize),
        stride: (usize, usize),
        padding: Padding,
    ) -> Self {
        let (out_h, pad_top) = output_extent(input_hw.0, kernel.0, stride.0, padding);
        let (out_w, pad_left) = output_extent(input_hw.1, kernel.1, stride.1, padding);
        Self {
            in_h: input_hw.0,
            in_w: input_hw.1,
            out_h,
            out_w,
            kernel_h: kernel.0,
            kernel_w: kernel.1,
            stride_h: stride.0,
            stride_w: stride.1,
            pad_top,
            pad_left,
        }
    }

    /// Geometry for a transposed convolution reading an `input_hw` map
    ///
    /// The returned geometry describes the forward convolution that maps the
    /// upsampled output (`in_h x in_w`) back onto `input_hw` (`out_h x out_w`).
    pub fn transposed(
        input_hw: (usize, usize),
        kernel: (usize, usize),
        stride: (usize, usize),
        padding: Padding,
    ) -> Self {
        let upsampled = |input: usize, kernel: usize, stride: usize| match padding {
            Padding::Same => input * stride,
            Padding::Valid => (input - 1) * stride + kernel,
        };
        let big = (upsampled(input_hw.0, kernel.0, stride.0), upsampled(input_hw.1, kernel.1, stride.1));
        Self::conv(big, kernel, stride, padding)
    }

    fn patch_len(&self, channels: usize) -> usize {
        self.kernel_h * self.kernel_w * channels
    }

    fn out_positions(&self, batch: usize) -> usize {
        batch * self.out_h * self.out_w
    }

    fn in_positions(&self, batch: usize) -> usize {
        batch * self.in_h * self.in_w
    }

    /// Source index of kernel tap `(ky, kx)` at output position `(oy, ox)`, if inside the input
    #[inline]
    fn source(&self, oy: usize, ox: usize, ky: usize, kx: usize) -> Option<(usize, usize)> {
        let iy = (oy * self.stride_h + ky).checked_sub(self.pad_top)?;
        let ix = (ox * self.stride_w + kx).checked_sub(self.pad_left)?;
        (iy < self.in_h && ix < self.in_w).then_some((iy, ix))
    }
}

/// Gather kernel patches: `[batch*out_h*out_w, kernel_h*kernel_w*channels]`
fn im2col(input: &[f32], batch: usize, channels: usize, g: &ConvGeometry) -> Array2<f32> {
    let patch = g.patch_len(channels);
    let mut columns = Array2::zeros((g.out_positions(batch), patch));
    {
        let out = columns.as_slice_mut().expect("freshly allocated array is contiguous");
        for b in 0..batch {
            for oy in 0..g.out_h {
                for ox in 0..g.out_w {
                    let row = (b * g.out_h + oy) * g.out_w + ox;
                    let dst = &mut out[row * patch..(row + 1) * patch];
                    for ky in 0..g.kernel_h {
                        for kx in 0..g.kernel_w {
                            if let Some((iy, ix)) = g.source(oy, ox, ky, kx) {
                                let src = ((b * g.in_h + iy) * g.in_w + ix) * channels;
                                let off = (ky * g.kernel_w + kx) * channels;
                                dst[off..off + channels]
                                    .copy_from_slice(&input[src..src + channels]);
                            }
                        }
                    }
                }
            }
        }
    }
    columns
}

/// Scatter-add patches back onto a `[batch, in_h, in_w, channels]` buffer
fn col2im(columns: &Array2<f32>, batch: usize, channels: usize, g: &ConvGeometry) -> Vec<f32> {
    let patch = g.patch_len(channels);
    let mut output = vec![0.0; g.in_positions(batch) * channels];
    let cols = columns.as_standard_layout();
    let data = cols.as_slice().expect("standard layout is contiguous");
    for b in 0..batch {
        for oy in 0..g.out_h {
            for ox in 0..g.out_w {
                let row = (b * g.out_h + oy) * g.out_w + ox;
                let src_row = &data[row * patch..(row + 1) * patch];
                for ky in 0..g.kernel_h {
                    for kx in 0..g.kernel_w {
                        if let Some((iy, ix)) = g.source(oy, ox, ky, kx) {
                            let dst = ((b * g.in_h + iy) * g.in_w + ix) * channels;
                            let off = (ky * g.kernel_w + kx) * channels;
                            for c in 0..channels {
                                output[dst + c] += src_row[off + c];
                            }
                        }
                    }
                }
            }
        }
    }
    output
}

fn contiguous(a: &ArrayD<f32>) -> Vec<f32> {
    a.iter().copied().collect()
}

fn bias_row(b: &Tensor, channels: usize) -> Array1<f32> {
    assert_eq!(b.shape(), &[channels], "conv: bias must match output channels");
    Array1::from_iter(b.data().iter().copied())
}

/// 2-d convolution
///
/// `x` is `[batch, in_h, in_w, c_in]`, `w` is `[kernel_h, kernel_w, c_in, c_out]`
/// and `b` is `[c_out]`. Returns `[batch, out_h, out_w, c_out]`.
pub fn conv2d(x: &Tensor, w: &Tensor, b: &Tensor, geometry: ConvGeometry) -> Tensor {
    let g = geometry;
    let shape = x.shape();
    assert_eq!(shape.len(), 4, "conv2d: input must be NHWC");
    assert_eq!((shape[1], shape[2]), (g.in_h, g.in_w), "conv2d: input does not match geometry");
    let (batch, c_in) = (shape[0], shape[3]);
    assert_eq!(
        &w.shape()[..3],
        &[g.kernel_h, g.kernel_w, c_in],
        "conv2d: kernel does not match geometry"
    );
    let c_out = w.shape()[3];

    let columns = im2col(&contiguous(x.data()), batch, c_in, &g);
    let w_mat = to_matrix(w.data(), g.patch_len(c_in), c_out);
    let out = columns.dot(&w_mat) + &bias_row(b, c_out);
    let data = reshape_array(out, &[batch, g.out_h, g.out_w, c_out]);

    let requires_grad = x.requires_grad() || w.requires_grad() || b.requires_grad();
    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(Conv2dBackward {
            x: x.clone(),
            w: w.clone(),
            b: b.clone(),
            columns,
            w_mat,
            geometry: g,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct Conv2dBackward {
    x: Tensor,
    w: Tensor,
    b: Tensor,
    columns: Array2<f32>,
    w_mat: Array2<f32>,
    geometry: ConvGeometry,
    result_grad: GradCell,
}

impl BackwardOp for Conv2dBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let g = &self.geometry;
            let batch = self.x.shape()[0];
            let c_in = self.x.shape()[3];
            let c_out = self.w_mat.ncols();
            let grad_mat = to_matrix(grad, g.out_positions(batch), c_out);

            if self.x.requires_grad() {
                let grad_cols = grad_mat.dot(&self.w_mat.t());
                let grad_x = col2im(&grad_cols, batch, c_in, g);
                let grad_x = ArrayD::from_shape_vec(self.x.data().raw_dim(), grad_x)
                    .expect("col2im produces one value per input element");
                self.x.accumulate_grad(grad_x);
            }
            if self.w.requires_grad() {
                let grad_w = self.columns.t().dot(&grad_mat);
                self.w.accumulate_grad(reshape_array(grad_w, self.w.shape()));
            }
            if self.b.requires_grad() {
                self.b.accumulate_grad(grad_mat.sum_axis(Axis(0)).into_dyn());
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.x.clone(), self.w.clone(), self.b.clone()]
    }
}

/// 2-d transposed convolution (fractionally strided convolution)
///
/// `x` is `[batch, geometry.out_h, geometry.out_w, c_in]`, `w` is
/// `[kernel_h, kernel_w, c_out, c_in]`, `b` is `[c_out]`. Returns
/// `[batch, geometry.in_h, geometry.in_w, c_out]`; build the geometry with
/// [`ConvGeometry::transposed`].
pub fn conv_transpose2d(x: &Tensor, w: &Tensor, b: &Tensor, geometry: ConvGeometry) -> Tensor {
    let g = geometry;
    let shape = x.shape();
    assert_eq!(shape.len(), 4, "conv_transpose2d: input must be NHWC");
    assert_eq!(
        (shape[1], shape[2]),
        (g.out_h, g.out_w),
        "conv_transpose2d: input does not match geometry"
    );
    let (batch, c_in) = (shape[0], shape[3]);
    assert_eq!(w.shape().len(), 4, "conv_transpose2d: kernel must be rank 4");
    assert_eq!(
        (w.shape()[0], w.shape()[1], w.shape()[3]),
        (g.kernel_h, g.kernel_w, c_in),
        "conv_transpose2d: kernel does not match geometry"
    );
    let c_out = w.shape()[2];

    let x_mat = to_matrix(x.data(), g.out_positions(batch), c_in);
    let w_mat = to_matrix(w.data(), g.patch_len(c_out), c_in);
    let columns = x_mat.dot(&w_mat.t());
    let scattered = col2im(&columns, batch, c_out, &g);
    let out = Array2::from_shape_vec((g.in_positions(batch), c_out), scattered)
        .expect("col2im produces one value per output element")
        + &bias_row(b, c_out);
    let data = reshape_array(out, &[batch, g.in_h, g.in_w, c_out]);

    let requires_grad = x.requires_grad() || w.requires_grad() || b.requires_grad();
    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(ConvTranspose2dBackward {
            x: x.clone(),
            w: w.clone(),
            b: b.clone(),
            x_mat,
            w_mat,
            geometry: g,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct ConvTranspose2dBackward {
    x: Tensor,
    w: Tensor,
    b: Tensor,
    x_mat: Array2<f32>,
    w_mat: Array2<f32>,
    geometry: ConvGeometry,
    result_grad: GradCell,
}

impl BackwardOp for ConvTranspose2dBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let g = &self.geometry;
            let batch = self.x.shape()[0];
            let c_out = self.w.shape()[2];
            let grad_columns = im2col(&contiguous(grad), batch, c_out, g);

            if self.x.requires_grad() {
                let grad_x = grad_columns.dot(&self.w_mat);
                self.x.accumulate_grad(reshape_array(grad_x, self.x.shape()));
            }
            if self.w.requires_grad() {
                let grad_w = grad_columns.t().dot(&self.x_mat);
                self.w.accumulate_grad(reshape_array(grad_w, self.w.shape()));
            }
            if self.b.requires_grad() {
                let grad_mat = to_matrix(grad, g.in_positions(batch), c_out);
                self.b.accumulate_grad(grad_mat.sum_axis(Axis(0)).into_dyn());
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.x.clone(), self.w.clone(), self.b.clone()]
    }
}

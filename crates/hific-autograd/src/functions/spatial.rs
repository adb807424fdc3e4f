//! Spatial Gradient Functions
//!
//! Direct 2D convolution and nearest-neighbour upsampling over (N, C, H, W)
//! tensors.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use ndarray::{Array1, Array4, ArrayD, ArrayView1, ArrayView4, Axis, Ix4};

use crate::grad_fn::{GradFn, GradientFunction};

/// Output extent of a convolution along one axis.
#[must_use]
pub fn conv_output_size(input: usize, kernel: usize, stride: usize, padding: usize) -> usize {
    (input + 2 * padding).saturating_sub(kernel) / stride + 1
}

/// Maps an output coordinate and kernel tap to an input coordinate, if it
/// falls inside the unpadded input.
#[inline]
fn source_index(out: usize, tap: usize, stride: usize, padding: usize, extent: usize) -> Option<usize> {
    (out * stride + tap)
        .checked_sub(padding)
        .filter(|&i| i < extent)
}

/// Cross-correlation of `input` (N, C_in, H, W) with `weight` (C_out, C_in, kH, kW).
pub(crate) fn conv2d_forward(
    input: ArrayView4<'_, f32>,
    weight: ArrayView4<'_, f32>,
    bias: Option<ArrayView1<'_, f32>>,
    stride: usize,
    padding: usize,
) -> Array4<f32> {
    let (batch, in_channels, height, width) = input.dim();
    let (out_channels, _, kh, kw) = weight.dim();
    let out_h = conv_output_size(height, kh, stride, padding);
    let out_w = conv_output_size(width, kw, stride, padding);

    let mut output = Array4::<f32>::zeros((batch, out_channels, out_h, out_w));
    for n in 0..batch {
        for co in 0..out_channels {
            let offset = bias.map_or(0.0, |b| b[co]);
            for oh in 0..out_h {
                for ow in 0..out_w {
                    let mut acc = offset;
                    for ci in 0..in_channels {
                        for ki in 0..kh {
                            let Some(ih) = source_index(oh, ki, stride, padding, height) else {
                                continue;
                            };
                            for kj in 0..kw {
                                if let Some(iw) = source_index(ow, kj, stride, padding, width) {
                                    acc += input[[n, ci, ih, iw]] * weight[[co, ci, ki, kj]];
                                }
                            }
                        }
                    }
                    output[[n, co, oh, ow]] = acc;
                }
            }
        }
    }
    output
}

/// Repeats every pixel `factor` times along both spatial axes.
pub(crate) fn upsample_nearest_forward(input: ArrayView4<'_, f32>, factor: usize) -> Array4<f32> {
    let (batch, channels, height, width) = input.dim();
    Array4::from_shape_fn(
        (batch, channels, height * factor, width * factor),
        |(n, c, h, w)| input[[n, c, h / factor, w / factor]],
    )
}

// =============================================================================
// Conv2d Backward
// =============================================================================

/// Gradient function for 2D convolution.
///
/// Next functions are ordered `[input, weight, bias]`.
#[derive(Debug)]
pub struct Conv2dBackward {
    next_fns: Vec<Option<GradFn>>,
    saved_input: Array4<f32>,
    saved_weight: Array4<f32>,
    has_bias: bool,
    stride: usize,
    padding: usize,
}

impl Conv2dBackward {
    /// Creates a new `Conv2dBackward`.
    #[must_use]
    pub fn new(
        grad_fns: [Option<GradFn>; 3],
        input: Array4<f32>,
        weight: Array4<f32>,
        has_bias: bool,
        stride: usize,
        padding: usize,
    ) -> Self {
        Self {
            next_fns: grad_fns.into(),
            saved_input: input,
            saved_weight: weight,
            has_bias,
            stride,
            padding,
        }
    }
}

impl GradientFunction for Conv2dBackward {
    fn apply(&self, grad_output: &ArrayD<f32>) -> Vec<Option<ArrayD<f32>>> {
        let grad = grad_output
            .view()
            .into_dimensionality::<Ix4>()
            .expect("conv2d output is rank 4");
        let (batch, in_channels, height, width) = self.saved_input.dim();
        let (out_channels, _, kh, kw) = self.saved_weight.dim();
        let (_, _, out_h, out_w) = grad.dim();

        let mut grad_input = Array4::<f32>::zeros(self.saved_input.raw_dim());
        let mut grad_weight = Array4::<f32>::zeros(self.saved_weight.raw_dim());

        for n in 0..batch {
            for co in 0..out_channels {
                for oh in 0..out_h {
                    for ow in 0..out_w {
                        let g = grad[[n, co, oh, ow]];
                        if g == 0.0 {
                            continue;
                        }
                        for ci in 0..in_channels {
                            for ki in 0..kh {
                                let Some(ih) = source_index(oh, ki, self.stride, self.padding, height)
                                else {
                                    continue;
                                };
                                for kj in 0..kw {
                                    if let Some(iw) =
                                        source_index(ow, kj, self.stride, self.padding, width)
                                    {
                                        grad_input[[n, ci, ih, iw]] +=
                                            g * self.saved_weight[[co, ci, ki, kj]];
                                        grad_weight[[co, ci, ki, kj]] +=
                                            g * self.saved_input[[n, ci, ih, iw]];
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        let grad_bias: Option<Array1<f32>> = self.has_bias.then(|| {
            grad.sum_axis(Axis(3)).sum_axis(Axis(2)).sum_axis(Axis(0))
        });

        vec![
            Some(grad_input.into_dyn()),
            Some(grad_weight.into_dyn()),
            grad_bias.map(|b| b.into_dyn()),
        ]
    }

    fn name(&self) -> &'static str {
        "Conv2dBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }
}

// =============================================================================
// Upsample Backward
// =============================================================================

/// Gradient function for nearest-neighbour upsampling.
///
/// Each input pixel collects the gradient of its `factor x factor` block.
#[derive(Debug)]
pub struct UpsampleNearestBackward {
    next_fns: Vec<Option<GradFn>>,
    input_dim: (usize, usize, usize, usize),
    factor: usize,
}

impl UpsampleNearestBackward {
    /// Creates a new `UpsampleNearestBackward`.
    #[must_use]
    pub fn new(grad_fn: Option<GradFn>, input_dim: (usize, usize, usize, usize), factor: usize) -> Self {
        Self {
            next_fns: vec![grad_fn],
            input_dim,
            factor,
        }
    }
}

impl GradientFunction for UpsampleNearestBackward {
    fn apply(&self, grad_output: &ArrayD<f32>) -> Vec<Option<ArrayD<f32>>> {
        let grad = grad_output
            .view()
            .into_dimensionality::<Ix4>()
            .expect("upsample output is rank 4");
        let mut grad_input = Array4::<f32>::zeros(self.input_dim);
        for ((n, c, h, w), &g) in grad.indexed_iter() {
            grad_input[[n, c, h / self.factor, w / self.factor]] += g;
        }
        vec![Some(grad_input.into_dyn())]
    }

    fn name(&self) -> &'static str {
        "UpsampleNearestBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conv_output_size() {
        assert_eq!(conv_output_size(16, 3, 1, 1), 16);
        assert_eq!(conv_output_size(16, 5, 2, 2), 8);
        assert_eq!(conv_output_size(8, 5, 2, 2), 4);
    }

    #[test]
    fn test_conv2d_identity_kernel() {
        let input = Array4::from_shape_fn((1, 1, 3, 3), |(_, _, h, w)| (h * 3 + w) as f32);
        let mut weight = Array4::<f32>::zeros((1, 1, 3, 3));
        weight[[0, 0, 1, 1]] = 1.0;
        let out = conv2d_forward(input.view(), weight.view(), None, 1, 1);
        assert_eq!(out, input);
    }

    #[test]
    fn test_conv2d_bias_and_padding() {
        let input = Array4::<f32>::ones((1, 1, 2, 2));
        let weight = Array4::<f32>::ones((1, 1, 3, 3));
        let bias = Array1::from_vec(vec![0.5f32]);
        let out = conv2d_forward(input.view(), weight.view(), Some(bias.view()), 1, 1);
        // every output sees all four ones through the zero-padded 3x3 window
        assert!(out.iter().all(|&v| (v - 4.5).abs() < 1e-6));
    }

    #[test]
    fn test_upsample_roundtrip_gradient() {
        let input = Array4::from_shape_fn((1, 1, 2, 2), |(_, _, h, w)| (h * 2 + w) as f32);
        let out = upsample_nearest_forward(input.view(), 2);
        assert_eq!(out.dim(), (1, 1, 4, 4));
        assert_eq!(out[[0, 0, 3, 3]], 3.0);

        let backward = UpsampleNearestBackward::new(None, (1, 1, 2, 2), 2);
        let grads = backward.apply(&Array4::<f32>::ones((1, 1, 4, 4)).into_dyn());
        assert!(grads[0].as_ref().unwrap().iter().all(|&g| (g - 4.0).abs() < 1e-6));
    }
}

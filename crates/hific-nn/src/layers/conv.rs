//! Convolutional Layers - 2D Convolution
//!
//! Applies a 2D convolution over (N, C, H, W) inputs.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::collections::HashMap;

use hific_autograd::{Result, Variable};
use rand::Rng;

use crate::init::{kaiming_uniform, zeros};
use crate::module::Module;
use crate::parameter::Parameter;

// =============================================================================
// Conv2d
// =============================================================================

/// Applies a 2D convolution over an input image.
///
/// # Shape
/// - Input: (N, C_in, H, W)
/// - Output: (N, C_out, H_out, W_out)
///
/// where H_out = (H + 2*padding - kernel_size) / stride + 1
pub struct Conv2d {
    /// Weight tensor of shape (out_channels, in_channels, kernel_h, kernel_w).
    pub weight: Parameter,
    /// Bias tensor of shape (out_channels).
    pub bias: Option<Parameter>,
    /// Number of input channels.
    in_channels: usize,
    /// Number of output channels.
    out_channels: usize,
    /// Size of the (square) convolving kernel.
    kernel_size: usize,
    /// Stride of the convolution.
    stride: usize,
    /// Zero-padding added to every side.
    padding: usize,
}

impl Conv2d {
    /// Creates a Conv2d with unit stride and "same" padding.
    pub fn new<R>(in_channels: usize, out_channels: usize, kernel_size: usize, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        Self::with_options(in_channels, out_channels, kernel_size, 1, kernel_size / 2, true, rng)
    }

    /// Creates a Conv2d layer with all options.
    pub fn with_options<R>(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        bias: bool,
        rng: &mut R,
    ) -> Self
    where
        R: Rng + ?Sized,
    {
        let weight_data = kaiming_uniform(&[out_channels, in_channels, kernel_size, kernel_size], rng);
        let weight = Parameter::named("weight", weight_data, true);

        let bias_param = bias.then(|| Parameter::named("bias", zeros(&[out_channels]), true));

        Self {
            weight,
            bias: bias_param,
            in_channels,
            out_channels,
            kernel_size,
            stride,
            padding,
        }
    }

    /// Returns the number of input channels.
    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    /// Returns the number of output channels.
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Returns the kernel size.
    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    /// Returns the stride.
    pub fn stride(&self) -> usize {
        self.stride
    }
}

impl Module for Conv2d {
    fn forward(&self, input: &Variable) -> Result<Variable> {
        let bias = self.bias.as_ref().map(Parameter::variable);
        input.conv2d(&self.weight.variable(), bias.as_ref(), self.stride, self.padding)
    }

    fn parameters(&self) -> Vec<Parameter> {
        let mut params = vec![self.weight.clone()];
        if let Some(ref bias) = self.bias {
            params.push(bias.clone());
        }
        params
    }

    fn named_parameters(&self) -> HashMap<String, Parameter> {
        let mut params = HashMap::new();
        params.insert("weight".to_string(), self.weight.clone());
        if let Some(ref bias) = self.bias {
            params.insert("bias".to_string(), bias.clone());
        }
        params
    }

    fn name(&self) -> &'static str {
        "Conv2d"
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_conv2d_creation() {
        let conv = Conv2d::new(3, 8, 3, &mut StdRng::seed_from_u64(0));
        assert_eq!(conv.weight.shape(), vec![8, 3, 3, 3]);
        assert_eq!(conv.bias.as_ref().unwrap().shape(), vec![8]);
        assert_eq!(conv.num_parameters(), 8 * 27 + 8);
    }

    #[test]
    fn test_conv2d_same_padding() {
        let conv = Conv2d::new(2, 4, 5, &mut StdRng::seed_from_u64(1));
        let input = Variable::from_array(ArrayD::ones(IxDyn(&[1, 2, 6, 6])));
        assert_eq!(conv.forward(&input).unwrap().shape(), vec![1, 4, 6, 6]);
    }

    #[test]
    fn test_conv2d_strided() {
        let conv = Conv2d::with_options(2, 4, 5, 2, 2, true, &mut StdRng::seed_from_u64(1));
        let input = Variable::from_array(ArrayD::ones(IxDyn(&[2, 2, 8, 8])));
        assert_eq!(conv.forward(&input).unwrap().shape(), vec![2, 4, 4, 4]);
    }

    #[test]
    fn test_conv2d_gradients_reach_parameters() {
        let conv = Conv2d::new(1, 2, 3, &mut StdRng::seed_from_u64(5));
        let input = Variable::from_array(ArrayD::ones(IxDyn(&[1, 1, 4, 4])));
        conv.forward(&input).unwrap().sum().backward().unwrap();

        let bias_grad = conv.bias.as_ref().unwrap().grad().unwrap();
        // each bias receives one unit of gradient per output pixel
        assert!(bias_grad.iter().all(|&g| (g - 16.0).abs() < 1e-5));
        assert!(conv.weight.grad().is_some());
        assert_eq!(conv.named_parameters().len(), 2);
    }

    #[test]
    fn test_conv2d_channel_mismatch() {
        let conv = Conv2d::new(3, 2, 3, &mut StdRng::seed_from_u64(5));
        let input = Variable::from_array(ArrayD::ones(IxDyn(&[1, 2, 4, 4])));
        assert!(conv.forward(&input).is_err());
    }
}

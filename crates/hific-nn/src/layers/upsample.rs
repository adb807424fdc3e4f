//! Upsampling Layer - Nearest-neighbour Resampling
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use hific_autograd::{Result, Variable};

use crate::module::Module;

/// Repeats every pixel of an (N, C, H, W) input `scale_factor` times
/// along both spatial axes.
#[derive(Debug, Clone, Copy)]
pub struct Upsample {
    scale_factor: usize,
}

impl Upsample {
    /// Creates a nearest-neighbour upsampler.
    pub fn new(scale_factor: usize) -> Self {
        Self { scale_factor }
    }

    /// Returns the integer scale factor.
    pub fn scale_factor(&self) -> usize {
        self.scale_factor
    }
}

impl Module for Upsample {
    fn forward(&self, input: &Variable) -> Result<Variable> {
        input.upsample_nearest(self.scale_factor)
    }

    fn name(&self) -> &'static str {
        "Upsample"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    #[test]
    fn test_upsample_shape_and_gradient() {
        let input = Variable::new(ArrayD::ones(IxDyn(&[1, 2, 3, 3])), true);
        let out = Upsample::new(2).forward(&input).unwrap();
        assert_eq!(out.shape(), vec![1, 2, 6, 6]);

        out.sum().backward().unwrap();
        assert!(input.grad().unwrap().iter().all(|&g| (g - 4.0).abs() < 1e-6));
    }

    #[test]
    fn test_upsample_rejects_non_image() {
        let input = Variable::from_array(ArrayD::ones(IxDyn(&[4, 4])));
        assert!(Upsample::new(2).forward(&input).is_err());
    }
}

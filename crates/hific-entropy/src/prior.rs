//! Prior Density - Conditional Gaussian Latent Model
//!
//! Likelihood of each latent under a Gaussian with predicted mean and
//! scale, convolved with U(-0.5, 0.5):
//!
//! `P(x) = Phi((0.5 - |x - mu|) / sigma) - Phi(-(0.5 + |x - mu|) / sigma)`
//!
//! Folding `x - mu` onto its absolute value keeps both CDF arguments on
//! the side of the distribution where `erfc` is accurate.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::f32::consts::FRAC_1_SQRT_2;

use hific_autograd::Variable;
use tracing::trace;

use crate::config::{HyperpriorConfig, MAX_LIKELIHOOD, MIN_LIKELIHOOD, MIN_SCALE};
use crate::error::{EntropyError, EntropyResult};

/// Standard normal CDF, `0.5 * erfc(-v / sqrt(2))`.
pub fn standardized_cdf(value: &Variable) -> Variable {
    value.mul_scalar(-FRAC_1_SQRT_2).erfc().mul_scalar(0.5)
}

// =============================================================================
// PriorDensity
// =============================================================================

/// Conditional density over the primary latents.
///
/// Stateless apart from its clamps; gradients flow to `x`, `mean` and
/// `scale` alike.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorDensity {
    n_channels: usize,
    min_likelihood: f32,
    max_likelihood: f32,
    scale_lower_bound: f32,
}

impl PriorDensity {
    /// Creates a density over `n_channels` channels with default bounds.
    pub fn new(n_channels: usize) -> Self {
        Self {
            n_channels,
            min_likelihood: MIN_LIKELIHOOD,
            max_likelihood: MAX_LIKELIHOOD,
            scale_lower_bound: MIN_SCALE,
        }
    }

    /// Creates a density over the configured bottleneck channels.
    pub fn from_config(config: &HyperpriorConfig) -> Self {
        Self {
            n_channels: config.bottleneck_capacity,
            min_likelihood: config.min_likelihood,
            max_likelihood: config.max_likelihood,
            scale_lower_bound: config.scale_lower_bound,
        }
    }

    /// Number of latent channels.
    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    /// Lower bound applied to `scale`.
    pub fn scale_lower_bound(&self) -> f32 {
        self.scale_lower_bound
    }

    /// Likelihood of `x` given per-element `mean` and `scale`.
    ///
    /// `mean` and `scale` broadcast against `x`. A 4-D `x` must carry the
    /// configured channel count on axis 1.
    pub fn likelihood(&self, x: &Variable, mean: &Variable, scale: &Variable) -> EntropyResult<Variable> {
        let shape = x.shape();
        if shape.len() == 4 && shape[1] != self.n_channels {
            return Err(EntropyError::ChannelMismatch {
                expected: self.n_channels,
                actual: shape[1],
            });
        }

        let scale = scale.clamp_min(self.scale_lower_bound);
        let distance = x.sub(mean)?.abs();

        let cdf_upper = standardized_cdf(&distance.neg_var().add_scalar(0.5).div(&scale)?);
        let cdf_lower = standardized_cdf(&distance.add_scalar(0.5).neg_var().div(&scale)?);
        let likelihood = cdf_upper.sub(&cdf_lower)?;
        trace!(shape = ?likelihood.shape(), "latent likelihood");

        Ok(likelihood.clamp(self.min_likelihood, self.max_likelihood))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    #[test]
    fn test_standardized_cdf() {
        let v = Variable::from_vec(vec![0.0, 1.0, -1.0], &[3], false).unwrap();
        let cdf = standardized_cdf(&v).to_vec();
        assert!((cdf[0] - 0.5).abs() < 1e-6);
        assert!((cdf[1] - 0.841_344_7).abs() < 1e-5);
        assert!((cdf[2] - 0.158_655_3).abs() < 1e-5);
    }

    #[test]
    fn test_unit_bin_mass_at_mean() {
        let density = PriorDensity::new(1);
        let x = Variable::zeros(&[2, 1, 3, 3]);
        let mean = Variable::zeros(&[2, 1, 3, 3]);
        let scale = Variable::full(&[2, 1, 3, 3], 1.0);
        let lik = density.likelihood(&x, &mean, &scale).unwrap();
        assert!(lik.to_vec().iter().all(|&p| (p - 0.382_924_9).abs() < 1e-5));
    }

    #[test]
    fn test_symmetric_in_offset() {
        let density = PriorDensity::new(1);
        let mean = Variable::zeros(&[2]);
        let scale = Variable::full(&[2], 0.7);
        let x = Variable::from_vec(vec![1.3, -1.3], &[2], false).unwrap();
        let lik = density.likelihood(&x, &mean, &scale).unwrap().to_vec();
        assert!((lik[0] - lik[1]).abs() < 1e-7);
    }

    #[test]
    fn test_scale_is_floored() {
        let density = PriorDensity::new(1);
        let x = Variable::full(&[1, 1, 1, 1], 3.0);
        let mean = Variable::full(&[1, 1, 1, 1], 3.0);
        let tiny = density
            .likelihood(&x, &mean, &Variable::full(&[1, 1, 1, 1], 1e-6))
            .unwrap();
        let floor = density
            .likelihood(&x, &mean, &Variable::full(&[1, 1, 1, 1], MIN_SCALE))
            .unwrap();
        assert_eq!(tiny.to_vec(), floor.to_vec());
        assert!(tiny.item().unwrap() > 0.9999);
    }

    #[test]
    fn test_far_tail_is_clamped() {
        let density = PriorDensity::new(1);
        let x = Variable::full(&[1, 1, 1, 1], 50.0);
        let lik = density
            .likelihood(&x, &Variable::zeros(&[1, 1, 1, 1]), &Variable::full(&[1, 1, 1, 1], 0.5))
            .unwrap();
        assert!((lik.item().unwrap() - MIN_LIKELIHOOD).abs() < 1e-12);
    }

    #[test]
    fn test_gradients_reach_mean_and_scale() {
        let density = PriorDensity::new(1);
        let x = Variable::from_array(ArrayD::from_elem(IxDyn(&[1, 1, 2, 2]), 0.4));
        let mean = Variable::new(ArrayD::zeros(IxDyn(&[1, 1, 2, 2])), true);
        let scale = Variable::new(ArrayD::from_elem(IxDyn(&[1, 1, 2, 2]), 1.0), true);

        density.likelihood(&x, &mean, &scale).unwrap().log().sum().backward().unwrap();
        // moving the mean toward x raises the likelihood
        assert!(mean.grad().unwrap().iter().all(|&g| g > 0.0));
        // narrowing the scale around a nearby x raises the likelihood
        assert!(scale.grad().unwrap().iter().all(|&g| g < 0.0));
    }

    #[test]
    fn test_channel_mismatch() {
        let density = PriorDensity::new(4);
        let x = Variable::zeros(&[1, 3, 2, 2]);
        let err = density.likelihood(&x, &x, &x).unwrap_err();
        assert!(matches!(err, EntropyError::ChannelMismatch { expected: 4, actual: 3 }));
    }
}

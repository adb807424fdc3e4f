//! Hyperprior Transforms - Analysis and Synthesis Networks
//!
//! Convolutional networks between the latent and hyperlatent spaces.
//! Analysis downsamples by 4; synthesis upsamples by 4 with
//! nearest-neighbour resizing followed by convolution.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::collections::HashMap;

use hific_autograd::{Result, Variable};
use hific_nn::{Conv2d, Module, Parameter, ReLU, Sequential, Softplus, Upsample};
use rand::Rng;

// =============================================================================
// Analysis
// =============================================================================

/// Maps latents (N, C, H, W) to hyperlatents (N, N_h, H/4, W/4).
///
/// conv3x3/s1 -> ReLU -> conv5x5/s2 -> ReLU -> conv5x5/s2
pub struct HyperpriorAnalysis {
    net: Sequential,
}

impl HyperpriorAnalysis {
    /// Creates the analysis transform for `channels` latent and
    /// `hyperlatent_channels` hyperlatent channels.
    pub fn new<R>(channels: usize, hyperlatent_channels: usize, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        let n = hyperlatent_channels;
        let net = Sequential::new()
            .add_named("conv1", Conv2d::new(channels, n, 3, rng))
            .add_named("relu1", ReLU)
            .add_named("conv2", Conv2d::with_options(n, n, 5, 2, 2, true, rng))
            .add_named("relu2", ReLU)
            .add_named("conv3", Conv2d::with_options(n, n, 5, 2, 2, true, rng));
        Self { net }
    }
}

impl Module for HyperpriorAnalysis {
    fn forward(&self, input: &Variable) -> Result<Variable> {
        self.net.forward(input)
    }

    fn parameters(&self) -> Vec<Parameter> {
        self.net.parameters()
    }

    fn named_parameters(&self) -> HashMap<String, Parameter> {
        self.net.named_parameters()
    }

    fn name(&self) -> &'static str {
        "HyperpriorAnalysis"
    }
}

// =============================================================================
// Synthesis
// =============================================================================

/// Output activation of a synthesis transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FinalActivation {
    /// Unconstrained output (means).
    #[default]
    Identity,
    /// Non-negative output (scales).
    Softplus,
}

/// Maps hyperlatents (N, N_h, H, W) back to (N, C, 4H, 4W).
///
/// up x2 -> conv5x5 -> ReLU -> up x2 -> conv5x5 -> ReLU -> conv3x3
/// [-> softplus]
pub struct HyperpriorSynthesis {
    net: Sequential,
    final_activation: FinalActivation,
}

impl HyperpriorSynthesis {
    /// Creates a synthesis transform producing `channels` latent channels.
    pub fn new<R>(
        channels: usize,
        hyperlatent_channels: usize,
        final_activation: FinalActivation,
        rng: &mut R,
    ) -> Self
    where
        R: Rng + ?Sized,
    {
        let n = hyperlatent_channels;
        let mut net = Sequential::new()
            .add_named("up1", Upsample::new(2))
            .add_named("conv1", Conv2d::new(n, n, 5, rng))
            .add_named("relu1", ReLU)
            .add_named("up2", Upsample::new(2))
            .add_named("conv2", Conv2d::new(n, n, 5, rng))
            .add_named("relu2", ReLU)
            .add_named("conv3", Conv2d::new(n, channels, 3, rng));
        if final_activation == FinalActivation::Softplus {
            net = net.add_named("softplus", Softplus);
        }
        Self { net, final_activation }
    }

    /// Returns the output activation.
    pub fn final_activation(&self) -> FinalActivation {
        self.final_activation
    }
}

impl Module for HyperpriorSynthesis {
    fn forward(&self, input: &Variable) -> Result<Variable> {
        self.net.forward(input)
    }

    fn parameters(&self) -> Vec<Parameter> {
        self.net.parameters()
    }

    fn named_parameters(&self) -> HashMap<String, Parameter> {
        self.net.named_parameters()
    }

    fn name(&self) -> &'static str {
        "HyperpriorSynthesis"
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_analysis_downsamples_by_four() {
        let analysis = HyperpriorAnalysis::new(4, 6, &mut StdRng::seed_from_u64(0));
        let x = Variable::full(&[2, 4, 16, 16], 0.5);
        assert_eq!(analysis.forward(&x).unwrap().shape(), vec![2, 6, 4, 4]);
        assert_eq!(analysis.parameters().len(), 6);
        assert!(analysis.named_parameters().contains_key("conv2.weight"));
    }

    #[test]
    fn test_synthesis_restores_resolution() {
        let synthesis =
            HyperpriorSynthesis::new(4, 6, FinalActivation::Identity, &mut StdRng::seed_from_u64(1));
        let z = Variable::full(&[1, 6, 2, 2], 0.5);
        assert_eq!(synthesis.forward(&z).unwrap().shape(), vec![1, 4, 8, 8]);
    }

    #[test]
    fn test_softplus_synthesis_is_positive() {
        let synthesis =
            HyperpriorSynthesis::new(3, 5, FinalActivation::Softplus, &mut StdRng::seed_from_u64(2));
        let z = Variable::from_array(ndarray::ArrayD::from_shape_fn(ndarray::IxDyn(&[1, 5, 2, 2]), |i| {
            i[1] as f32 - 2.0
        }));
        let scales = synthesis.forward(&z).unwrap();
        assert!(scales.to_vec().iter().all(|&s| s > 0.0));
        assert_eq!(synthesis.final_activation(), FinalActivation::Softplus);
    }
}

//! Hyperprior - Two-level Entropy Model
//!
//! Hyperlatents are derived from the latents, coded under the
//! non-parametric density, and decoded into the mean and scale of the
//! conditional latent density. Each level is estimated twice: once with
//! noise (differentiable training rate) and once with hard rounding
//! (evaluation rate).
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::collections::HashMap;

use hific_autograd::Variable;
use hific_nn::{Module, Parameter};
use rand::Rng;
use tracing::{debug, trace};

use crate::config::HyperpriorConfig;
use crate::error::{image_dims, EntropyError, EntropyResult};
use crate::hyperprior_density::HyperpriorDensity;
use crate::prior::PriorDensity;
use crate::quantize::{estimate_entropy, quantize, quantize_latents, QuantizationMode};
use crate::transforms::{FinalActivation, HyperpriorAnalysis, HyperpriorSynthesis};

// =============================================================================
// Phase
// =============================================================================

/// Which branch feeds the decoded outputs of a forward call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Noisy hyperlatents and straight-through latents.
    Training,
    /// Hard-quantized hyperlatents and latents.
    Inference,
}

impl Phase {
    /// Returns true for [`Phase::Training`].
    pub fn is_training(self) -> bool {
        self == Self::Training
    }
}

// =============================================================================
// HyperInfo
// =============================================================================

/// Result of one forward call.
///
/// Rates are 0-d variables in bits per pixel of their own tensor; the
/// `*_nbpp` values are differentiable.
#[derive(Debug, Clone)]
pub struct HyperInfo {
    /// Latents handed to the decoder, (N, C, H, W).
    pub decoded: Variable,
    /// Noisy-branch latent rate.
    pub latent_nbpp: Variable,
    /// Noisy-branch hyperlatent rate.
    pub hyperlatent_nbpp: Variable,
    /// `latent_nbpp + hyperlatent_nbpp`.
    pub total_nbpp: Variable,
    /// Hard-quantized latent rate.
    pub latent_qbpp: Variable,
    /// Hard-quantized hyperlatent rate.
    pub hyperlatent_qbpp: Variable,
    /// `latent_qbpp + hyperlatent_qbpp`.
    pub total_qbpp: Variable,
    /// Entropy-coded latents; not produced yet.
    pub bitstring: Option<Vec<u8>>,
    /// Entropy-coded hyperlatents; not produced yet.
    pub side_bitstring: Option<Vec<u8>>,
}

// =============================================================================
// Hyperprior
// =============================================================================

/// Hyperprior entropy model over latents of `bottleneck_capacity` channels.
pub struct Hyperprior {
    config: HyperpriorConfig,
    analysis: Box<dyn Module>,
    synthesis_mu: Box<dyn Module>,
    synthesis_std: Box<dyn Module>,
    hyperlatent_likelihood: HyperpriorDensity,
    latent_likelihood: PriorDensity,
}

impl Hyperprior {
    /// Builds the model with the default transforms, seeded from the
    /// thread-local generator.
    pub fn new(config: HyperpriorConfig) -> EntropyResult<Self> {
        Self::with_rng(config, &mut rand::thread_rng())
    }

    /// Builds the model with the default transforms, drawing every initial
    /// parameter from `rng`.
    pub fn with_rng<R>(config: HyperpriorConfig, rng: &mut R) -> EntropyResult<Self>
    where
        R: Rng + ?Sized,
    {
        config.validate()?;
        let c = config.bottleneck_capacity;
        let n = config.hyperlatent_channels();

        let analysis = HyperpriorAnalysis::new(c, n, rng);
        let synthesis_mu = HyperpriorSynthesis::new(c, n, FinalActivation::Identity, rng);
        let synthesis_std = HyperpriorSynthesis::new(c, n, FinalActivation::Softplus, rng);

        Self::with_transforms(
            config,
            Box::new(analysis),
            Box::new(synthesis_mu),
            Box::new(synthesis_std),
            rng,
        )
    }

    /// Builds the model around caller-provided transforms.
    ///
    /// `analysis` must map (N, C, H, W) to (N, N_h, H', W'); both synthesis
    /// transforms must map that back to (N, C, H, W), with `synthesis_std`
    /// producing non-negative scales.
    pub fn with_transforms<R>(
        config: HyperpriorConfig,
        analysis: Box<dyn Module>,
        synthesis_mu: Box<dyn Module>,
        synthesis_std: Box<dyn Module>,
        rng: &mut R,
    ) -> EntropyResult<Self>
    where
        R: Rng + ?Sized,
    {
        config.validate()?;
        let hyperlatent_likelihood = HyperpriorDensity::from_config(&config, rng)?;
        let latent_likelihood = PriorDensity::from_config(&config);

        debug!(
            bottleneck_capacity = config.bottleneck_capacity,
            hyperlatent_channels = config.hyperlatent_channels(),
            analysis = analysis.name(),
            "hyperprior constructed"
        );

        Ok(Self {
            config,
            analysis,
            synthesis_mu,
            synthesis_std,
            hyperlatent_likelihood,
            latent_likelihood,
        })
    }

    /// Returns the configuration the model was built with.
    pub fn config(&self) -> &HyperpriorConfig {
        &self.config
    }

    /// Returns the hyperlatent density.
    pub fn hyperlatent_density(&self) -> &HyperpriorDensity {
        &self.hyperlatent_likelihood
    }

    /// Returns the conditional latent density.
    pub fn latent_density(&self) -> &PriorDensity {
        &self.latent_likelihood
    }

    /// Runs both rate estimates over `latents` and decodes them for `phase`.
    ///
    /// `rng` drives the quantization noise of the two noisy branches.
    pub fn forward<R>(&self, latents: &Variable, phase: Phase, rng: &mut R) -> EntropyResult<HyperInfo>
    where
        R: Rng + ?Sized,
    {
        let (_, channels, _, _) = image_dims(&latents.shape())?;
        if channels != self.config.bottleneck_capacity {
            return Err(EntropyError::ChannelMismatch {
                expected: self.config.bottleneck_capacity,
                actual: channels,
            });
        }

        let hyperlatents = self.analysis.forward(latents)?;
        trace!(shape = ?hyperlatents.shape(), "hyperlatents");

        // Differential entropy, hyperlatents
        let noisy_hyperlatents = quantize(&hyperlatents, QuantizationMode::Noise, rng)?;
        let noisy_hyperlatent_likelihood = self.hyperlatent_likelihood.likelihood(&noisy_hyperlatents)?;
        let noisy_hyperlatent = estimate_entropy(&hyperlatents.shape(), &noisy_hyperlatent_likelihood)?;

        // Discrete entropy, hyperlatents
        let quantized_hyperlatents = quantize(&hyperlatents, QuantizationMode::Quantize, rng)?;
        let quantized_hyperlatent_likelihood =
            self.hyperlatent_likelihood.likelihood(&quantized_hyperlatents)?;
        let quantized_hyperlatent =
            estimate_entropy(&quantized_hyperlatents.shape(), &quantized_hyperlatent_likelihood)?;

        let hyperlatents_decoded = if phase.is_training() {
            noisy_hyperlatents
        } else {
            quantized_hyperlatents
        };

        let latent_scales = self.synthesis_std.forward(&hyperlatents_decoded)?;
        let latent_means = self.synthesis_mu.forward(&hyperlatents_decoded)?;

        // Differential entropy, latents
        let noisy_latents = quantize(latents, QuantizationMode::Noise, rng)?;
        let noisy_latent_likelihood =
            self.latent_likelihood
                .likelihood(&noisy_latents, &latent_means, &latent_scales)?;
        let noisy_latent = estimate_entropy(&latents.shape(), &noisy_latent_likelihood)?;

        // Discrete entropy, latents
        let quantized_latents = quantize(latents, QuantizationMode::Quantize, rng)?;
        let quantized_latent_likelihood =
            self.latent_likelihood
                .likelihood(&quantized_latents, &latent_means, &latent_scales)?;
        let quantized_latent = estimate_entropy(&quantized_latents.shape(), &quantized_latent_likelihood)?;

        let decoded = if phase.is_training() {
            quantize_latents(latents, &latent_means)?
        } else {
            quantized_latents
        };

        let total_nbpp = noisy_latent.bpp.add(&noisy_hyperlatent.bpp)?;
        let total_qbpp = quantized_latent.bpp.add(&quantized_hyperlatent.bpp)?;

        debug!(
            ?phase,
            total_nbpp = total_nbpp.item()?,
            total_qbpp = total_qbpp.item()?,
            "hyperprior rates"
        );

        Ok(HyperInfo {
            decoded,
            latent_nbpp: noisy_latent.bpp,
            hyperlatent_nbpp: noisy_hyperlatent.bpp,
            total_nbpp,
            latent_qbpp: quantized_latent.bpp,
            hyperlatent_qbpp: quantized_hyperlatent.bpp,
            total_qbpp,
            bitstring: None,
            side_bitstring: None,
        })
    }

    /// All learnable parameters: transforms first, then the density.
    pub fn parameters(&self) -> Vec<Parameter> {
        let mut params = self.analysis.parameters();
        params.extend(self.synthesis_mu.parameters());
        params.extend(self.synthesis_std.parameters());
        params.extend(self.hyperlatent_likelihood.parameters());
        params
    }

    /// Parameters keyed by owning component and local name.
    pub fn named_parameters(&self) -> HashMap<String, Parameter> {
        let groups = [
            ("analysis", self.analysis.named_parameters()),
            ("synthesis_mu", self.synthesis_mu.named_parameters()),
            ("synthesis_std", self.synthesis_std.named_parameters()),
            ("hyperlatent_likelihood", self.hyperlatent_likelihood.named_parameters()),
        ];
        groups
            .into_iter()
            .flat_map(|(prefix, params)| {
                params
                    .into_iter()
                    .map(move |(name, p)| (format!("{prefix}.{name}"), p))
            })
            .collect()
    }

    /// Clears the gradients of every parameter.
    pub fn zero_grad(&self) {
        for param in self.parameters() {
            param.zero_grad();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HyperlatentFilters;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_config() -> HyperpriorConfig {
        HyperpriorConfig::new(3).with_hyperlatent_filters(HyperlatentFilters::Custom(4))
    }

    #[test]
    fn test_forward_shapes() {
        let mut rng = StdRng::seed_from_u64(1);
        let model = Hyperprior::with_rng(small_config(), &mut rng).unwrap();
        let latents = Variable::full(&[1, 3, 8, 8], 0.7);
        let info = model.forward(&latents, Phase::Training, &mut rng).unwrap();
        assert_eq!(info.decoded.shape(), vec![1, 3, 8, 8]);
        assert_eq!(info.total_nbpp.numel(), 1);
        assert!(info.bitstring.is_none());
        assert!(info.side_bitstring.is_none());
    }

    #[test]
    fn test_inference_decodes_hard_quantized_latents() {
        let mut rng = StdRng::seed_from_u64(2);
        let model = Hyperprior::with_rng(small_config(), &mut rng).unwrap();
        let latents = Variable::from_array(ndarray::ArrayD::from_shape_fn(
            ndarray::IxDyn(&[1, 3, 4, 4]),
            |i| i[1] as f32 * 0.6 - i[3] as f32 * 0.35,
        ));
        let info = model.forward(&latents, Phase::Inference, &mut rng).unwrap();
        assert_eq!(info.decoded.to_vec(), latents.round().to_vec());
    }

    #[test]
    fn test_rejects_wrong_channel_count() {
        let mut rng = StdRng::seed_from_u64(3);
        let model = Hyperprior::with_rng(small_config(), &mut rng).unwrap();
        let err = model
            .forward(&Variable::zeros(&[1, 5, 8, 8]), Phase::Training, &mut rng)
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, EntropyError::ChannelMismatch { expected: 3, actual: 5 }));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = HyperpriorConfig::new(0);
        assert!(matches!(
            Hyperprior::with_rng(config, &mut StdRng::seed_from_u64(0)),
            Err(EntropyError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_named_parameters_cover_all_components() {
        let model = Hyperprior::with_rng(small_config(), &mut StdRng::seed_from_u64(4)).unwrap();
        let named = model.named_parameters();
        assert_eq!(named.len(), model.parameters().len());
        assert!(named.contains_key("analysis.conv1.weight"));
        assert!(named.contains_key("synthesis_std.conv3.bias"));
        assert!(named.contains_key("hyperlatent_likelihood.H_0"));
        assert!(named.contains_key("hyperlatent_likelihood.b_3"));
    }
}

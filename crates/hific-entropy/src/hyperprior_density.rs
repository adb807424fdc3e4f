//! Hyperprior Density - Non-parametric Factorized Model
//!
//! Every hyperlatent channel gets its own small monotonic network mapping a
//! value to the logit of its cumulative distribution. Layer `k` applies
//!
//! ```text
//! logits = softplus(H_k) @ logits + b_k
//! logits = logits + tanh(a_k) * tanh(logits)
//! ```
//!
//! with all channels evaluated at once by a batched matrix multiply over
//! the channel axis. The likelihood of the unit bin around `x` is the
//! difference of the CDF at `x + 0.5` and `x - 0.5`.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::collections::HashMap;

use hific_autograd::Variable;
use hific_nn::init::{constant, uniform_range, zeros};
use hific_nn::Parameter;
use rand::Rng;
use tracing::{debug, trace};

use crate::config::{DensityConfig, HyperpriorConfig, MAX_LIKELIHOOD, MIN_LIKELIHOOD};
use crate::error::{image_dims, EntropyError, EntropyResult};

// =============================================================================
// Density Layer
// =============================================================================

/// Parameters of one cascade layer, shared by nothing across channels.
#[derive(Debug, Clone)]
struct DensityLayer {
    /// Pre-softplus weights, (C, f_out, f_in).
    weight: Parameter,
    /// Pre-tanh gate of the residual, (C, f_out, 1).
    scale: Parameter,
    /// Bias, (C, f_out, 1).
    bias: Parameter,
}

impl DensityLayer {
    /// Returns `(weight, scale, bias)`, cut from the graph when
    /// `update_parameters` is false.
    fn variables(&self, update_parameters: bool) -> (Variable, Variable, Variable) {
        let (weight, scale, bias) = (self.weight.variable(), self.scale.variable(), self.bias.variable());
        if update_parameters {
            (weight, scale, bias)
        } else {
            (weight.detach(), scale.detach(), bias.detach())
        }
    }
}

// =============================================================================
// HyperpriorDensity
// =============================================================================

/// Learned, unconditional density over the hyperlatents.
#[derive(Debug, Clone)]
pub struct HyperpriorDensity {
    n_channels: usize,
    filters: Vec<usize>,
    init_scale: f32,
    min_likelihood: f32,
    max_likelihood: f32,
    layers: Vec<DensityLayer>,
}

impl HyperpriorDensity {
    /// Creates a density over `n_channels` channels with default clamps.
    pub fn new<R>(n_channels: usize, density: &DensityConfig, rng: &mut R) -> EntropyResult<Self>
    where
        R: Rng + ?Sized,
    {
        Self::with_bounds(n_channels, density, MIN_LIKELIHOOD, MAX_LIKELIHOOD, rng)
    }

    /// Creates a density over the configured hyperlatent channels.
    pub fn from_config<R>(config: &HyperpriorConfig, rng: &mut R) -> EntropyResult<Self>
    where
        R: Rng + ?Sized,
    {
        Self::with_bounds(
            config.hyperlatent_channels(),
            &config.density,
            config.min_likelihood,
            config.max_likelihood,
            rng,
        )
    }

    /// Creates a density with explicit likelihood clamps.
    ///
    /// Weights start at `ln(expm1(1 / s / f_{k+1}))` with
    /// `s = init_scale^(1 / (K + 1))`, so the initial cascade has overall
    /// slope `1 / init_scale`. Gates start at zero and biases at U(-0.5, 0.5).
    ///
    /// Rejects zero channels, empty or zero filter widths, a non-positive
    /// `init_scale`, and bounds outside `0 < min < max`.
    pub fn with_bounds<R>(
        n_channels: usize,
        density: &DensityConfig,
        min_likelihood: f32,
        max_likelihood: f32,
        rng: &mut R,
    ) -> EntropyResult<Self>
    where
        R: Rng + ?Sized,
    {
        if n_channels == 0 {
            return Err(EntropyError::invalid_config("density needs at least one channel"));
        }
        if density.filters.is_empty() || density.filters.contains(&0) {
            return Err(EntropyError::invalid_config(format!(
                "density filters must be non-empty and positive, got {:?}",
                density.filters
            )));
        }
        if !(min_likelihood > 0.0 && min_likelihood < max_likelihood) {
            return Err(EntropyError::invalid_config(format!(
                "likelihood bounds must satisfy 0 < min < max, got [{min_likelihood}, {max_likelihood}]"
            )));
        }
        if !(density.init_scale > 0.0) {
            return Err(EntropyError::invalid_config("density init_scale must be positive"));
        }

        let widths: Vec<usize> = std::iter::once(1)
            .chain(density.filters.iter().copied())
            .chain(std::iter::once(1))
            .collect();
        let n_layers = widths.len() - 1;
        let scale = f64::from(density.init_scale).powf(1.0 / n_layers as f64);

        let layers = widths
            .windows(2)
            .enumerate()
            .map(|(k, pair)| {
                let (f_in, f_out) = (pair[0], pair[1]);
                let weight_init = (1.0 / scale / f_out as f64).exp_m1().ln() as f32;
                DensityLayer {
                    weight: Parameter::named(
                        format!("H_{k}"),
                        constant(&[n_channels, f_out, f_in], weight_init),
                        true,
                    ),
                    scale: Parameter::named(format!("a_{k}"), zeros(&[n_channels, f_out, 1]), true),
                    bias: Parameter::named(
                        format!("b_{k}"),
                        uniform_range(&[n_channels, f_out, 1], -0.5, 0.5, rng),
                        true,
                    ),
                }
            })
            .collect();

        debug!(n_channels, ?widths, init_scale = density.init_scale, "hyperprior density initialized");

        Ok(Self {
            n_channels,
            filters: density.filters.clone(),
            init_scale: density.init_scale,
            min_likelihood,
            max_likelihood,
            layers,
        })
    }

    /// Number of modeled channels.
    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    /// Hidden widths of the cascade.
    pub fn filters(&self) -> &[usize] {
        &self.filters
    }

    /// Initial density width.
    pub fn init_scale(&self) -> f32 {
        self.init_scale
    }

    /// CDF logits at `x`, shaped (C, 1, M): one row of `M` values per channel.
    ///
    /// With `update_parameters == false` the density parameters are
    /// detached, so gradients reach `x` only.
    pub fn cdf_logits(&self, x: &Variable, update_parameters: bool) -> EntropyResult<Variable> {
        let shape = x.shape();
        if shape.len() != 3 || shape[1] != 1 {
            return Err(EntropyError::invalid_shape("(C, 1, M)", &shape));
        }
        if shape[0] != self.n_channels {
            return Err(EntropyError::ChannelMismatch {
                expected: self.n_channels,
                actual: shape[0],
            });
        }

        let mut logits = x.clone();
        for layer in &self.layers {
            let (weight, scale, bias) = layer.variables(update_parameters);
            logits = weight.softplus().bmm(&logits)?;
            logits = logits.add(&bias)?;
            logits = logits.add(&scale.tanh().mul(&logits.tanh())?)?;
        }
        Ok(logits)
    }

    /// Likelihood of the unit bin around every element of an (N, C, H, W)
    /// tensor, clamped to the configured bounds.
    pub fn likelihood(&self, x: &Variable) -> EntropyResult<Variable> {
        self.evaluate(x, true)
    }

    /// As [`likelihood`](Self::likelihood), without gradients to the
    /// density parameters.
    pub fn detached_likelihood(&self, x: &Variable) -> EntropyResult<Variable> {
        self.evaluate(x, false)
    }

    fn evaluate(&self, x: &Variable, update_parameters: bool) -> EntropyResult<Variable> {
        let (n, c, h, w) = image_dims(&x.shape())?;
        if c != self.n_channels {
            return Err(EntropyError::ChannelMismatch {
                expected: self.n_channels,
                actual: c,
            });
        }

        let per_channel = x.permute(&[1, 0, 2, 3])?.reshape(&[c, 1, n * h * w])?;
        let cdf_upper = self.cdf_logits(&per_channel.add_scalar(0.5), update_parameters)?;
        let cdf_lower = self.cdf_logits(&per_channel.add_scalar(-0.5), update_parameters)?;

        // Evaluate both sigmoids on the side where they are far from 1.
        let sign = saturation_sign(&cdf_upper.add(&cdf_lower)?);
        let likelihood = sign
            .mul(&cdf_upper)?
            .sigmoid()
            .sub(&sign.mul(&cdf_lower)?.sigmoid())?
            .abs();

        let likelihood = likelihood.reshape(&[c, n, h, w])?.permute(&[1, 0, 2, 3])?;
        trace!(shape = ?likelihood.shape(), "hyperlatent likelihood");

        Ok(likelihood.clamp(self.min_likelihood, self.max_likelihood))
    }

    /// All learnable parameters, layer by layer.
    pub fn parameters(&self) -> Vec<Parameter> {
        self.layers
            .iter()
            .flat_map(|l| [l.weight.clone(), l.scale.clone(), l.bias.clone()])
            .collect()
    }

    /// Parameters keyed `H_k`, `a_k` and `b_k`.
    pub fn named_parameters(&self) -> HashMap<String, Parameter> {
        self.parameters()
            .into_iter()
            .map(|p| (p.name().to_string(), p))
            .collect()
    }
}

/// `-sign(v)` as a constant, with `+1` where `v` is exactly zero.
fn saturation_sign(sum: &Variable) -> Variable {
    Variable::from_array(sum.data().mapv(|v| if v > 0.0 { -1.0 } else { 1.0 }))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn density(channels: usize) -> HyperpriorDensity {
        HyperpriorDensity::new(channels, &DensityConfig::default(), &mut StdRng::seed_from_u64(17))
            .unwrap()
    }

    /// Overwrites every parameter with draws far from the initial values.
    fn randomize(d: &HyperpriorDensity, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        for p in d.parameters() {
            let (low, high) = match p.name().as_bytes()[0] {
                b'H' => (-3.0, 3.0),
                b'a' => (-5.0, 5.0),
                _ => (-2.0, 2.0),
            };
            p.update_data(uniform_range(&p.shape(), low, high, &mut rng));
        }
    }

    fn sigmoid_f64(v: f32) -> f64 {
        1.0 / (1.0 + (-f64::from(v)).exp())
    }

    #[test]
    fn test_parameter_shapes() {
        let d = density(5);
        let params = d.named_parameters();
        assert_eq!(params.len(), 12);
        assert_eq!(params["H_0"].shape(), vec![5, 3, 1]);
        assert_eq!(params["H_1"].shape(), vec![5, 3, 3]);
        assert_eq!(params["H_3"].shape(), vec![5, 1, 3]);
        assert_eq!(params["a_2"].shape(), vec![5, 3, 1]);
        assert_eq!(params["b_3"].shape(), vec![5, 1, 1]);
    }

    #[test]
    fn test_initialization() {
        let d = density(2);
        let params = d.named_parameters();
        let scale = 10f64.powf(0.25);
        let expected = (1.0 / scale / 3.0).exp_m1().ln() as f32;
        assert!(params["H_0"].data().iter().all(|&v| (v - expected).abs() < 1e-6));
        assert!(params["a_0"].data().iter().all(|&v| v == 0.0));
        for k in 0..4 {
            let bias = params[&format!("b_{k}")].data();
            assert!(bias.iter().all(|&v| (-0.5..0.5).contains(&v)));
        }
    }

    #[test]
    fn test_initial_slope_matches_init_scale() {
        // with zero gates and equal weights the cascade is affine with slope 1 / init_scale
        let d = density(1);
        let x0 = Variable::full(&[1, 1, 1], 0.0);
        let x1 = Variable::full(&[1, 1, 1], 1.0);
        let y0 = d.cdf_logits(&x0, true).unwrap().item().unwrap();
        let y1 = d.cdf_logits(&x1, true).unwrap().item().unwrap();
        assert!(((y1 - y0) - 0.1).abs() < 1e-4);
    }

    #[test]
    fn test_likelihood_shape_and_bounds() {
        let d = density(3);
        let x = Variable::from_array(ndarray::ArrayD::from_shape_fn(
            ndarray::IxDyn(&[2, 3, 4, 4]),
            |i| (i[0] as f32 - i[2] as f32) * 3.0 + i[3] as f32 * 0.25,
        ));
        let lik = d.likelihood(&x).unwrap();
        assert_eq!(lik.shape(), vec![2, 3, 4, 4]);
        assert!(lik
            .to_vec()
            .iter()
            .all(|&p| (MIN_LIKELIHOOD..=MAX_LIKELIHOOD).contains(&p)));
    }

    #[test]
    fn test_likelihood_near_one_total_mass() {
        // bins covering the bulk of a width-10 density sum to about one
        let d = density(1);
        let values: Vec<f32> = (-200..=200).map(|v| v as f32).collect();
        let x = Variable::from_vec(values.clone(), &[1, 1, 1, values.len()], false).unwrap();
        let total: f32 = d.likelihood(&x).unwrap().to_vec().iter().sum();
        assert!((total - 1.0).abs() < 1e-3, "total mass {total}");
    }

    #[test]
    fn test_gradients_reach_every_parameter() {
        let d = density(2);
        let x = Variable::full(&[1, 2, 2, 2], 0.3);
        d.likelihood(&x).unwrap().log().sum().backward().unwrap();
        for p in d.parameters() {
            assert!(p.grad().is_some(), "{} has no gradient", p.name());
        }
    }

    #[test]
    fn test_detached_likelihood_leaves_parameters_alone() {
        let d = density(2);
        let x = Variable::new(ndarray::ArrayD::from_elem(ndarray::IxDyn(&[1, 2, 2, 2]), 0.3), true);
        let detached = d.detached_likelihood(&x).unwrap();
        let tracked = d.likelihood(&x).unwrap();
        assert_eq!(detached.to_vec(), tracked.to_vec());

        detached.log().sum().backward().unwrap();
        assert!(d.parameters().iter().all(|p| p.grad().is_none()));
        assert!(x.grad().is_some());
    }

    #[test]
    fn test_saturated_tail_matches_double_precision() {
        // far right tail: both CDFs round to 1 in f32 unless evaluated on the flipped side
        let d = density(1);
        let points = [150.0f32, -150.0];
        let x = Variable::from_vec(points.to_vec(), &[1, 1, 1, 2], false).unwrap();
        let lik = d.likelihood(&x).unwrap().to_vec();

        let logits_at = |offset: f32| {
            let shifted: Vec<f32> = points.iter().map(|v| v + offset).collect();
            let x = Variable::from_vec(shifted, &[1, 1, 2], false).unwrap();
            d.cdf_logits(&x, true).unwrap().to_vec()
        };
        let upper = logits_at(0.5);
        let lower = logits_at(-0.5);
        assert!(upper[0] > 10.0, "logit {} is not saturated", upper[0]);

        for i in 0..points.len() {
            let reference = (sigmoid_f64(upper[i]) - sigmoid_f64(lower[i])).abs();
            assert!(reference > f64::from(MIN_LIKELIHOOD));
            let rel = (f64::from(lik[i]) - reference).abs() / reference;
            assert!(rel < 1e-2, "x = {}: {} vs {reference}", points[i], lik[i]);
        }
    }

    #[test]
    fn test_randomized_parameters_keep_cascade_monotone() {
        for seed in 0..8 {
            let d = density(3);
            randomize(&d, seed);

            let grid: Vec<f32> = (-300..=300).map(|v| v as f32 * 0.25).collect();
            let m = grid.len();
            let values: Vec<f32> = grid.iter().copied().cycle().take(3 * m).collect();

            let x = Variable::from_vec(values.clone(), &[3, 1, m], false).unwrap();
            let logits = d.cdf_logits(&x, true).unwrap().to_vec();
            for c in 0..3 {
                for pair in logits[c * m..(c + 1) * m].windows(2) {
                    assert!(
                        pair[0] <= pair[1] + 1e-4 * (1.0 + pair[1].abs()),
                        "seed {seed} channel {c}: {} > {}",
                        pair[0],
                        pair[1]
                    );
                }
            }

            let image = Variable::from_vec(values, &[1, 3, 1, m], false).unwrap();
            let lik = d.likelihood(&image).unwrap();
            assert!(lik
                .to_vec()
                .iter()
                .all(|&p| (MIN_LIKELIHOOD..=MAX_LIKELIHOOD).contains(&p) && p <= 1.0 + 1e-6));
        }
    }

    #[test]
    fn test_with_bounds_rejects_invalid_settings() {
        let mut rng = StdRng::seed_from_u64(0);
        let config = DensityConfig::default();
        for (min, max) in [(1e-3, 1e-3), (0.0, 1.0), (1.0, 0.5)] {
            assert!(matches!(
                HyperpriorDensity::with_bounds(1, &config, min, max, &mut rng),
                Err(EntropyError::InvalidConfig(_))
            ));
        }

        let empty = DensityConfig {
            filters: Vec::new(),
            ..DensityConfig::default()
        };
        assert!(HyperpriorDensity::new(1, &empty, &mut rng).is_err());
        assert!(HyperpriorDensity::with_bounds(1, &config, 1e-9, 1e3, &mut rng).is_ok());
    }

    #[test]
    fn test_shape_errors() {
        let d = density(2);
        assert!(matches!(
            d.likelihood(&Variable::zeros(&[1, 3, 2, 2])),
            Err(EntropyError::ChannelMismatch { expected: 2, actual: 3 })
        ));
        assert!(matches!(
            d.cdf_logits(&Variable::zeros(&[2, 2, 4]), true),
            Err(EntropyError::InvalidShape { .. })
        ));
        assert!(d.likelihood(&Variable::zeros(&[2, 2])).is_err());
    }
}

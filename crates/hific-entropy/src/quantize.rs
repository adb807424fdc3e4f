//! Quantization - Rounding Policies and Rate Estimation
//!
//! Two quantization policies (additive uniform noise for training, hard
//! rounding for evaluation), straight-through rounding around a predicted
//! mean, and conversion of likelihoods into bits and bits-per-pixel.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::fmt;
use std::str::FromStr;

use hific_autograd::Variable;
use ndarray::{ArrayD, IxDyn};
use rand::Rng;

use crate::error::{image_dims, EntropyError, EntropyResult};

/// Added to likelihoods before taking the logarithm.
pub const ENTROPY_EPS: f32 = 1e-9;

// =============================================================================
// Quantization Mode
// =============================================================================

/// How continuous values are mapped onto the integer grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuantizationMode {
    /// Adds U(-0.5, 0.5) noise; differentiable relaxation of rounding.
    Noise,
    /// Rounds to the nearest integer; no gradient.
    Quantize,
}

impl QuantizationMode {
    /// Returns the canonical string form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Noise => "noise",
            Self::Quantize => "quantize",
        }
    }
}

impl FromStr for QuantizationMode {
    type Err = EntropyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "noise" => Ok(Self::Noise),
            "quantize" => Ok(Self::Quantize),
            other => Err(EntropyError::UnsupportedMode(other.to_string())),
        }
    }
}

impl fmt::Display for QuantizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Quantization
// =============================================================================

/// Applies `mode` to every element of `x`.
///
/// Noise is drawn independently per element from `rng`; gradients flow
/// through the noise branch unchanged and are cut by the rounding branch.
pub fn quantize<R>(x: &Variable, mode: QuantizationMode, rng: &mut R) -> EntropyResult<Variable>
where
    R: Rng + ?Sized,
{
    match mode {
        QuantizationMode::Noise => {
            let noise = ArrayD::from_shape_simple_fn(IxDyn(&x.shape()), || {
                rng.gen_range(-0.5f32..0.5)
            });
            Ok(x.add(&Variable::from_array(noise))?)
        }
        QuantizationMode::Quantize => Ok(x.round()),
    }
}

/// Rounds `values` onto the integer grid centred on `means`, with an
/// identity gradient in `values`.
///
/// Forward value is `means + floor(values - means + 0.5)`.
pub fn quantize_latents(values: &Variable, means: &Variable) -> EntropyResult<Variable> {
    let centred = values.sub(means)?;
    let delta = centred.add_scalar(0.5).floor().sub(&centred.detach())?;
    Ok(values.add(&delta)?)
}

// =============================================================================
// Entropy Estimation
// =============================================================================

/// Estimated coding cost of one tensor.
#[derive(Debug, Clone)]
pub struct EntropyEstimate {
    /// Bits per batch element, as a 0-d variable.
    pub bits: Variable,
    /// Bits per spatial position, as a 0-d variable.
    pub bpp: Variable,
}

/// Converts a likelihood tensor into bits and bits-per-pixel.
///
/// `shape` is the (N, C, H, W) shape of the tensor the likelihood was
/// evaluated on; bits are averaged over `N` and bpp divides by `H * W`.
pub fn estimate_entropy(shape: &[usize], likelihood: &Variable) -> EntropyResult<EntropyEstimate> {
    let (batch, _, height, width) = image_dims(shape)?;
    let quotient = -(batch as f32) * std::f32::consts::LN_2;

    let bits = likelihood
        .add_scalar(ENTROPY_EPS)
        .log()
        .sum()
        .mul_scalar(1.0 / quotient);
    let bpp = bits.mul_scalar(1.0 / (height * width) as f32);

    Ok(EntropyEstimate { bits, bpp })
}

// =============================================================================
// Tests
// =============================================================================

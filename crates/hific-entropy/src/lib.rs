//! hific-entropy - Learned Hyperprior Entropy Model
//!
//! Differentiable bit-rate estimation for learned image compression:
//!
//! - **Quantization**: additive-noise relaxation, hard rounding, and
//!   straight-through rounding around predicted means
//! - **PriorDensity**: Gaussian latent density conditioned on mean and scale
//! - **HyperpriorDensity**: non-parametric per-channel density over the
//!   hyperlatents
//! - **Hyperprior**: two-level model producing noisy and quantized rates
//!   plus the decoded latents
//!
//! # Example
//!
//! ```ignore
//! use hific_entropy::prelude::*;
//!
//! let mut rng = StdRng::seed_from_u64(0);
//! let model = Hyperprior::with_rng(HyperpriorConfig::new(220), &mut rng)?;
//! let info = model.forward(&latents, Phase::Training, &mut rng)?;
//! info.total_nbpp.backward()?;
//! ```
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// ML/tensor-specific allowances
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::float_cmp)]
#![allow(clippy::neg_cmp_op_on_partial_ord)]

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod hyperprior;
pub mod hyperprior_density;
pub mod prior;
pub mod quantize;
pub mod transforms;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{
    DensityConfig, HyperlatentFilters, HyperpriorConfig, LARGE_HYPERLATENT_FILTERS,
    MAX_LIKELIHOOD, MIN_LIKELIHOOD, MIN_SCALE, SMALL_HYPERLATENT_FILTERS,
};
pub use error::{EntropyError, EntropyResult};
pub use hyperprior::{HyperInfo, Hyperprior, Phase};
pub use hyperprior_density::HyperpriorDensity;
pub use prior::{standardized_cdf, PriorDensity};
pub use quantize::{
    estimate_entropy, quantize, quantize_latents, EntropyEstimate, QuantizationMode, ENTROPY_EPS,
};
pub use transforms::{FinalActivation, HyperpriorAnalysis, HyperpriorSynthesis};

// =============================================================================
// Prelude
// =============================================================================

/// Common imports for working with the entropy model.
pub mod prelude {
    pub use crate::{
        EntropyError, EntropyResult, HyperInfo, Hyperprior, HyperpriorConfig, HyperpriorDensity,
        Phase, PriorDensity, QuantizationMode,
    };
    pub use hific_autograd::Variable;
    pub use rand::rngs::StdRng;
    pub use rand::SeedableRng;
}

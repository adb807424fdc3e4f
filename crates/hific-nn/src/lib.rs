//! hific-nn - Neural Network Building Blocks
//!
//! Layers, activations, and parameter management for the learned entropy
//! models in `hific-entropy`.
//!
//! # Key Components
//!
//! - **Module trait**: Core interface for all neural network modules
//! - **Parameter**: Wrapper for learnable parameters
//! - **Sequential**: Container for chaining modules
//! - **Layers**: Conv2d, Upsample
//! - **Activations**: ReLU, Softplus
//! - **Initialization**: seeded uniform and Kaiming initializers
//!
//! # Example
//!
//! ```ignore
//! use hific_nn::prelude::*;
//!
//! let mut rng = StdRng::seed_from_u64(0);
//! let model = Sequential::new()
//!     .add(Conv2d::new(220, 320, 3, &mut rng))
//!     .add(ReLU);
//!
//! let output = model.forward(&input)?;
//! ```
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// ML/tensor-specific allowances
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::should_implement_trait)]
#![allow(clippy::float_cmp)]
#![allow(clippy::upper_case_acronyms)]

// =============================================================================
// Module Declarations
// =============================================================================

pub mod activation;
pub mod init;
pub mod layers;
pub mod module;
pub mod parameter;
pub mod sequential;

// =============================================================================
// Re-exports
// =============================================================================

pub use module::Module;
pub use parameter::Parameter;
pub use sequential::Sequential;

// Layer re-exports
pub use layers::{Conv2d, Upsample};

// Activation re-exports
pub use activation::{ReLU, Softplus};

// Init re-exports
pub use init::{constant, kaiming_uniform, uniform_range, zeros};

// =============================================================================
// Prelude
// =============================================================================

/// Common imports for neural network development.
pub mod prelude {
    pub use crate::{Conv2d, Module, Parameter, ReLU, Sequential, Softplus, Upsample};
    pub use hific_autograd::Variable;
}

//! Hific Autograd - Automatic Differentiation Engine
//!
//! Reverse-mode automatic differentiation over `ndarray` tensors. Provides
//! the differentiable operations needed by the learned entropy models:
//! broadcast arithmetic, smooth activations, the complementary error
//! function, batched matrix multiplication, and 2D convolution.
//!
//! # Key Features
//!
//! - **Dynamic Computational Graph** - Build graph during forward pass
//! - **Gradient Accumulation** - Leaf gradients add up across backward calls
//! - **No-grad Context** - Disable gradient tracking for inference
//! - **Detach** - Cut a value out of the graph for straight-through tricks
//!
//! # Basic Example
//!
//! ```rust,ignore
//! use hific_autograd::Variable;
//!
//! let x = Variable::new(array, true);
//! let y = x.softplus().sum();
//! y.backward()?;
//! println!("dy/dx = {:?}", x.grad());
//! ```
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// ML/tensor-specific allowances
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::many_single_char_names)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::float_cmp)]
#![allow(clippy::return_self_not_must_use)]

pub mod backward;
pub mod broadcast;
pub mod error;
pub mod functions;
pub mod grad_fn;
pub mod no_grad;
pub mod variable;

// =============================================================================
// Re-exports
// =============================================================================

pub use backward::{backward, gradcheck, numerical_gradient};
pub use broadcast::broadcast_shape;
pub use error::{AutogradError, Result};
pub use functions::conv_output_size;
pub use grad_fn::{AccumulateGrad, GradAccumulator, GradFn, GradFnId, GradientFunction};
pub use no_grad::{is_grad_enabled, no_grad, NoGradGuard};
pub use variable::Variable;

// =============================================================================
// Prelude
// =============================================================================

/// Common imports for automatic differentiation.
pub mod prelude {
    pub use crate::{no_grad, AutogradError, NoGradGuard, Variable};
}

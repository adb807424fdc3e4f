//! Differentiable Functions - Gradient Implementations
//!
//! One `GradientFunction` per recorded operation.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

mod activation;
mod basic;
mod linalg;
mod shape;
mod spatial;

pub use activation::*;
pub use basic::*;
pub use linalg::BmmBackward;
pub use shape::*;
pub use spatial::{conv_output_size, Conv2dBackward, UpsampleNearestBackward};

pub(crate) use activation::{stable_sigmoid, stable_softplus};
pub(crate) use linalg::batched_matmul;
pub(crate) use shape::reshape_standard;
pub(crate) use spatial::{conv2d_forward, upsample_nearest_forward};

//! Neural Network Layers
//!
//! Convolution and resampling layers used by the hyperprior transforms.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

pub mod conv;
pub mod upsample;

// Re-exports
pub use conv::Conv2d;
pub use upsample::Upsample;

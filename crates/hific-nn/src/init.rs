//! Weight Initialization - Parameter Initialization Strategies
//!
//! Random initializers take the generator explicitly so that model
//! construction is reproducible under a seeded `StdRng`.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use ndarray::{ArrayD, IxDyn};
use rand::Rng;

// =============================================================================
// Basic Initializers
// =============================================================================

/// Creates an array filled with zeros.
pub fn zeros(shape: &[usize]) -> ArrayD<f32> {
    ArrayD::zeros(IxDyn(shape))
}

/// Creates an array filled with a constant value.
pub fn constant(shape: &[usize], value: f32) -> ArrayD<f32> {
    ArrayD::from_elem(IxDyn(shape), value)
}

// =============================================================================
// Random Initializers
// =============================================================================

/// Creates an array with uniform random values in [low, high).
pub fn uniform_range<R>(shape: &[usize], low: f32, high: f32, rng: &mut R) -> ArrayD<f32>
where
    R: Rng + ?Sized,
{
    ArrayD::from_shape_simple_fn(IxDyn(shape), || rng.gen_range(low..high))
}

// =============================================================================
// Kaiming/He Initialization
// =============================================================================

/// Kaiming uniform initialization.
///
/// Designed for layers with ReLU activations.
/// Samples from U(-bound, bound) where bound = sqrt(6 / fan_in), with
/// `fan_in` the product of all but the leading dimension of `shape`.
pub fn kaiming_uniform<R>(shape: &[usize], rng: &mut R) -> ArrayD<f32>
where
    R: Rng + ?Sized,
{
    let fan_in: usize = shape.iter().skip(1).product::<usize>().max(1);
    let bound = (6.0 / fan_in as f32).sqrt();
    uniform_range(shape, -bound, bound, rng)
}

// =============================================================================
// Tests
// =============================================================================

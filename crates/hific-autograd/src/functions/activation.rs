//! Activation Gradient Functions
//!
//! Element-wise nonlinearities used by the entropy models: log, exp, relu,
//! softplus, tanh, sigmoid and the complementary error function.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::f32::consts::PI;

use ndarray::{ArrayD, Zip};

use crate::grad_fn::{GradFn, GradientFunction};

/// Multiplies `grad_output` by `f(saved)` element-wise.
fn chain(grad_output: &ArrayD<f32>, saved: &ArrayD<f32>, f: impl Fn(f32) -> f32) -> ArrayD<f32> {
    Zip::from(grad_output)
        .and(saved)
        .map_collect(|&g, &s| g * f(s))
}

/// Numerically stable logistic function.
pub(crate) fn stable_sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + e^x)` without overflow for large `x`.
pub(crate) fn stable_softplus(x: f32) -> f32 {
    x.max(0.0) + (-x.abs()).exp().ln_1p()
}

// =============================================================================
// Log Backward
// =============================================================================

/// Gradient function for the natural logarithm.
///
/// d/dx ln(x) = 1/x
#[derive(Debug)]
pub struct LogBackward {
    next_fns: Vec<Option<GradFn>>,
    saved_input: ArrayD<f32>,
}

impl LogBackward {
    /// Creates a new `LogBackward`.
    #[must_use]
    pub fn new(grad_fn: Option<GradFn>, input: ArrayD<f32>) -> Self {
        Self {
            next_fns: vec![grad_fn],
            saved_input: input,
        }
    }
}

impl GradientFunction for LogBackward {
    fn apply(&self, grad_output: &ArrayD<f32>) -> Vec<Option<ArrayD<f32>>> {
        vec![Some(chain(grad_output, &self.saved_input, f32::recip))]
    }

    fn name(&self) -> &'static str {
        "LogBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }
}

// =============================================================================
// Exp Backward
// =============================================================================

/// Gradient function for the exponential.
///
/// d/dx e^x = e^x
#[derive(Debug)]
pub struct ExpBackward {
    next_fns: Vec<Option<GradFn>>,
    saved_output: ArrayD<f32>,
}

impl ExpBackward {
    /// Creates a new `ExpBackward`.
    #[must_use]
    pub fn new(grad_fn: Option<GradFn>, output: ArrayD<f32>) -> Self {
        Self {
            next_fns: vec![grad_fn],
            saved_output: output,
        }
    }
}

impl GradientFunction for ExpBackward {
    fn apply(&self, grad_output: &ArrayD<f32>) -> Vec<Option<ArrayD<f32>>> {
        vec![Some(chain(grad_output, &self.saved_output, |y| y))]
    }

    fn name(&self) -> &'static str {
        "ExpBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }
}

// =============================================================================
// ReLU Backward
// =============================================================================

/// Gradient function for `ReLU`.
#[derive(Debug)]
pub struct ReluBackward {
    next_fns: Vec<Option<GradFn>>,
    saved_input: ArrayD<f32>,
}

impl ReluBackward {
    /// Creates a new `ReluBackward`.
    #[must_use]
    pub fn new(grad_fn: Option<GradFn>, input: ArrayD<f32>) -> Self {
        Self {
            next_fns: vec![grad_fn],
            saved_input: input,
        }
    }
}

impl GradientFunction for ReluBackward {
    fn apply(&self, grad_output: &ArrayD<f32>) -> Vec<Option<ArrayD<f32>>> {
        let grad = chain(grad_output, &self.saved_input, |x| if x > 0.0 { 1.0 } else { 0.0 });
        vec![Some(grad)]
    }

    fn name(&self) -> &'static str {
        "ReluBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }
}

// =============================================================================
// Softplus Backward
// =============================================================================

/// Gradient function for softplus.
///
/// d/dx ln(1 + e^x) = sigmoid(x)
#[derive(Debug)]
pub struct SoftplusBackward {
    next_fns: Vec<Option<GradFn>>,
    saved_input: ArrayD<f32>,
}

impl SoftplusBackward {
    /// Creates a new `SoftplusBackward`.
    #[must_use]
    pub fn new(grad_fn: Option<GradFn>, input: ArrayD<f32>) -> Self {
        Self {
            next_fns: vec![grad_fn],
            saved_input: input,
        }
    }
}

impl GradientFunction for SoftplusBackward {
    fn apply(&self, grad_output: &ArrayD<f32>) -> Vec<Option<ArrayD<f32>>> {
        vec![Some(chain(grad_output, &self.saved_input, stable_sigmoid))]
    }

    fn name(&self) -> &'static str {
        "SoftplusBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }
}

// =============================================================================
// Tanh Backward
// =============================================================================

/// Gradient function for tanh.
///
/// d/dx tanh(x) = 1 - tanh(x)^2
#[derive(Debug)]
pub struct TanhBackward {
    next_fns: Vec<Option<GradFn>>,
    saved_output: ArrayD<f32>,
}

impl TanhBackward {
    /// Creates a new `TanhBackward`.
    #[must_use]
    pub fn new(grad_fn: Option<GradFn>, output: ArrayD<f32>) -> Self {
        Self {
            next_fns: vec![grad_fn],
            saved_output: output,
        }
    }
}

impl GradientFunction for TanhBackward {
    fn apply(&self, grad_output: &ArrayD<f32>) -> Vec<Option<ArrayD<f32>>> {
        vec![Some(chain(grad_output, &self.saved_output, |y| 1.0 - y * y))]
    }

    fn name(&self) -> &'static str {
        "TanhBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }
}

// =============================================================================
// Sigmoid Backward
// =============================================================================

/// Gradient function for sigmoid.
///
/// d/dx sigmoid(x) = sigmoid(x) * (1 - sigmoid(x))
#[derive(Debug)]
pub struct SigmoidBackward {
    next_fns: Vec<Option<GradFn>>,
    saved_output: ArrayD<f32>,
}

impl SigmoidBackward {
    /// Creates a new `SigmoidBackward`.
    #[must_use]
    pub fn new(grad_fn: Option<GradFn>, output: ArrayD<f32>) -> Self {
        Self {
            next_fns: vec![grad_fn],
            saved_output: output,
        }
    }
}

impl GradientFunction for SigmoidBackward {
    fn apply(&self, grad_output: &ArrayD<f32>) -> Vec<Option<ArrayD<f32>>> {
        vec![Some(chain(grad_output, &self.saved_output, |y| y * (1.0 - y)))]
    }

    fn name(&self) -> &'static str {
        "SigmoidBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }
}

// =============================================================================
// Erfc Backward
// =============================================================================

/// Gradient function for the complementary error function.
///
/// d/dx erfc(x) = -2/sqrt(pi) * e^(-x^2)
#[derive(Debug)]
pub struct ErfcBackward {
    next_fns: Vec<Option<GradFn>>,
    saved_input: ArrayD<f32>,
}

impl ErfcBackward {
    /// Creates a new `ErfcBackward`.
    #[must_use]
    pub fn new(grad_fn: Option<GradFn>, input: ArrayD<f32>) -> Self {
        Self {
            next_fns: vec![grad_fn],
            saved_input: input,
        }
    }
}

impl GradientFunction for ErfcBackward {
    fn apply(&self, grad_output: &ArrayD<f32>) -> Vec<Option<ArrayD<f32>>> {
        let coeff = -2.0 / PI.sqrt();
        vec![Some(chain(grad_output, &self.saved_input, |x| {
            coeff * (-x * x).exp()
        }))]
    }

    fn name(&self) -> &'static str {
        "ErfcBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn test_stable_sigmoid_saturates() {
        assert!((stable_sigmoid(0.0) - 0.5).abs() < 1e-7);
        assert!(stable_sigmoid(-200.0) >= 0.0);
        assert!((stable_sigmoid(200.0) - 1.0).abs() < 1e-7);
    }

    #[test]
    fn test_stable_softplus() {
        assert!((stable_softplus(0.0) - std::f32::consts::LN_2).abs() < 1e-6);
        assert!((stable_softplus(100.0) - 100.0).abs() < 1e-4);
        assert!(stable_softplus(-100.0) >= 0.0);
        assert!(stable_softplus(-100.0) < 1e-30);
    }

    #[test]
    fn test_erfc_backward_at_zero() {
        let backward = ErfcBackward::new(None, ArrayD::zeros(IxDyn(&[1])));
        let grads = backward.apply(&ArrayD::ones(IxDyn(&[1])));
        let g = grads[0].as_ref().unwrap().iter().next().copied().unwrap();
        assert!((g + 2.0 / PI.sqrt()).abs() < 1e-6);
    }
}

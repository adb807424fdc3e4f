//! Basic Gradient Functions - Arithmetic Operations
//!
//! Gradient functions for add, sub, mul, div, neg, scalar scaling, abs,
//! clamp and sum.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use ndarray::{ArrayD, IxDyn, Zip};

use crate::broadcast::reduce_to_shape;
use crate::grad_fn::{GradFn, GradientFunction};

// =============================================================================
// Add Backward
// =============================================================================

/// Gradient function for addition.
///
/// d/dx(x + y) = 1, d/dy(x + y) = 1
#[derive(Debug)]
pub struct AddBackward {
    next_fns: Vec<Option<GradFn>>,
    input_shapes: (Vec<usize>, Vec<usize>),
}

impl AddBackward {
    /// Creates a new `AddBackward`.
    #[must_use]
    pub fn new(
        lhs_grad_fn: Option<GradFn>,
        rhs_grad_fn: Option<GradFn>,
        lhs_shape: Vec<usize>,
        rhs_shape: Vec<usize>,
    ) -> Self {
        Self {
            next_fns: vec![lhs_grad_fn, rhs_grad_fn],
            input_shapes: (lhs_shape, rhs_shape),
        }
    }
}

impl GradientFunction for AddBackward {
    fn apply(&self, grad_output: &ArrayD<f32>) -> Vec<Option<ArrayD<f32>>> {
        let grad_lhs = reduce_to_shape(grad_output, &self.input_shapes.0);
        let grad_rhs = reduce_to_shape(grad_output, &self.input_shapes.1);
        vec![Some(grad_lhs), Some(grad_rhs)]
    }

    fn name(&self) -> &'static str {
        "AddBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }
}

// =============================================================================
// Sub Backward
// =============================================================================

/// Gradient function for subtraction.
///
/// d/dx(x - y) = 1, d/dy(x - y) = -1
#[derive(Debug)]
pub struct SubBackward {
    next_fns: Vec<Option<GradFn>>,
    input_shapes: (Vec<usize>, Vec<usize>),
}

impl SubBackward {
    /// Creates a new `SubBackward`.
    #[must_use]
    pub fn new(
        lhs_grad_fn: Option<GradFn>,
        rhs_grad_fn: Option<GradFn>,
        lhs_shape: Vec<usize>,
        rhs_shape: Vec<usize>,
    ) -> Self {
        Self {
            next_fns: vec![lhs_grad_fn, rhs_grad_fn],
            input_shapes: (lhs_shape, rhs_shape),
        }
    }
}

impl GradientFunction for SubBackward {
    fn apply(&self, grad_output: &ArrayD<f32>) -> Vec<Option<ArrayD<f32>>> {
        let grad_lhs = reduce_to_shape(grad_output, &self.input_shapes.0);
        let grad_rhs = reduce_to_shape(&grad_output.mapv(|g| -g), &self.input_shapes.1);
        vec![Some(grad_lhs), Some(grad_rhs)]
    }

    fn name(&self) -> &'static str {
        "SubBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }
}

// =============================================================================
// Mul Backward
// =============================================================================

/// Gradient function for multiplication.
///
/// d/dx(x * y) = y, d/dy(x * y) = x
#[derive(Debug)]
pub struct MulBackward {
    next_fns: Vec<Option<GradFn>>,
    saved_lhs: ArrayD<f32>,
    saved_rhs: ArrayD<f32>,
}

impl MulBackward {
    /// Creates a new `MulBackward`.
    #[must_use]
    pub fn new(
        lhs_grad_fn: Option<GradFn>,
        rhs_grad_fn: Option<GradFn>,
        lhs: ArrayD<f32>,
        rhs: ArrayD<f32>,
    ) -> Self {
        Self {
            next_fns: vec![lhs_grad_fn, rhs_grad_fn],
            saved_lhs: lhs,
            saved_rhs: rhs,
        }
    }
}

impl GradientFunction for MulBackward {
    fn apply(&self, grad_output: &ArrayD<f32>) -> Vec<Option<ArrayD<f32>>> {
        let grad_lhs = grad_output * &self.saved_rhs;
        let grad_rhs = grad_output * &self.saved_lhs;
        vec![
            Some(reduce_to_shape(&grad_lhs, self.saved_lhs.shape())),
            Some(reduce_to_shape(&grad_rhs, self.saved_rhs.shape())),
        ]
    }

    fn name(&self) -> &'static str {
        "MulBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }
}

// =============================================================================
// Div Backward
// =============================================================================

/// Gradient function for division.
///
/// d/dx(x / y) = 1/y, d/dy(x / y) = -x/y^2
#[derive(Debug)]
pub struct DivBackward {
    next_fns: Vec<Option<GradFn>>,
    saved_lhs: ArrayD<f32>,
    saved_rhs: ArrayD<f32>,
}

impl DivBackward {
    /// Creates a new `DivBackward`.
    #[must_use]
    pub fn new(
        lhs_grad_fn: Option<GradFn>,
        rhs_grad_fn: Option<GradFn>,
        lhs: ArrayD<f32>,
        rhs: ArrayD<f32>,
    ) -> Self {
        Self {
            next_fns: vec![lhs_grad_fn, rhs_grad_fn],
            saved_lhs: lhs,
            saved_rhs: rhs,
        }
    }
}

impl GradientFunction for DivBackward {
    fn apply(&self, grad_output: &ArrayD<f32>) -> Vec<Option<ArrayD<f32>>> {
        let grad_lhs = grad_output / &self.saved_rhs;
        let denom = &self.saved_rhs * &self.saved_rhs;
        let grad_rhs = -(grad_output * &self.saved_lhs) / &denom;
        vec![
            Some(reduce_to_shape(&grad_lhs, self.saved_lhs.shape())),
            Some(reduce_to_shape(&grad_rhs, self.saved_rhs.shape())),
        ]
    }

    fn name(&self) -> &'static str {
        "DivBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }
}

// =============================================================================
// Scale Backward
// =============================================================================

/// Gradient function for multiplication by a constant (negation is `-1`).
///
/// d/dx(c * x) = c
#[derive(Debug)]
pub struct ScaleBackward {
    next_fns: Vec<Option<GradFn>>,
    factor: f32,
}

impl ScaleBackward {
    /// Creates a new `ScaleBackward`.
    #[must_use]
    pub fn new(grad_fn: Option<GradFn>, factor: f32) -> Self {
        Self {
            next_fns: vec![grad_fn],
            factor,
        }
    }
}

impl GradientFunction for ScaleBackward {
    fn apply(&self, grad_output: &ArrayD<f32>) -> Vec<Option<ArrayD<f32>>> {
        vec![Some(grad_output.mapv(|g| g * self.factor))]
    }

    fn name(&self) -> &'static str {
        "ScaleBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }
}

// =============================================================================
// Identity Backward
// =============================================================================

/// Gradient function for shifts by a constant.
///
/// d/dx(x + c) = 1
#[derive(Debug)]
pub struct IdentityBackward {
    next_fns: Vec<Option<GradFn>>,
}

impl IdentityBackward {
    /// Creates a new `IdentityBackward`.
    #[must_use]
    pub fn new(grad_fn: Option<GradFn>) -> Self {
        Self {
            next_fns: vec![grad_fn],
        }
    }
}

impl GradientFunction for IdentityBackward {
    fn apply(&self, grad_output: &ArrayD<f32>) -> Vec<Option<ArrayD<f32>>> {
        vec![Some(grad_output.clone())]
    }

    fn name(&self) -> &'static str {
        "IdentityBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }
}

// =============================================================================
// Abs Backward
// =============================================================================

/// Gradient function for absolute value.
///
/// d/dx|x| = sign(x), taken as 0 at x = 0.
#[derive(Debug)]
pub struct AbsBackward {
    next_fns: Vec<Option<GradFn>>,
    saved_input: ArrayD<f32>,
}

impl AbsBackward {
    /// Creates a new `AbsBackward`.
    #[must_use]
    pub fn new(grad_fn: Option<GradFn>, input: ArrayD<f32>) -> Self {
        Self {
            next_fns: vec![grad_fn],
            saved_input: input,
        }
    }
}

impl GradientFunction for AbsBackward {
    fn apply(&self, grad_output: &ArrayD<f32>) -> Vec<Option<ArrayD<f32>>> {
        let grad = Zip::from(grad_output)
            .and(&self.saved_input)
            .map_collect(|&g, &x| {
                if x > 0.0 {
                    g
                } else if x < 0.0 {
                    -g
                } else {
                    0.0
                }
            });
        vec![Some(grad)]
    }

    fn name(&self) -> &'static str {
        "AbsBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }
}

// =============================================================================
// Clamp Backward
// =============================================================================

/// Gradient function for clamping.
///
/// The gradient passes where `min <= x <= max` and is zero elsewhere.
#[derive(Debug)]
pub struct ClampBackward {
    next_fns: Vec<Option<GradFn>>,
    saved_input: ArrayD<f32>,
    min: f32,
    max: f32,
}

impl ClampBackward {
    /// Creates a new `ClampBackward`.
    #[must_use]
    pub fn new(grad_fn: Option<GradFn>, input: ArrayD<f32>, min: f32, max: f32) -> Self {
        Self {
            next_fns: vec![grad_fn],
            saved_input: input,
            min,
            max,
        }
    }
}

impl GradientFunction for ClampBackward {
    fn apply(&self, grad_output: &ArrayD<f32>) -> Vec<Option<ArrayD<f32>>> {
        let grad = Zip::from(grad_output)
            .and(&self.saved_input)
            .map_collect(|&g, &x| if x >= self.min && x <= self.max { g } else { 0.0 });
        vec![Some(grad)]
    }

    fn name(&self) -> &'static str {
        "ClampBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }
}

// =============================================================================
// Sum Backward
// =============================================================================

/// Gradient function for the full sum.
///
/// Every input element receives the (scalar) output gradient.
#[derive(Debug)]
pub struct SumBackward {
    next_fns: Vec<Option<GradFn>>,
    input_shape: Vec<usize>,
}

impl SumBackward {
    /// Creates a new `SumBackward`.
    #[must_use]
    pub fn new(grad_fn: Option<GradFn>, input_shape: Vec<usize>) -> Self {
        Self {
            next_fns: vec![grad_fn],
            input_shape,
        }
    }
}

impl GradientFunction for SumBackward {
    fn apply(&self, grad_output: &ArrayD<f32>) -> Vec<Option<ArrayD<f32>>> {
        let g = grad_output.sum();
        vec![Some(ArrayD::from_elem(IxDyn(&self.input_shape), g))]
    }

    fn name(&self) -> &'static str {
        "SumBackward"
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

    fn array(values: &[f32], shape: &[usize]) -> ArrayD<f32> {
        ArrayD::from_shape_vec(IxDyn(shape), values.to_vec()).unwrap()
    }

    #[test]
    fn test_add_backward_reduces_broadcast() {
        let backward = AddBackward::new(None, None, vec![2, 3], vec![3]);
        let grads = backward.apply(&ArrayD::ones(IxDyn(&[2, 3])));
        assert_eq!(grads[0].as_ref().unwrap().shape(), &[2, 3]);
        let rhs = grads[1].as_ref().unwrap();
        assert_eq!(rhs.shape(), &[3]);
        assert!(rhs.iter().all(|&g| (g - 2.0).abs() < 1e-6));
    }

    #[test]
    fn test_div_backward() {
        let backward = DivBackward::new(None, None, array(&[6.0], &[1]), array(&[2.0], &[1]));
        let grads = backward.apply(&array(&[1.0], &[1]));
        let lhs = grads[0].as_ref().unwrap().iter().next().copied().unwrap();
        let rhs = grads[1].as_ref().unwrap().iter().next().copied().unwrap();
        assert!((lhs - 0.5).abs() < 1e-6);
        assert!((rhs + 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_abs_backward_zero_at_origin() {
        let backward = AbsBackward::new(None, array(&[-2.0, 0.0, 3.0], &[3]));
        let grads = backward.apply(&array(&[1.0, 1.0, 1.0], &[3]));
        assert_eq!(
            grads[0].as_ref().unwrap().iter().copied().collect::<Vec<_>>(),
            vec![-1.0, 0.0, 1.0]
        );
    }

    #[test]
    fn test_clamp_backward_masks_outside() {
        let backward = ClampBackward::new(None, array(&[-1.0, 0.5, 2.0], &[3]), 0.0, 1.0);
        let grads = backward.apply(&array(&[1.0, 1.0, 1.0], &[3]));
        assert_eq!(
            grads[0].as_ref().unwrap().iter().copied().collect::<Vec<_>>(),
            vec![0.0, 1.0, 0.0]
        );
    }

    #[test]
    fn test_sum_backward() {
        let backward = SumBackward::new(None, vec![2, 2]);
        let grads = backward.apply(&ArrayD::from_elem(IxDyn(&[]), 3.0));
        assert!(grads[0].as_ref().unwrap().iter().all(|&g| (g - 3.0).abs() < 1e-6));
    }
}

//! Shape Gradient Functions
//!
//! Reshape and axis permutation. Both only move data, so their gradients
//! undo the move.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use ndarray::{ArrayD, IxDyn};

use crate::grad_fn::{GradFn, GradientFunction};

/// Copies `array` in logical order into a standard-layout array of `shape`.
///
/// Callers validate the element count before the node is recorded.
pub(crate) fn reshape_standard(array: &ArrayD<f32>, shape: &[usize]) -> ArrayD<f32> {
    let values: Vec<f32> = array.iter().copied().collect();
    ArrayD::from_shape_vec(IxDyn(shape), values).expect("reshape preserves element count")
}

// =============================================================================
// Reshape Backward
// =============================================================================

/// Gradient function for reshape.
#[derive(Debug)]
pub struct ReshapeBackward {
    next_fns: Vec<Option<GradFn>>,
    input_shape: Vec<usize>,
}

impl ReshapeBackward {
    /// Creates a new `ReshapeBackward`.
    #[must_use]
    pub fn new(grad_fn: Option<GradFn>, input_shape: Vec<usize>) -> Self {
        Self {
            next_fns: vec![grad_fn],
            input_shape,
        }
    }
}

impl GradientFunction for ReshapeBackward {
    fn apply(&self, grad_output: &ArrayD<f32>) -> Vec<Option<ArrayD<f32>>> {
        vec![Some(reshape_standard(grad_output, &self.input_shape))]
    }

    fn name(&self) -> &'static str {
        "ReshapeBackward"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &self.next_fns
    }
}

// =============================================================================
// Permute Backward
// =============================================================================

/// Gradient function for axis permutation.
///
/// The gradient is permuted by the inverse permutation.
#[derive(Debug)]
pub struct PermuteBackward {
    next_fns: Vec<Option<GradFn>>,
    inverse: Vec<usize>,
}

impl PermuteBackward {
    /// Creates a new `PermuteBackward` for the forward permutation `axes`.
    #[must_use]
    pub fn new(grad_fn: Option<GradFn>, axes: &[usize]) -> Self {
        let mut inverse = vec![0; axes.len()];
        for (i, &axis) in axes.iter().enumerate() {
            inverse[axis] = i;
        }
        Self {
            next_fns: vec![grad_fn],
            inverse,
        }
    }
}

impl GradientFunction for PermuteBackward {
    fn apply(&self, grad_output: &ArrayD<f32>) -> Vec<Option<ArrayD<f32>>> {
        let grad = grad_output
            .view()
            .permuted_axes(IxDyn(&self.inverse))
            .as_standard_layout()
            .into_owned();
        vec![Some(grad)]
    }

    fn name(&self) -> &'static str {
        "PermuteBackward"
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

    #[test]
    fn test_inverse_permutation() {
        let backward = PermuteBackward::new(None, &[1, 2, 0]);
        assert_eq!(backward.inverse, vec![2, 0, 1]);

        let grad = ArrayD::<f32>::zeros(IxDyn(&[3, 4, 2]));
        let grads = backward.apply(&grad);
        assert_eq!(grads[0].as_ref().unwrap().shape(), &[2, 3, 4]);
    }

    #[test]
    fn test_reshape_backward_restores_shape() {
        let backward = ReshapeBackward::new(None, vec![2, 3]);
        let grads = backward.apply(&ArrayD::ones(IxDyn(&[6])));
        assert_eq!(grads[0].as_ref().unwrap().shape(), &[2, 3]);
    }
}

//! Linear Algebra Gradient Functions
//!
//! Batched matrix multiplication over a leading batch axis, the primitive
//! behind per-channel density networks.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use ndarray::{s, Array3, ArrayD, ArrayView3, Ix3};

use crate::grad_fn::{GradFn, GradientFunction};

/// Computes `lhs[b] @ rhs[b]` for every batch index `b`.
pub(crate) fn batched_matmul(lhs: ArrayView3<'_, f32>, rhs: ArrayView3<'_, f32>) -> Array3<f32> {
    let (batch, m, _) = lhs.dim();
    let n = rhs.dim().2;
    let mut out = Array3::<f32>::zeros((batch, m, n));
    for b in 0..batch {
        let product = lhs.slice(s![b, .., ..]).dot(&rhs.slice(s![b, .., ..]));
        out.slice_mut(s![b, .., ..]).assign(&product);
    }
    out
}

/// Swaps the two trailing axes of a rank-3 view.
fn transpose_last(view: ArrayView3<'_, f32>) -> ArrayView3<'_, f32> {
    view.permuted_axes([0, 2, 1])
}

// =============================================================================
// Bmm Backward
// =============================================================================

/// Gradient function for batched matrix multiplication.
///
/// For C[b] = A[b] @ B[b]:
/// dL/dA[b] = dL/dC[b] @ B[b]^T
/// dL/dB[b] = A[b]^T @ dL/dC[b]
#[derive(Debug)]
pub struct BmmBackward {
    next_fns: Vec<Option<GradFn>>,
    saved_lhs: Array3<f32>,
    saved_rhs: Array3<f32>,
}

impl BmmBackward {
    /// Creates a new `BmmBackward`.
    #[must_use]
    pub fn new(
        lhs_grad_fn: Option<GradFn>,
        rhs_grad_fn: Option<GradFn>,
        lhs: Array3<f32>,
        rhs: Array3<f32>,
    ) -> Self {
        Self {
            next_fns: vec![lhs_grad_fn, rhs_grad_fn],
            saved_lhs: lhs,
            saved_rhs: rhs,
        }
    }
}

impl GradientFunction for BmmBackward {
    fn apply(&self, grad_output: &ArrayD<f32>) -> Vec<Option<ArrayD<f32>>> {
        let grad = grad_output
            .view()
            .into_dimensionality::<Ix3>()
            .expect("bmm output is rank 3");

        let grad_lhs = batched_matmul(grad.view(), transpose_last(self.saved_rhs.view()));
        let grad_rhs = batched_matmul(transpose_last(self.saved_lhs.view()), grad.view());

        vec![Some(grad_lhs.into_dyn()), Some(grad_rhs.into_dyn())]
    }

    fn name(&self) -> &'static str {
        "BmmBackward"
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
    use ndarray::array;

    #[test]
    fn test_batched_matmul() {
        let a = array![[[1.0f32, 2.0], [3.0, 4.0]], [[1.0, 0.0], [0.0, 1.0]]];
        let b = array![[[1.0f32], [1.0]], [[5.0], [6.0]]];
        let c = batched_matmul(a.view(), b.view());
        assert_eq!(c.dim(), (2, 2, 1));
        assert_eq!(c[[0, 0, 0]], 3.0);
        assert_eq!(c[[0, 1, 0]], 7.0);
        assert_eq!(c[[1, 0, 0]], 5.0);
        assert_eq!(c[[1, 1, 0]], 6.0);
    }

    #[test]
    fn test_bmm_backward_shapes() {
        let a = Array3::<f32>::ones((3, 2, 4));
        let b = Array3::<f32>::ones((3, 4, 5));
        let backward = BmmBackward::new(None, None, a, b);
        let grads = backward.apply(&Array3::<f32>::ones((3, 2, 5)).into_dyn());
        assert_eq!(grads[0].as_ref().unwrap().shape(), &[3, 2, 4]);
        assert_eq!(grads[1].as_ref().unwrap().shape(), &[3, 4, 5]);
        // every entry of dA sums over 5 ones from dC times ones from B
        assert!(grads[0].as_ref().unwrap().iter().all(|&g| (g - 5.0).abs() < 1e-6));
    }
}

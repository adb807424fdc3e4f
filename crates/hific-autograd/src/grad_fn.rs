//! Gradient Function Traits - Differentiable Operation Interface
//!
//! Every recorded operation owns a `GradientFunction` that maps the gradient
//! of its output onto gradients of its inputs. Leaves use `AccumulateGrad`,
//! which writes into storage shared with the owning `Variable`.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::fmt::Debug;
use std::sync::Arc;

use ndarray::ArrayD;
use parking_lot::RwLock;

// =============================================================================
// Gradient Function Trait
// =============================================================================

/// Trait for gradient computation functions.
pub trait GradientFunction: Debug + Send + Sync {
    /// Computes gradients with respect to inputs.
    ///
    /// Returns one entry per element of [`next_functions`](Self::next_functions),
    /// `None` where the input does not need a gradient.
    fn apply(&self, grad_output: &ArrayD<f32>) -> Vec<Option<ArrayD<f32>>>;

    /// Returns the name of this gradient function for debugging.
    fn name(&self) -> &'static str;

    /// Returns references to the next functions in the backward graph.
    fn next_functions(&self) -> &[Option<GradFn>];
}

// =============================================================================
// GradFn - Arc Wrapper
// =============================================================================

/// Identifier for a `GradFn` that survives cloning.
pub type GradFnId = usize;

/// Reference-counted gradient function.
#[derive(Clone)]
pub struct GradFn {
    inner: Arc<dyn GradientFunction>,
}

impl GradFn {
    /// Creates a new `GradFn` from a gradient function.
    pub fn new<F: GradientFunction + 'static>(func: F) -> Self {
        Self {
            inner: Arc::new(func),
        }
    }

    /// Applies the gradient function.
    #[must_use]
    pub fn apply(&self, grad_output: &ArrayD<f32>) -> Vec<Option<ArrayD<f32>>> {
        self.inner.apply(grad_output)
    }

    /// Returns the name of the gradient function.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.inner.name()
    }

    /// Returns the next functions in the graph.
    #[must_use]
    pub fn next_functions(&self) -> &[Option<GradFn>] {
        self.inner.next_functions()
    }

    /// Returns a stable ID for this `GradFn`.
    ///
    /// Uses the data half of the Arc pointer, which every clone shares.
    #[must_use]
    pub fn id(&self) -> GradFnId {
        let ptr = Arc::as_ptr(&self.inner);
        ptr.cast::<()>() as GradFnId
    }
}

impl Debug for GradFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GradFn({})", self.name())
    }
}

// =============================================================================
// Accumulate Grad - Leaf Node Gradient Function
// =============================================================================

/// Shared gradient accumulator for leaf variables.
pub type GradAccumulator = Arc<RwLock<Option<ArrayD<f32>>>>;

/// Gradient function for leaf variables (accumulates gradients).
pub struct AccumulateGrad {
    grad_accumulator: GradAccumulator,
}

impl AccumulateGrad {
    /// Creates a new `AccumulateGrad` with a shared gradient accumulator.
    pub fn new(grad_accumulator: GradAccumulator) -> Self {
        Self { grad_accumulator }
    }

    /// Accumulates gradient into the shared storage.
    pub fn accumulate(&self, grad: &ArrayD<f32>) {
        let mut guard = self.grad_accumulator.write();
        match guard.as_mut() {
            Some(existing) => *existing += grad,
            None => *guard = Some(grad.clone()),
        }
    }
}

impl Debug for AccumulateGrad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccumulateGrad").finish()
    }
}

impl GradientFunction for AccumulateGrad {
    fn apply(&self, grad_output: &ArrayD<f32>) -> Vec<Option<ArrayD<f32>>> {
        self.accumulate(grad_output);
        vec![]
    }

    fn name(&self) -> &'static str {
        "AccumulateGrad"
    }

    fn next_functions(&self) -> &[Option<GradFn>] {
        &[]
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_accumulate_grad() {
        let grad_acc: GradAccumulator = Arc::new(RwLock::new(None));
        let acc = AccumulateGrad::new(Arc::clone(&grad_acc));
        assert_eq!(acc.name(), "AccumulateGrad");
        assert!(acc.next_functions().is_empty());

        let grad = arr1(&[1.0f32, 2.0, 3.0]).into_dyn();
        acc.accumulate(&grad);
        assert_eq!(
            grad_acc.read().as_ref().unwrap().iter().copied().collect::<Vec<_>>(),
            vec![1.0, 2.0, 3.0]
        );

        acc.accumulate(&grad);
        assert_eq!(
            grad_acc.read().as_ref().unwrap().iter().copied().collect::<Vec<_>>(),
            vec![2.0, 4.0, 6.0]
        );
    }

    #[test]
    fn test_grad_fn_id_survives_clone() {
        let grad_acc: GradAccumulator = Arc::new(RwLock::new(None));
        let grad_fn = GradFn::new(AccumulateGrad::new(grad_acc));
        let cloned = grad_fn.clone();
        assert_eq!(grad_fn.id(), cloned.id());
        assert_eq!(cloned.name(), "AccumulateGrad");
    }
}

//! Parameter - Learnable Parameter Wrapper
//!
//! Wraps Variables that are learnable parameters of a module.
//! Parameters are shared between the module that owns them and any
//! external optimizer that updates them between forward calls.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::sync::Arc;

use hific_autograd::Variable;
use ndarray::ArrayD;
use parking_lot::RwLock;

// =============================================================================
// Parameter
// =============================================================================

/// A learnable parameter of a neural network module.
///
/// Clones share the same underlying variable, so an update made through one
/// handle is seen by every module holding another.
#[derive(Clone)]
pub struct Parameter {
    /// The underlying variable.
    data: Arc<RwLock<Variable>>,
    /// Parameter name (for debugging and serialization).
    name: String,
}

impl Parameter {
    /// Creates a new parameter from an array.
    pub fn new(data: ArrayD<f32>, requires_grad: bool) -> Self {
        Self {
            data: Arc::new(RwLock::new(Variable::new(data, requires_grad))),
            name: String::new(),
        }
    }

    /// Creates a new parameter with a name.
    pub fn named(name: impl Into<String>, data: ArrayD<f32>, requires_grad: bool) -> Self {
        Self {
            data: Arc::new(RwLock::new(Variable::new(data, requires_grad))),
            name: name.into(),
        }
    }

    /// Returns the parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a clone of the underlying Variable.
    ///
    /// The clone shares gradient storage, so backward passes through it
    /// accumulate into this parameter.
    pub fn variable(&self) -> Variable {
        self.data.read().clone()
    }

    /// Returns a clone of the array data.
    pub fn data(&self) -> ArrayD<f32> {
        self.data.read().data()
    }

    /// Returns the shape of the parameter.
    pub fn shape(&self) -> Vec<usize> {
        self.data.read().shape()
    }

    /// Returns the number of elements.
    pub fn numel(&self) -> usize {
        self.data.read().numel()
    }

    /// Returns whether this parameter requires gradients.
    pub fn requires_grad(&self) -> bool {
        self.data.read().requires_grad()
    }

    /// Returns the gradient if available.
    pub fn grad(&self) -> Option<ArrayD<f32>> {
        self.data.read().grad()
    }

    /// Zeros the gradient.
    pub fn zero_grad(&self) {
        self.data.read().zero_grad();
    }

    /// Replaces the parameter data, dropping any recorded gradient.
    ///
    /// Used by optimizers to update weights.
    pub fn update_data(&self, new_data: ArrayD<f32>) {
        let mut guard = self.data.write();
        let requires_grad = guard.requires_grad();
        *guard = Variable::new(new_data, requires_grad);
    }

    /// Applies a function to the parameter data.
    pub fn apply_update<F>(&self, f: F)
    where
        F: FnOnce(&ArrayD<f32>) -> ArrayD<f32>,
    {
        let current = self.data();
        let updated = f(&current);
        self.update_data(updated);
    }
}

impl std::fmt::Debug for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("shape", &self.shape())
            .field("requires_grad", &self.requires_grad())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

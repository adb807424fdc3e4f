//! Activation Modules - Non-linear Activation Functions
//!
//! Activation functions as modules for use in `Sequential` and the
//! hyperprior transforms.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use hific_autograd::{Result, Variable};

use crate::module::Module;

// =============================================================================
// ReLU
// =============================================================================

/// Applies the rectified linear unit function element-wise.
///
/// ReLU(x) = max(0, x)
#[derive(Debug, Clone, Copy, Default)]
pub struct ReLU;

impl ReLU {
    /// Creates a new ReLU activation.
    pub fn new() -> Self {
        Self
    }
}

impl Module for ReLU {
    fn forward(&self, input: &Variable) -> Result<Variable> {
        Ok(input.relu())
    }

    fn name(&self) -> &'static str {
        "ReLU"
    }
}

// =============================================================================
// Softplus
// =============================================================================

/// Applies the softplus function element-wise.
///
/// Softplus(x) = ln(1 + e^x), a smooth non-negative map used to keep
/// predicted scales positive.
#[derive(Debug, Clone, Copy, Default)]
pub struct Softplus;

impl Softplus {
    /// Creates a new Softplus activation.
    pub fn new() -> Self {
        Self
    }
}

impl Module for Softplus {
    fn forward(&self, input: &Variable) -> Result<Variable> {
        Ok(input.softplus())
    }

    fn name(&self) -> &'static str {
        "Softplus"
    }
}

// =============================================================================
// Tests
// =============================================================================

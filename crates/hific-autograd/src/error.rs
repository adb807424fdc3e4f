//! Error Types - Autograd Error Handling
//!
//! Shape and dimension failures raised while building the computational
//! graph. Backward passes never fail: every shape they see was validated
//! when the forward node was recorded.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// The main error type for autograd operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AutogradError {
    /// Shape mismatch between tensors.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// The expected shape.
        expected: Vec<usize>,
        /// The actual shape.
        actual: Vec<usize>,
    },

    /// Broadcasting failed between shapes.
    #[error("Cannot broadcast shapes {shape1:?} and {shape2:?}")]
    BroadcastError {
        /// The first shape.
        shape1: Vec<usize>,
        /// The second shape.
        shape2: Vec<usize>,
    },

    /// Tensor has the wrong number of dimensions for an operation.
    #[error("Invalid dimension: {op} expects {expected} dimensions, got {actual}")]
    InvalidDimension {
        /// Operation that rejected the tensor.
        op: &'static str,
        /// Required number of dimensions.
        expected: usize,
        /// Number of dimensions of the tensor.
        actual: usize,
    },

    /// Invalid operation for the given tensor.
    #[error("Invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

// =============================================================================
// Result Type
// =============================================================================

/// A specialized Result type for autograd operations.
pub type Result<T> = core::result::Result<T, AutogradError>;

// =============================================================================
// Helper Functions
// =============================================================================

impl AutogradError {
    /// Creates a new shape mismatch error.
    #[must_use]
    pub fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    /// Creates a new broadcast error.
    #[must_use]
    pub fn broadcast(shape1: &[usize], shape2: &[usize]) -> Self {
        Self::BroadcastError {
            shape1: shape1.to_vec(),
            shape2: shape2.to_vec(),
        }
    }

    /// Creates a new invalid dimension error.
    #[must_use]
    pub fn invalid_dimension(op: &'static str, expected: usize, actual: usize) -> Self {
        Self::InvalidDimension {
            op,
            expected,
            actual,
        }
    }

    /// Creates a new invalid operation error.
    #[must_use]
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

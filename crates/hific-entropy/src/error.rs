//! Error Types - Entropy Model Errors
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use hific_autograd::AutogradError;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised by the entropy models.
///
/// Numerical edge cases (vanishing likelihoods, saturated CDFs, tiny
/// scales) are handled by clamping and never reported here.
#[derive(Error, Debug)]
pub enum EntropyError {
    /// Quantization mode string other than `noise` or `quantize`.
    #[error("Unsupported quantization mode: {0:?} (expected \"noise\" or \"quantize\")")]
    UnsupportedMode(String),

    /// Configuration rejected by validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Tensor channel count differs from the configured one.
    #[error("Channel mismatch: expected {expected} channels, got {actual}")]
    ChannelMismatch {
        /// Configured channel count.
        expected: usize,
        /// Channel count of the input.
        actual: usize,
    },

    /// Tensor does not have the layout an operation requires.
    #[error("Invalid shape: expected {expected}, got {actual:?}")]
    InvalidShape {
        /// Description of the required layout.
        expected: &'static str,
        /// Actual shape.
        actual: Vec<usize>,
    },

    /// Failure in an underlying tensor operation.
    #[error(transparent)]
    Autograd(#[from] AutogradError),

    /// Malformed TOML configuration.
    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    /// Configuration could not be serialized.
    #[error(transparent)]
    TomlSerialize(#[from] toml::ser::Error),

    /// File I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for entropy model operations.
pub type EntropyResult<T> = Result<T, EntropyError>;

impl EntropyError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Creates an invalid shape error.
    pub fn invalid_shape(expected: &'static str, actual: &[usize]) -> Self {
        Self::InvalidShape {
            expected,
            actual: actual.to_vec(),
        }
    }
}

/// Splits an (N, C, H, W) shape, rejecting any other rank.
pub(crate) fn image_dims(shape: &[usize]) -> EntropyResult<(usize, usize, usize, usize)> {
    match *shape {
        [n, c, h, w] => Ok((n, c, h, w)),
        _ => Err(EntropyError::invalid_shape("(N, C, H, W)", shape)),
    }
}

// =============================================================================
// Tests
// =============================================================================

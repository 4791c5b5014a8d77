//! Error types for grid, deformation and warp operations.
//!
//! Structural violations (wrong shapes, wrong deformation mode) are reported
//! immediately and never recovered from inside the library.

use thiserror::Error;

/// Main error type for core operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Array or grid sizes disagree.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Malformed array or knot specification.
    #[error("Shape error: {0}")]
    Shape(String),

    /// Operation requires the other deformation mode.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Input violates a documented precondition.
    #[error("Precondition violated: {0}")]
    Precondition(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create a shape error.
    pub fn shape(msg: impl Into<String>) -> Self {
        Self::Shape(msg.into())
    }

    /// Create a shape mismatch error from two shapes.
    pub fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a precondition error.
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Whether this error reports a shape problem.
    pub fn is_shape_error(&self) -> bool {
        matches!(self, Self::ShapeMismatch { .. } | Self::Shape(_))
    }
}

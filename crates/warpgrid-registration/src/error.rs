//! Error types for registration operations.
//!
//! Shape and mode violations come from `warpgrid-core` and are wrapped
//! unchanged. Solver non-convergence is never an error here; it is reported
//! through status flags and a `tracing::warn!` event instead.

use thiserror::Error;
use warpgrid_core::CoreError;

/// Main error type for registration operations.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// Shape or deformation-mode error from the core types.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Input violates a documented precondition.
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Dimension mismatch.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Numerical instability detected.
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    /// A cancellation token was triggered.
    #[error("Registration cancelled")]
    Cancelled,
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

impl RegistrationError {
    /// Create a precondition error.
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a dimension mismatch error.
    pub fn dimension_mismatch(msg: impl Into<String>) -> Self {
        Self::DimensionMismatch(msg.into())
    }

    /// Create a numerical instability error.
    pub fn numerical_instability(msg: impl Into<String>) -> Self {
        Self::NumericalInstability(msg.into())
    }

    /// Create a shape mismatch error.
    pub fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Self::Core(CoreError::shape_mismatch(expected, actual))
    }

    pub fn is_shape_error(&self) -> bool {
        matches!(self, Self::Core(e) if e.is_shape_error())
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::Core(CoreError::InvalidState(_)))
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_) | Self::Core(CoreError::Precondition(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistrationError::precondition("need 4 points");
        assert_eq!(err.to_string(), "Precondition violated: need 4 points");
        assert!(err.is_precondition());
    }

    #[test]
    fn test_core_errors_pass_through() {
        let err: RegistrationError = CoreError::invalid_state("raw").into();
        assert!(err.is_invalid_state());
        assert_eq!(err.to_string(), "Invalid state: raw");

        let err = RegistrationError::shape_mismatch(&[10, 10], &[5, 5]);
        assert!(err.is_shape_error());
        assert!(err.to_string().contains("expected [10, 10]"));
    }
}

//! Error types for trajectory optimization operations.

use thiserror::Error;

/// Errors that can occur while building or driving a trajectory optimizer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrajError {
    /// A matrix or vector had the wrong dimensions.
    #[error("dimension mismatch in {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Which quantity was mis-sized.
        what: String,
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },

    /// A knot-time step was zero, negative, or non-finite.
    #[error("invalid timestep at knot {knot}: {dt} (must be positive and finite)")]
    InvalidTimestep {
        /// Knot index of the offending step.
        knot: usize,
        /// The offending step length.
        dt: f64,
    },

    /// Fewer than two knot points.
    #[error("horizon too short: {0} knot points (need at least 2)")]
    HorizonTooShort(usize),

    /// Invalid configuration value.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// The requested operation is not supported by this constraint variant.
    #[error("unsupported operation: {what}")]
    Unsupported {
        /// Description of the unsupported operation.
        what: String,
    },

    /// Backward-pass regularization exceeded its cap without recovering a
    /// positive-definite action-value Hessian.
    #[error("regularization exhausted at rho = {rho:.3e}")]
    RegularizationMax {
        /// The regularization value at failure.
        rho: f64,
    },
}

impl TrajError {
    /// Create a dimension-mismatch error.
    #[must_use]
    pub fn dims(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }

    /// Create an invalid-configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an unsupported-operation error.
    #[must_use]
    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::Unsupported { what: what.into() }
    }

    /// Check if this is an unsupported-operation error.
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    /// Check if this is a regularization failure.
    #[must_use]
    pub fn is_regularization_max(&self) -> bool {
        matches!(self, Self::RegularizationMax { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrajError::dims("Quu", 3, 2);
        assert!(err.to_string().contains("Quu"));
        assert!(err.to_string().contains("expected 3"));

        let err = TrajError::InvalidTimestep { knot: 7, dt: -0.1 };
        assert!(err.to_string().contains("knot 7"));

        let err = TrajError::RegularizationMax { rho: 1e8 };
        assert!(err.to_string().contains("1.000e8"));
    }

    #[test]
    fn test_error_predicates() {
        let err = TrajError::unsupported("stage jacobian of a coupled constraint");
        assert!(err.is_unsupported());
        assert!(!err.is_regularization_max());

        let err = TrajError::RegularizationMax { rho: 1.0 };
        assert!(err.is_regularization_max());
        assert!(!err.is_unsupported());
    }
}

//! Status and mode enums shared between the solver core and its callers.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Termination status of an iLQR solve.
///
/// The core itself only ever reports `Unsolved`, the two rollout limit
/// statuses, and `RegularizationMax`. `Converged` is set by the outer loop
/// when it accepts a step that meets its termination criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum SolveStatus {
    /// No terminal condition reached yet.
    #[default]
    Unsolved,
    /// A rollout produced a state exceeding the configured infinity-norm
    /// bound (or NaN).
    StateLimit,
    /// A rollout produced a control exceeding the configured infinity-norm
    /// bound (or NaN).
    ControlLimit,
    /// Backward-pass regularization hit its cap without recovering a
    /// positive-definite action-value Hessian.
    RegularizationMax,
    /// The outer loop accepted a solution.
    Converged,
}

impl SolveStatus {
    /// Whether this status terminates the solve.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Unsolved)
    }
}

/// Which quantity the backward pass regularizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RegularizationType {
    /// Add `rho * I` to `Quu` (with an optional Cholesky definiteness
    /// check). The common choice.
    #[default]
    Control,
    /// Add `rho * B'B` to `Quu` and `rho * B'A` to `Qux`, regularizing the
    /// state trajectory instead of the control directly.
    State,
}

/// Sense of a constraint: equalities are `c = 0`, inequalities use the
/// convention `c <= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConstraintSense {
    /// `c(x, u) = 0`.
    Equality,
    /// `c(x, u) <= 0`.
    Inequality,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminal() {
        assert!(!SolveStatus::Unsolved.is_terminal());
        assert!(SolveStatus::StateLimit.is_terminal());
        assert!(SolveStatus::ControlLimit.is_terminal());
        assert!(SolveStatus::RegularizationMax.is_terminal());
        assert!(SolveStatus::Converged.is_terminal());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(SolveStatus::default(), SolveStatus::Unsolved);
        assert_eq!(RegularizationType::default(), RegularizationType::Control);
    }
}

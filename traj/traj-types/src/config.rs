//! Solver configuration.

use crate::status::RegularizationType;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for the iLQR core.
///
/// Groups the rollout runaway limits, the backward-pass regularization
/// policy, and the adaptive-regularization schedule. All values have
/// sensible defaults; use the builder-style setters to override.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IlqrConfig {
    /// Rollout abort threshold on the state infinity norm.
    pub max_state_value: f64,

    /// Rollout abort threshold on the control infinity norm.
    pub max_control_value: f64,

    /// If true, test `Quu + rho*I` for positive definiteness via Cholesky
    /// in the `Control` regularization branch and restart the backward pass
    /// on failure. The `State` branch never pre-checks.
    pub bp_reg: bool,

    /// Which regularization form the backward pass applies.
    pub bp_reg_type: RegularizationType,

    /// Persist the per-knot cost-to-go (`P`, `p`) and the per-knot expected
    /// reduction contributions for diagnostics.
    pub save_ctg: bool,

    /// Initial regularization value.
    pub rho_initial: f64,

    /// Regularization floor: values driven below this on decrease snap to
    /// zero; increases from zero land here.
    pub rho_min: f64,

    /// Regularization cap. Needing more than this is a terminal failure.
    pub rho_max: f64,

    /// Multiplicative regularization update factor. Repeated increases
    /// compound the effective rate, so growth is super-linear under
    /// consecutive failures.
    pub rho_factor: f64,
}

impl Default for IlqrConfig {
    fn default() -> Self {
        Self {
            max_state_value: 1.0e8,
            max_control_value: 1.0e8,
            bp_reg: false,
            bp_reg_type: RegularizationType::Control,
            save_ctg: false,
            rho_initial: 0.0,
            rho_min: 1.0e-8,
            rho_max: 1.0e8,
            rho_factor: 1.6,
        }
    }
}

impl IlqrConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a reason string if any limit is non-positive or non-finite,
    /// if the regularization schedule is inconsistent (`rho_min > rho_max`,
    /// `rho_initial` outside `[0, rho_max]`), or if `rho_factor <= 1`.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.max_state_value > 0.0) || !(self.max_control_value > 0.0) {
            return Err("rollout limits must be positive".to_string());
        }
        if !(self.rho_min > 0.0) || !self.rho_max.is_finite() || self.rho_min > self.rho_max {
            return Err(format!(
                "regularization range [{}, {}] is invalid",
                self.rho_min, self.rho_max
            ));
        }
        if self.rho_initial < 0.0 || self.rho_initial > self.rho_max {
            return Err(format!(
                "rho_initial {} outside [0, {}]",
                self.rho_initial, self.rho_max
            ));
        }
        if !(self.rho_factor > 1.0) {
            return Err(format!("rho_factor {} must exceed 1", self.rho_factor));
        }
        Ok(())
    }

    /// Set the rollout state limit.
    #[must_use]
    pub fn max_state_value(mut self, limit: f64) -> Self {
        self.max_state_value = limit;
        self
    }

    /// Set the rollout control limit.
    #[must_use]
    pub fn max_control_value(mut self, limit: f64) -> Self {
        self.max_control_value = limit;
        self
    }

    /// Enable the backward-pass definiteness check.
    #[must_use]
    pub fn with_bp_reg(mut self) -> Self {
        self.bp_reg = true;
        self
    }

    /// Select the regularization form.
    #[must_use]
    pub fn bp_reg_type(mut self, kind: RegularizationType) -> Self {
        self.bp_reg_type = kind;
        self
    }

    /// Persist per-knot cost-to-go diagnostics.
    #[must_use]
    pub fn with_saved_ctg(mut self) -> Self {
        self.save_ctg = true;
        self
    }

    /// Set the regularization schedule in one call.
    #[must_use]
    pub fn regularization(mut self, initial: f64, min: f64, max: f64, factor: f64) -> Self {
        self.rho_initial = initial;
        self.rho_min = min;
        self.rho_max = max;
        self.rho_factor = factor;
        self
    }
}

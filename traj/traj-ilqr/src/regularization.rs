//! Adaptive scalar regularization for the backward pass.

use traj_types::IlqrConfig;

/// Scalar regularization state with rate hysteresis.
///
/// The controller tracks the current value `rho` and a multiplicative `rate`.
/// Each increase first grows the rate, then applies it, so consecutive
/// failures amplify growth super-linearly; each decrease shrinks the rate
/// symmetrically. Values driven below `rho_min` on a decrease snap to zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Regularization {
    rho: f64,
    rate: f64,
}

impl Regularization {
    /// Initialize from the configured starting value with a unit rate.
    #[must_use]
    pub fn new(cfg: &IlqrConfig) -> Self {
        Self {
            rho: cfg.rho_initial,
            rate: 1.0,
        }
    }

    /// Current regularization value.
    #[must_use]
    pub fn rho(&self) -> f64 {
        self.rho
    }

    /// Current multiplicative rate.
    #[must_use]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Whether the value has saturated at the configured cap.
    #[must_use]
    pub fn at_max(&self, cfg: &IlqrConfig) -> bool {
        self.rho >= cfg.rho_max
    }

    /// Grow the regularization: `rate <- max(rate * factor, factor)`,
    /// `rho <- min(max(rho * rate, rho_min), rho_max)`.
    pub fn increase(&mut self, cfg: &IlqrConfig) {
        self.rate = (self.rate * cfg.rho_factor).max(cfg.rho_factor);
        self.rho = (self.rho * self.rate).max(cfg.rho_min).min(cfg.rho_max);
    }

    /// Shrink the regularization: `rate <- min(rate / factor, 1 / factor)`,
    /// `rho <- rho * rate`, snapping to zero below `rho_min`.
    pub fn decrease(&mut self, cfg: &IlqrConfig) {
        self.rate = (self.rate / cfg.rho_factor).min(1.0 / cfg.rho_factor);
        self.rho *= self.rate;
        if self.rho < cfg.rho_min {
            self.rho = 0.0;
        }
    }
}

//! Dynamics model oracle.
//!
//! The solver never differentiates or integrates anything itself: it consumes
//! a discrete-time transition map `x_{k+1} = f(x_k, u_k, t_k, dt_k)` and its
//! Jacobians through the [`DiscreteDynamics`] trait, writing results into
//! caller-owned buffers. The [`Integrator`] tag is passed through opaquely so
//! a model backed by continuous dynamics can pick its explicit scheme without
//! the solver knowing.
//!
//! The linearization convention matches the usual transition-derivative form:
//! `dx_{k+1} ~= A dx_k + B du_k` with `A = df/dx` (n x n) and `B = df/du`
//! (n x m).

use nalgebra::{DMatrix, DVector};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Explicit integration scheme tag, forwarded to the model unchanged.
///
/// Implicit schemes are deliberately absent: the core only drives explicit
/// transition maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum Integrator {
    /// Forward Euler.
    Euler,
    /// Kutta's third-order method.
    #[default]
    RungeKutta3,
    /// Classic 4th-order Runge-Kutta.
    RungeKutta4,
}

/// Discrete-time dynamics oracle.
///
/// All outputs are written into caller-owned buffers sized `n = state_dim()`
/// and `m = control_dim()`; implementations must not resize them. Models that
/// discretize continuous dynamics should honor the [`Integrator`] tag; models
/// that are natively discrete (e.g. an exact zero-order-hold map) may ignore
/// it.
pub trait DiscreteDynamics {
    /// State dimension `n`.
    fn state_dim(&self) -> usize;

    /// Control dimension `m`.
    fn control_dim(&self) -> usize;

    /// Evaluate the transition map: `x_next = f(x, u, t, dt)`.
    fn discrete_dynamics(
        &self,
        x_next: &mut DVector<f64>,
        ir: Integrator,
        x: &DVector<f64>,
        u: &DVector<f64>,
        t: f64,
        dt: f64,
    );

    /// Evaluate the transition Jacobians `a = df/dx` (n x n) and
    /// `b = df/du` (n x m) at `(x, u, t)`.
    fn discrete_jacobian(
        &self,
        a: &mut DMatrix<f64>,
        b: &mut DMatrix<f64>,
        ir: Integrator,
        x: &DVector<f64>,
        u: &DVector<f64>,
        t: f64,
        dt: f64,
    );

    /// State difference `dx = x_new (-) x_old`.
    ///
    /// The default is plain subtraction, correct for Euclidean state spaces.
    /// Models whose states live on a manifold override this with the
    /// appropriate local-coordinate difference.
    fn state_diff(&self, dx: &mut DVector<f64>, x_new: &DVector<f64>, x_old: &DVector<f64>) {
        dx.copy_from(x_new);
        *dx -= x_old;
    }
}

//! Built-in reference models.
//!
//! Small analytic models used by the test suite and by downstream examples:
//! a generic linear map, the exact double integrator, and a forced pendulum
//! (the standard nonlinear smoke model). The first two are natively discrete
//! and ignore the integrator tag; the pendulum discretizes its continuous
//! dynamics with the requested explicit scheme and propagates analytic
//! Jacobians through the same stage structure.

use nalgebra::{DMatrix, DVector, Matrix2, Vector2};
use traj_types::TrajError;

use crate::model::{DiscreteDynamics, Integrator};

/// Time-invariant linear discrete dynamics `x_next = A x + B u`.
///
/// The matrices *are* the discrete map: the integrator tag and step length
/// are ignored, so the caller is responsible for building `A`/`B` at the
/// knot spacing the problem uses.
#[derive(Debug, Clone)]
pub struct LinearModel {
    a: DMatrix<f64>,
    b: DMatrix<f64>,
}

impl LinearModel {
    /// Build from the discrete transition matrices.
    ///
    /// # Errors
    ///
    /// Rejects a non-square `A` or a `B` with a different row count.
    pub fn new(a: DMatrix<f64>, b: DMatrix<f64>) -> Result<Self, TrajError> {
        if a.nrows() != a.ncols() {
            return Err(TrajError::dims("A", a.nrows(), a.ncols()));
        }
        if b.nrows() != a.nrows() {
            return Err(TrajError::dims("B rows", a.nrows(), b.nrows()));
        }
        Ok(Self { a, b })
    }
}

impl DiscreteDynamics for LinearModel {
    fn state_dim(&self) -> usize {
        self.a.nrows()
    }

    fn control_dim(&self) -> usize {
        self.b.ncols()
    }

    fn discrete_dynamics(
        &self,
        x_next: &mut DVector<f64>,
        _ir: Integrator,
        x: &DVector<f64>,
        u: &DVector<f64>,
        _t: f64,
        _dt: f64,
    ) {
        x_next.gemv(1.0, &self.a, x, 0.0);
        x_next.gemv(1.0, &self.b, u, 1.0);
    }

    fn discrete_jacobian(
        &self,
        a: &mut DMatrix<f64>,
        b: &mut DMatrix<f64>,
        _ir: Integrator,
        _x: &DVector<f64>,
        _u: &DVector<f64>,
        _t: f64,
        _dt: f64,
    ) {
        a.copy_from(&self.a);
        b.copy_from(&self.b);
    }
}

/// Exact zero-order-hold double integrator in `dim` independent axes.
///
/// State layout `[positions..., velocities...]` (n = 2*dim), control is the
/// acceleration per axis (m = dim). The hold map is exact, so the integrator
/// tag is ignored.
#[derive(Debug, Clone, Copy)]
pub struct DoubleIntegrator {
    dim: usize,
}

impl DoubleIntegrator {
    /// A double integrator with `dim` position/velocity pairs.
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl DiscreteDynamics for DoubleIntegrator {
    fn state_dim(&self) -> usize {
        2 * self.dim
    }

    fn control_dim(&self) -> usize {
        self.dim
    }

    fn discrete_dynamics(
        &self,
        x_next: &mut DVector<f64>,
        _ir: Integrator,
        x: &DVector<f64>,
        u: &DVector<f64>,
        _t: f64,
        dt: f64,
    ) {
        let d = self.dim;
        for i in 0..d {
            x_next[i] = x[i] + dt * x[d + i] + 0.5 * dt * dt * u[i];
            x_next[d + i] = x[d + i] + dt * u[i];
        }
    }

    fn discrete_jacobian(
        &self,
        a: &mut DMatrix<f64>,
        b: &mut DMatrix<f64>,
        _ir: Integrator,
        _x: &DVector<f64>,
        _u: &DVector<f64>,
        _t: f64,
        dt: f64,
    ) {
        let d = self.dim;
        a.fill_with_identity();
        b.fill(0.0);
        for i in 0..d {
            a[(i, d + i)] = dt;
            b[(i, i)] = 0.5 * dt * dt;
            b[(d + i, i)] = dt;
        }
    }
}

/// Forced damped pendulum: `theta'' = (u - b theta' - m g l sin(theta)) / (m l^2)`.
///
/// State `[theta, theta_dot]`, scalar control torque. The continuous
/// dynamics are discretized with the requested explicit scheme; Jacobians
/// are computed analytically by chain-ruling through the same stages, so
/// they match the discrete map to machine precision.
#[derive(Debug, Clone, Copy)]
pub struct Pendulum {
    mass: f64,
    length: f64,
    damping: f64,
    gravity: f64,
}

impl Default for Pendulum {
    fn default() -> Self {
        Self {
            mass: 1.0,
            length: 0.5,
            damping: 0.1,
            gravity: 9.81,
        }
    }
}

impl Pendulum {
    /// A pendulum with explicit physical parameters.
    #[must_use]
    pub fn new(mass: f64, length: f64, damping: f64, gravity: f64) -> Self {
        Self {
            mass,
            length,
            damping,
            gravity,
        }
    }

    /// Continuous dynamics.
    fn f(&self, x: Vector2<f64>, u: f64) -> Vector2<f64> {
        let inertia = self.mass * self.length * self.length;
        let torque = u
            - self.damping * x[1]
            - self.mass * self.gravity * self.length * x[0].sin();
        Vector2::new(x[1], torque / inertia)
    }

    /// Continuous state Jacobian `df/dx`.
    fn jx(&self, x: Vector2<f64>) -> Matrix2<f64> {
        let inertia = self.mass * self.length * self.length;
        Matrix2::new(
            0.0,
            1.0,
            -self.gravity / self.length * x[0].cos(),
            -self.damping / inertia,
        )
    }

    /// Continuous control Jacobian `df/du` (constant).
    fn bc(&self) -> Vector2<f64> {
        Vector2::new(0.0, 1.0 / (self.mass * self.length * self.length))
    }

    /// One discrete step on stack-allocated state.
    fn step(&self, ir: Integrator, x: Vector2<f64>, u: f64, dt: f64) -> Vector2<f64> {
        match ir {
            Integrator::Euler => x + dt * self.f(x, u),
            Integrator::RungeKutta3 => {
                let k1 = self.f(x, u);
                let k2 = self.f(x + 0.5 * dt * k1, u);
                let k3 = self.f(x - dt * k1 + 2.0 * dt * k2, u);
                x + dt / 6.0 * (k1 + 4.0 * k2 + k3)
            }
            Integrator::RungeKutta4 => {
                let k1 = self.f(x, u);
                let k2 = self.f(x + 0.5 * dt * k1, u);
                let k3 = self.f(x + 0.5 * dt * k2, u);
                let k4 = self.f(x + dt * k3, u);
                x + dt / 6.0 * (k1 + 2.0 * k2 + 2.0 * k3 + k4)
            }
        }
    }

    /// Discrete Jacobians by stage-wise chain rule.
    fn step_jacobian(
        &self,
        ir: Integrator,
        x: Vector2<f64>,
        u: f64,
        dt: f64,
    ) -> (Matrix2<f64>, Vector2<f64>) {
        let eye = Matrix2::identity();
        let bc = self.bc();
        match ir {
            Integrator::Euler => (eye + dt * self.jx(x), dt * bc),
            Integrator::RungeKutta3 => {
                let k1 = self.f(x, u);
                let x2 = x + 0.5 * dt * k1;
                let k2 = self.f(x2, u);
                let x3 = x - dt * k1 + 2.0 * dt * k2;

                let dk1_dx = self.jx(x);
                let dk1_du = bc;
                let j2 = self.jx(x2);
                let dk2_dx = j2 * (eye + 0.5 * dt * dk1_dx);
                let dk2_du = j2 * (0.5 * dt * dk1_du) + bc;
                let j3 = self.jx(x3);
                let dk3_dx = j3 * (eye - dt * dk1_dx + 2.0 * dt * dk2_dx);
                let dk3_du = j3 * (2.0 * dt * dk2_du - dt * dk1_du) + bc;

                (
                    eye + dt / 6.0 * (dk1_dx + 4.0 * dk2_dx + dk3_dx),
                    dt / 6.0 * (dk1_du + 4.0 * dk2_du + dk3_du),
                )
            }
            Integrator::RungeKutta4 => {
                let k1 = self.f(x, u);
                let x2 = x + 0.5 * dt * k1;
                let k2 = self.f(x2, u);
                let x3 = x + 0.5 * dt * k2;
                let k3 = self.f(x3, u);
                let x4 = x + dt * k3;

                let dk1_dx = self.jx(x);
                let dk1_du = bc;
                let j2 = self.jx(x2);
                let dk2_dx = j2 * (eye + 0.5 * dt * dk1_dx);
                let dk2_du = j2 * (0.5 * dt * dk1_du) + bc;
                let j3 = self.jx(x3);
                let dk3_dx = j3 * (eye + 0.5 * dt * dk2_dx);
                let dk3_du = j3 * (0.5 * dt * dk2_du) + bc;
                let j4 = self.jx(x4);
                let dk4_dx = j4 * (eye + dt * dk3_dx);
                let dk4_du = j4 * (dt * dk3_du) + bc;

                (
                    eye + dt / 6.0 * (dk1_dx + 2.0 * dk2_dx + 2.0 * dk3_dx + dk4_dx),
                    dt / 6.0 * (dk1_du + 2.0 * dk2_du + 2.0 * dk3_du + dk4_du),
                )
            }
        }
    }
}

impl DiscreteDynamics for Pendulum {
    fn state_dim(&self) -> usize {
        2
    }

    fn control_dim(&self) -> usize {
        1
    }

    fn discrete_dynamics(
        &self,
        x_next: &mut DVector<f64>,
        ir: Integrator,
        x: &DVector<f64>,
        u: &DVector<f64>,
        _t: f64,
        dt: f64,
    ) {
        let next = self.step(ir, Vector2::new(x[0], x[1]), u[0], dt);
        x_next[0] = next[0];
        x_next[1] = next[1];
    }

    fn discrete_jacobian(
        &self,
        a: &mut DMatrix<f64>,
        b: &mut DMatrix<f64>,
        ir: Integrator,
        x: &DVector<f64>,
        u: &DVector<f64>,
        _t: f64,
        dt: f64,
    ) {
        let (ad, bd) = self.step_jacobian(ir, Vector2::new(x[0], x[1]), u[0], dt);
        for i in 0..2 {
            for j in 0..2 {
                a[(i, j)] = ad[(i, j)];
            }
            b[(i, 0)] = bd[i];
        }
    }
}

//! Coupled dynamics (defect) constraint.

use nalgebra::{DMatrix, DVector};

use crate::model::{DiscreteDynamics, Integrator};

/// Equality constraint coupling adjacent knots:
/// `f(x_{k-1}, u_{k-1}, t_{k-1}, dt) - x_k = 0`.
///
/// Defined only for `k >= 1`. The stage (single-knot) Jacobian is
/// unsupported; the direct solver consumes the coupled Jacobian
/// `[A_{k-1} | B_{k-1} | -I]` through `jacobian_copy`. Owns preallocated
/// `A`/`B` scratch so scattering performs no allocation.
#[derive(Debug, Clone)]
pub struct DynamicsConstraint {
    n: usize,
    m: usize,
    a: DMatrix<f64>,
    b: DMatrix<f64>,
}

impl DynamicsConstraint {
    /// A defect constraint for dimensions `(n, m)`.
    #[must_use]
    pub fn new(n: usize, m: usize) -> Self {
        Self {
            n,
            m,
            a: DMatrix::zeros(n, n),
            b: DMatrix::zeros(n, m),
        }
    }

    /// Number of scalar residuals (the state dimension).
    #[must_use]
    pub fn len(&self) -> usize {
        self.n
    }

    /// State dimension this constraint was built for.
    #[must_use]
    pub fn state_dim(&self) -> usize {
        self.n
    }

    /// Control dimension this constraint was built for.
    #[must_use]
    pub fn control_dim(&self) -> usize {
        self.m
    }

    pub(crate) fn evaluate(
        &self,
        c: &mut DVector<f64>,
        model: &dyn DiscreteDynamics,
        ir: Integrator,
        xs: &[DVector<f64>],
        us: &[DVector<f64>],
        ts: &[f64],
        k: usize,
    ) {
        debug_assert!(k >= 1, "dynamics constraint is undefined at the first knot");
        let dt = ts[k] - ts[k - 1];
        model.discrete_dynamics(c, ir, &xs[k - 1], &us[k - 1], ts[k - 1], dt);
        *c -= &xs[k];
    }

    pub(crate) fn scatter_jacobian(
        &mut self,
        d: &mut DMatrix<f64>,
        model: &dyn DiscreteDynamics,
        ir: Integrator,
        xs: &[DVector<f64>],
        us: &[DVector<f64>],
        ts: &[f64],
        k: usize,
        c_row: usize,
        x_cols: &[usize],
        u_cols: &[usize],
    ) {
        debug_assert!(k >= 1, "dynamics constraint is undefined at the first knot");
        let dt = ts[k] - ts[k - 1];
        model.discrete_jacobian(
            &mut self.a,
            &mut self.b,
            ir,
            &xs[k - 1],
            &us[k - 1],
            ts[k - 1],
            dt,
        );
        d.view_mut((c_row, x_cols[k - 1]), (self.n, self.n))
            .copy_from(&self.a);
        d.view_mut((c_row, u_cols[k - 1]), (self.n, self.m))
            .copy_from(&self.b);
        for i in 0..self.n {
            d[(c_row + i, x_cols[k] + i)] = -1.0;
        }
    }

    pub(crate) fn component_label(&self, row: usize) -> String {
        format!("dynamics[{row}]")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::models::DoubleIntegrator;
    use approx::assert_relative_eq;

    #[test]
    fn test_defect_vanishes_on_consistent_trajectory() {
        let model = DoubleIntegrator::new(1);
        let ts = vec![0.0, 0.1, 0.2];
        let us = vec![
            DVector::from_vec(vec![1.0]),
            DVector::from_vec(vec![-1.0]),
        ];
        // Roll the dynamics forward so the trajectory is consistent.
        let mut xs = vec![DVector::from_vec(vec![0.0, 0.0])];
        for k in 0..2 {
            let mut x_next = DVector::zeros(2);
            model.discrete_dynamics(
                &mut x_next,
                Integrator::RungeKutta4,
                &xs[k],
                &us[k],
                ts[k],
                0.1,
            );
            xs.push(x_next);
        }

        let con = DynamicsConstraint::new(2, 1);
        let mut c = DVector::zeros(2);
        con.evaluate(&mut c, &model, Integrator::RungeKutta4, &xs, &us, &ts, 1);
        assert_relative_eq!(c.norm(), 0.0);
        con.evaluate(&mut c, &model, Integrator::RungeKutta4, &xs, &us, &ts, 2);
        assert_relative_eq!(c.norm(), 0.0);

        // Perturb x_2: the defect at k = 2 picks up the negative perturbation.
        let mut xs_bad = xs.clone();
        xs_bad[2][0] += 0.5;
        con.evaluate(&mut c, &model, Integrator::RungeKutta4, &xs_bad, &us, &ts, 2);
        assert_relative_eq!(c[0], -0.5);
    }

    #[test]
    fn test_scatter_writes_coupled_blocks() {
        let model = DoubleIntegrator::new(1);
        let ts = vec![0.0, 0.1];
        let xs = vec![DVector::zeros(2), DVector::zeros(2)];
        let us = vec![DVector::zeros(1)];

        // Variable layout [x_0 | u_0 | x_1]: columns 0, 2, 3.
        let mut con = DynamicsConstraint::new(2, 1);
        let mut d = DMatrix::zeros(2, 5);
        con.scatter_jacobian(
            &mut d,
            &model,
            Integrator::RungeKutta4,
            &xs,
            &us,
            &ts,
            1,
            0,
            &[0, 3],
            &[2],
        );
        // A block
        assert_relative_eq!(d[(0, 0)], 1.0);
        assert_relative_eq!(d[(0, 1)], 0.1);
        assert_relative_eq!(d[(1, 1)], 1.0);
        // B block
        assert_relative_eq!(d[(0, 2)], 0.005);
        assert_relative_eq!(d[(1, 2)], 0.1);
        // -I block
        assert_relative_eq!(d[(0, 3)], -1.0);
        assert_relative_eq!(d[(1, 4)], -1.0);
    }
}

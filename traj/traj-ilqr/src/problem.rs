//! Static problem definition.
//!
//! [`Problem`] is the immutable counterpart to [`crate::IlqrSolver`]: the
//! model and cost oracles, the constraint set, the integrator tag, the knot
//! times, and the initial state. All shape preconditions are rejected here,
//! at construction, so the solver hot loops never re-validate.

use std::fmt;
use std::ops::Range;

use nalgebra::DVector;
use traj_types::TrajError;

use crate::constraint::{Constraint, ConstraintParams, ConstraintSet};
use crate::cost::Objective;
use crate::model::{DiscreteDynamics, Integrator};

/// A discrete-time trajectory optimization problem.
pub struct Problem {
    model: Box<dyn DiscreteDynamics>,
    objective: Box<dyn Objective>,
    constraints: ConstraintSet,
    integrator: Integrator,
    ts: Vec<f64>,
    x0: DVector<f64>,
    n: usize,
    m: usize,
}

impl fmt::Debug for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Problem")
            .field("n", &self.n)
            .field("m", &self.m)
            .field("num_knots", &self.ts.len())
            .field("integrator", &self.integrator)
            .field("constraints", &self.constraints.len())
            .finish_non_exhaustive()
    }
}

impl Problem {
    /// Build a problem over explicit knot times.
    ///
    /// # Errors
    ///
    /// Rejects fewer than two knots, non-increasing or non-finite knot
    /// times, zero model dimensions, objective dimensions that disagree with
    /// the model, and a mis-sized initial state.
    pub fn new(
        model: Box<dyn DiscreteDynamics>,
        objective: Box<dyn Objective>,
        integrator: Integrator,
        ts: Vec<f64>,
        x0: DVector<f64>,
    ) -> Result<Self, TrajError> {
        let num_knots = ts.len();
        if num_knots < 2 {
            return Err(TrajError::HorizonTooShort(num_knots));
        }
        for k in 0..num_knots - 1 {
            let dt = ts[k + 1] - ts[k];
            if !(dt > 0.0) || !dt.is_finite() {
                return Err(TrajError::InvalidTimestep { knot: k, dt });
            }
        }

        let n = model.state_dim();
        let m = model.control_dim();
        if n == 0 || m == 0 {
            return Err(TrajError::invalid_config(format!(
                "degenerate dimensions n = {n}, m = {m}"
            )));
        }
        if objective.state_dim() != n {
            return Err(TrajError::dims("objective state dim", n, objective.state_dim()));
        }
        if objective.control_dim() != m {
            return Err(TrajError::dims(
                "objective control dim",
                m,
                objective.control_dim(),
            ));
        }
        if x0.len() != n {
            return Err(TrajError::dims("initial state", n, x0.len()));
        }

        Ok(Self {
            model,
            objective,
            constraints: ConstraintSet::new(n, m, num_knots),
            integrator,
            ts,
            x0,
            n,
            m,
        })
    }

    /// Build a problem over a uniform knot spacing starting at `t = 0`.
    ///
    /// # Errors
    ///
    /// Same validation as [`Problem::new`].
    pub fn with_uniform_step(
        model: Box<dyn DiscreteDynamics>,
        objective: Box<dyn Objective>,
        integrator: Integrator,
        num_knots: usize,
        dt: f64,
        x0: DVector<f64>,
    ) -> Result<Self, TrajError> {
        #[allow(clippy::cast_precision_loss)]
        let ts = (0..num_knots).map(|k| k as f64 * dt).collect();
        Self::new(model, objective, integrator, ts, x0)
    }

    /// State dimension `n`.
    #[must_use]
    pub fn state_dim(&self) -> usize {
        self.n
    }

    /// Control dimension `m`.
    #[must_use]
    pub fn control_dim(&self) -> usize {
        self.m
    }

    /// Number of knot points `N`.
    #[must_use]
    pub fn num_knots(&self) -> usize {
        self.ts.len()
    }

    /// Knot times.
    #[must_use]
    pub fn times(&self) -> &[f64] {
        &self.ts
    }

    /// Step length `dt_k = t_{k+1} - t_k`.
    #[must_use]
    pub fn dt(&self, k: usize) -> f64 {
        self.ts[k + 1] - self.ts[k]
    }

    /// Integrator tag forwarded to the model.
    #[must_use]
    pub fn integrator(&self) -> Integrator {
        self.integrator
    }

    /// Initial state.
    #[must_use]
    pub fn initial_state(&self) -> &DVector<f64> {
        &self.x0
    }

    /// The dynamics oracle.
    #[must_use]
    pub fn model(&self) -> &dyn DiscreteDynamics {
        &*self.model
    }

    /// The cost oracle.
    #[must_use]
    pub fn objective(&self) -> &dyn Objective {
        &*self.objective
    }

    /// Attached constraints.
    #[must_use]
    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    /// Attached constraints, mutably (evaluation uses member scratch).
    pub fn constraints_mut(&mut self) -> &mut ConstraintSet {
        &mut self.constraints
    }

    /// Attach a constraint over a knot range.
    ///
    /// # Errors
    ///
    /// See [`ConstraintSet::attach`].
    pub fn attach_constraint(
        &mut self,
        constraint: Constraint,
        knots: Range<usize>,
        params: ConstraintParams,
    ) -> Result<(), TrajError> {
        self.constraints.attach(constraint, knots, params)
    }

    /// Worst constraint violation over a trajectory, with its label.
    pub fn max_violation(
        &mut self,
        xs: &[DVector<f64>],
        us: &[DVector<f64>],
    ) -> (f64, Option<String>) {
        self.constraints
            .max_violation(&*self.model, self.integrator, xs, us, &self.ts)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::cost::QuadraticCost;
    use crate::models::DoubleIntegrator;
    use nalgebra::DMatrix;

    fn quad_cost(n: usize, m: usize) -> Box<QuadraticCost> {
        Box::new(
            QuadraticCost::regulator(
                DMatrix::identity(n, n),
                DMatrix::identity(m, m),
                DMatrix::identity(n, n),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_construction_happy_path() {
        let problem = Problem::with_uniform_step(
            Box::new(DoubleIntegrator::new(1)),
            quad_cost(2, 1),
            Integrator::RungeKutta4,
            11,
            0.1,
            DVector::from_vec(vec![1.0, 0.0]),
        )
        .unwrap();
        assert_eq!(problem.state_dim(), 2);
        assert_eq!(problem.control_dim(), 1);
        assert_eq!(problem.num_knots(), 11);
        approx::assert_relative_eq!(problem.dt(3), 0.1);
    }

    #[test]
    fn test_rejects_short_horizon_and_bad_times() {
        let err = Problem::with_uniform_step(
            Box::new(DoubleIntegrator::new(1)),
            quad_cost(2, 1),
            Integrator::Euler,
            1,
            0.1,
            DVector::zeros(2),
        )
        .unwrap_err();
        assert_eq!(err, TrajError::HorizonTooShort(1));

        let err = Problem::new(
            Box::new(DoubleIntegrator::new(1)),
            quad_cost(2, 1),
            Integrator::Euler,
            vec![0.0, 0.1, 0.1],
            DVector::zeros(2),
        )
        .unwrap_err();
        assert!(matches!(err, TrajError::InvalidTimestep { knot: 1, .. }));
    }

    #[test]
    fn test_rejects_dimension_mismatches() {
        assert!(Problem::with_uniform_step(
            Box::new(DoubleIntegrator::new(1)),
            quad_cost(3, 1),
            Integrator::Euler,
            5,
            0.1,
            DVector::zeros(2),
        )
        .is_err());

        assert!(Problem::with_uniform_step(
            Box::new(DoubleIntegrator::new(1)),
            quad_cost(2, 1),
            Integrator::Euler,
            5,
            0.1,
            DVector::zeros(3),
        )
        .is_err());
    }
}

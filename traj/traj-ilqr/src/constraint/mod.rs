//! Constraint library.
//!
//! A homogeneous capability set over a closed list of constraint variants,
//! dispatched by hand over a tagged enum (the variant list is closed and the
//! call sites are hot, so no vtable). Each variant keeps precomputed active
//! index lists, making evaluation and Jacobian assembly linear in the number
//! of finite/selected components rather than in the problem dimensions.
//!
//! Stage constraints read `(x_k, u_k)`; the coupled dynamics constraint at
//! knot `k` reads `(x_{k-1}, u_{k-1}, x_k)` and is defined only for `k >= 1`.
//! Inequalities use the convention `c <= 0`.

mod bound;
mod dynamics;
mod goal;
mod norm;

pub use bound::BoundConstraint;
pub use dynamics::DynamicsConstraint;
pub use goal::GoalConstraint;
pub use norm::{NormConstraint, NormVariable};

use std::ops::Range;

use nalgebra::{DMatrix, DVector};
use traj_types::{ConstraintSense, TrajError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::model::{DiscreteDynamics, Integrator};

/// A constraint attached to the problem: one of the closed variant list.
#[derive(Debug, Clone)]
pub enum Constraint {
    /// Terminal state goal (equality, constant selection Jacobian).
    Goal(GoalConstraint),
    /// Coupled dynamics defect (equality, adjacent knots).
    Dynamics(DynamicsConstraint),
    /// Box bounds on state and control (inequality).
    Bound(BoundConstraint),
    /// Squared-norm equality on state or control components.
    Norm(NormConstraint),
}

impl Constraint {
    /// Number of scalar residual components.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Goal(c) => c.len(),
            Self::Dynamics(c) => c.len(),
            Self::Bound(c) => c.len(),
            Self::Norm(c) => c.len(),
        }
    }

    /// Whether the constraint has no components (a no-op).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Equality or inequality sense.
    #[must_use]
    pub fn sense(&self) -> ConstraintSense {
        match self {
            Self::Goal(_) | Self::Dynamics(_) | Self::Norm(_) => ConstraintSense::Equality,
            Self::Bound(_) => ConstraintSense::Inequality,
        }
    }

    /// Whether the stage Jacobian is constant (computable without a
    /// trajectory, once, via [`Constraint::init_jacobian`]).
    #[must_use]
    pub fn const_jac(&self) -> bool {
        matches!(self, Self::Goal(_) | Self::Bound(_))
    }

    /// Whether the constraint contributes to the state expansion.
    #[must_use]
    pub fn state_expansion(&self) -> bool {
        match self {
            Self::Goal(_) => true,
            Self::Dynamics(_) => false,
            Self::Bound(c) => c.has_state_rows(),
            Self::Norm(c) => c.variable() == NormVariable::State,
        }
    }

    /// Whether the constraint contributes to the control expansion.
    #[must_use]
    pub fn control_expansion(&self) -> bool {
        match self {
            Self::Goal(_) | Self::Dynamics(_) => false,
            Self::Bound(c) => c.has_control_rows(),
            Self::Norm(c) => c.variable() == NormVariable::Control,
        }
    }

    /// Whether the constraint couples adjacent knots.
    #[must_use]
    pub fn coupled_expansion(&self) -> bool {
        matches!(self, Self::Dynamics(_))
    }

    /// Whether the constraint can feed the direct solver through
    /// [`Constraint::jacobian_copy`]. True for every shipped variant; the
    /// descriptor lets callers dispatch without matching on the variant.
    #[must_use]
    pub fn direct(&self) -> bool {
        true
    }

    /// Validate this constraint against the problem dimensions.
    ///
    /// # Errors
    ///
    /// Returns a dimension mismatch naming the offending quantity.
    pub fn check_dims(&self, n: usize, m: usize) -> Result<(), TrajError> {
        match self {
            Self::Goal(c) => expect_dim("goal state dim", n, c.state_dim()),
            Self::Dynamics(c) => {
                expect_dim("dynamics state dim", n, c.state_dim())?;
                expect_dim("dynamics control dim", m, c.control_dim())
            }
            Self::Bound(c) => {
                expect_dim("bound state dim", n, c.state_dim())?;
                expect_dim("bound control dim", m, c.control_dim())
            }
            Self::Norm(c) => match c.variable() {
                NormVariable::State => expect_dim("norm state dim", n, c.var_dim()),
                NormVariable::Control => expect_dim("norm control dim", m, c.var_dim()),
            },
        }
    }

    /// Write the residuals at knot `k` into `c` (length [`Constraint::len`]).
    pub fn evaluate(
        &self,
        c: &mut DVector<f64>,
        model: &dyn DiscreteDynamics,
        ir: Integrator,
        xs: &[DVector<f64>],
        us: &[DVector<f64>],
        ts: &[f64],
        k: usize,
    ) {
        match self {
            Self::Goal(con) => con.evaluate(c, &xs[k]),
            Self::Dynamics(con) => con.evaluate(c, model, ir, xs, us, ts, k),
            Self::Bound(con) => con.evaluate(c, &xs[k], us.get(k)),
            Self::Norm(con) => con.evaluate(c, &xs[k], us.get(k)),
        }
    }

    /// Write the stage Jacobian at knot `k` into `(cx, cu)`.
    ///
    /// # Errors
    ///
    /// `Unsupported` for coupled variants, which have no single-knot
    /// Jacobian; callers dispatch on [`Constraint::coupled_expansion`].
    pub fn jacobian(
        &self,
        cx: &mut DMatrix<f64>,
        cu: &mut DMatrix<f64>,
        xs: &[DVector<f64>],
        us: &[DVector<f64>],
        k: usize,
    ) -> Result<(), TrajError> {
        match self {
            Self::Goal(con) => {
                con.init_jacobian(cx, cu);
                Ok(())
            }
            Self::Bound(con) => {
                con.init_jacobian(cx, cu);
                Ok(())
            }
            Self::Norm(con) => {
                con.jacobian(cx, cu, &xs[k], us.get(k));
                Ok(())
            }
            Self::Dynamics(_) => Err(TrajError::unsupported(
                "stage jacobian of a coupled dynamics constraint",
            )),
        }
    }

    /// Fill a constant Jacobian once, with no trajectory arguments.
    ///
    /// # Errors
    ///
    /// `Unsupported` when [`Constraint::const_jac`] is false.
    pub fn init_jacobian(
        &self,
        cx: &mut DMatrix<f64>,
        cu: &mut DMatrix<f64>,
    ) -> Result<(), TrajError> {
        match self {
            Self::Goal(con) => {
                con.init_jacobian(cx, cu);
                Ok(())
            }
            Self::Bound(con) => {
                con.init_jacobian(cx, cu);
                Ok(())
            }
            Self::Norm(_) | Self::Dynamics(_) => Err(TrajError::unsupported(
                "init_jacobian of a trajectory-dependent constraint",
            )),
        }
    }

    /// Scatter the Jacobian at knot `k` into the global matrix `d`.
    ///
    /// `c_row` is the first row of this constraint's block; `x_cols[j]` /
    /// `u_cols[j]` give the first column of knot `j`'s state/control block in
    /// the direct solver's variable ordering. Only nonzero entries are
    /// written; the caller zeroes `d`.
    ///
    /// # Errors
    ///
    /// `Unsupported` when [`Constraint::direct`] is false (no shipped
    /// variant).
    #[allow(clippy::too_many_arguments)]
    pub fn jacobian_copy(
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
    ) -> Result<(), TrajError> {
        match self {
            Self::Goal(con) => {
                con.scatter_jacobian(d, c_row, x_cols[k]);
                Ok(())
            }
            Self::Bound(con) => {
                let u_col = u_cols.get(k).copied().unwrap_or(0);
                con.scatter_jacobian(d, c_row, x_cols[k], u_col);
                Ok(())
            }
            Self::Norm(con) => {
                let u_col = u_cols.get(k).copied().unwrap_or(0);
                con.scatter_jacobian(d, c_row, x_cols[k], u_col, &xs[k], us.get(k));
                Ok(())
            }
            Self::Dynamics(con) => {
                con.scatter_jacobian(d, model, ir, xs, us, ts, k, c_row, x_cols, u_cols);
                Ok(())
            }
        }
    }

    /// Worst violation in an evaluated residual and a human-readable label.
    ///
    /// Equalities score `|c_i|`; inequalities score `max(c_i, 0)`. Returns
    /// `(0.0, "(empty)")` for a zero-length constraint.
    #[must_use]
    pub fn max_violation_info(&self, c: &DVector<f64>, k: usize) -> (f64, String) {
        if self.is_empty() {
            return (0.0, "(empty)".to_string());
        }
        let mut worst = f64::NEG_INFINITY;
        let mut worst_row = 0;
        for row in 0..self.len() {
            let v = match self.sense() {
                ConstraintSense::Equality => c[row].abs(),
                ConstraintSense::Inequality => c[row].max(0.0),
            };
            if v > worst {
                worst = v;
                worst_row = row;
            }
        }
        let label = match self {
            Self::Goal(con) => con.component_label(worst_row),
            Self::Dynamics(con) => con.component_label(worst_row),
            Self::Bound(con) => con.component_label(worst_row),
            Self::Norm(con) => con.component_label(),
        };
        (worst, format!("{label} @ knot {k}"))
    }
}

/// Augmented-Lagrangian parameters carried per attached constraint.
///
/// The core does not consume these; they ride along for the outer loop.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConstraintParams {
    /// Penalty growth factor.
    pub phi: f64,
    /// Initial penalty.
    pub mu_initial: f64,
    /// Penalty cap.
    pub mu_max: f64,
    /// Multiplier cap.
    pub lambda_max: f64,
    /// Active-set tolerance for inequalities.
    pub active_tol: f64,
}

impl Default for ConstraintParams {
    fn default() -> Self {
        Self {
            phi: 10.0,
            mu_initial: 1.0,
            mu_max: 1.0e8,
            lambda_max: 1.0e8,
            active_tol: 1.0e-3,
        }
    }
}

impl ConstraintParams {
    /// Set the penalty growth factor.
    #[must_use]
    pub fn phi(mut self, phi: f64) -> Self {
        self.phi = phi;
        self
    }

    /// Set the initial penalty.
    #[must_use]
    pub fn mu_initial(mut self, mu: f64) -> Self {
        self.mu_initial = mu;
        self
    }

    /// Set the penalty cap.
    #[must_use]
    pub fn mu_max(mut self, mu: f64) -> Self {
        self.mu_max = mu;
        self
    }

    /// Set the multiplier cap.
    #[must_use]
    pub fn lambda_max(mut self, lambda: f64) -> Self {
        self.lambda_max = lambda;
        self
    }

    /// Set the active-set tolerance.
    #[must_use]
    pub fn active_tol(mut self, tol: f64) -> Self {
        self.active_tol = tol;
        self
    }
}

/// A constraint attached to a knot range, with its outer-loop parameters and
/// preallocated evaluation scratch.
#[derive(Debug, Clone)]
pub struct AttachedConstraint {
    constraint: Constraint,
    params: ConstraintParams,
    knots: Range<usize>,
    c: DVector<f64>,
    cx: DMatrix<f64>,
    cu: DMatrix<f64>,
}

impl AttachedConstraint {
    /// The constraint itself.
    #[must_use]
    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }

    /// Outer-loop parameters.
    #[must_use]
    pub fn params(&self) -> &ConstraintParams {
        &self.params
    }

    /// Mutable outer-loop parameters (the AL loop updates penalties).
    pub fn params_mut(&mut self) -> &mut ConstraintParams {
        &mut self.params
    }

    /// Knot range this constraint applies to.
    #[must_use]
    pub fn knots(&self) -> Range<usize> {
        self.knots.clone()
    }

    /// The most recently evaluated residual.
    #[must_use]
    pub fn residual(&self) -> &DVector<f64> {
        &self.c
    }

    /// Evaluate at knot `k` into the owned scratch and return it.
    pub fn evaluate_at(
        &mut self,
        model: &dyn DiscreteDynamics,
        ir: Integrator,
        xs: &[DVector<f64>],
        us: &[DVector<f64>],
        ts: &[f64],
        k: usize,
    ) -> &DVector<f64> {
        self.constraint.evaluate(&mut self.c, model, ir, xs, us, ts, k);
        &self.c
    }

    /// Stage Jacobian at knot `k`.
    ///
    /// Constant Jacobians were filled at attach time and are returned
    /// directly; trajectory-dependent ones are recomputed into the scratch.
    ///
    /// # Errors
    ///
    /// `Unsupported` for coupled variants.
    pub fn jacobian_at(
        &mut self,
        xs: &[DVector<f64>],
        us: &[DVector<f64>],
        k: usize,
    ) -> Result<(&DMatrix<f64>, &DMatrix<f64>), TrajError> {
        if !self.constraint.const_jac() {
            self.constraint.jacobian(&mut self.cx, &mut self.cu, xs, us, k)?;
        }
        Ok((&self.cx, &self.cu))
    }

    /// Worst violation at knot `k` (evaluates first).
    pub fn max_violation_at(
        &mut self,
        model: &dyn DiscreteDynamics,
        ir: Integrator,
        xs: &[DVector<f64>],
        us: &[DVector<f64>],
        ts: &[f64],
        k: usize,
    ) -> (f64, String) {
        self.constraint.evaluate(&mut self.c, model, ir, xs, us, ts, k);
        self.constraint.max_violation_info(&self.c, k)
    }

    /// Scatter into the direct solver's global Jacobian at knot `k`.
    ///
    /// # Errors
    ///
    /// Propagates [`Constraint::jacobian_copy`] errors.
    #[allow(clippy::too_many_arguments)]
    pub fn scatter_at(
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
    ) -> Result<(), TrajError> {
        self.constraint
            .jacobian_copy(d, model, ir, xs, us, ts, k, c_row, x_cols, u_cols)
    }
}

/// Ordered collection of constraints attached to a problem.
#[derive(Debug, Clone)]
pub struct ConstraintSet {
    n: usize,
    m: usize,
    num_knots: usize,
    members: Vec<AttachedConstraint>,
}

impl ConstraintSet {
    /// An empty set for a problem with dimensions `(n, m)` and `num_knots`
    /// knot points.
    #[must_use]
    pub fn new(n: usize, m: usize, num_knots: usize) -> Self {
        Self {
            n,
            m,
            num_knots,
            members: Vec::new(),
        }
    }

    /// Attach a constraint over a knot range.
    ///
    /// Allocates the member's evaluation scratch once and fills constant
    /// Jacobians immediately.
    ///
    /// # Errors
    ///
    /// Rejects dimension mismatches, empty or out-of-range knot ranges, a
    /// coupled constraint starting at knot 0, and a control-reading stage
    /// constraint attached at the terminal knot.
    pub fn attach(
        &mut self,
        constraint: Constraint,
        knots: Range<usize>,
        params: ConstraintParams,
    ) -> Result<(), TrajError> {
        constraint.check_dims(self.n, self.m)?;
        if knots.start >= knots.end || knots.end > self.num_knots {
            return Err(TrajError::invalid_config(format!(
                "knot range {}..{} invalid for {} knot points",
                knots.start, knots.end, self.num_knots
            )));
        }
        if constraint.coupled_expansion() && knots.start == 0 {
            return Err(TrajError::invalid_config(
                "coupled constraint cannot start at the first knot".to_string(),
            ));
        }
        if !constraint.coupled_expansion()
            && constraint.control_expansion()
            && knots.end > self.num_knots - 1
        {
            return Err(TrajError::invalid_config(
                "control-reading constraint attached at the terminal knot".to_string(),
            ));
        }

        let p = constraint.len();
        let mut member = AttachedConstraint {
            c: DVector::zeros(p),
            cx: DMatrix::zeros(p, self.n),
            cu: DMatrix::zeros(p, self.m),
            constraint,
            params,
            knots,
        };
        if member.constraint.const_jac() && p > 0 {
            member
                .constraint
                .init_jacobian(&mut member.cx, &mut member.cu)?;
        }
        self.members.push(member);
        Ok(())
    }

    /// Number of attached constraints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Iterate over attached constraints.
    pub fn iter(&self) -> impl Iterator<Item = &AttachedConstraint> {
        self.members.iter()
    }

    /// Iterate mutably (evaluation requires the member's scratch).
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut AttachedConstraint> {
        self.members.iter_mut()
    }

    /// Worst violation across every member and every knot it applies to.
    ///
    /// Returns `(0.0, None)` for an empty set.
    pub fn max_violation(
        &mut self,
        model: &dyn DiscreteDynamics,
        ir: Integrator,
        xs: &[DVector<f64>],
        us: &[DVector<f64>],
        ts: &[f64],
    ) -> (f64, Option<String>) {
        let mut worst = 0.0;
        let mut label = None;
        for member in &mut self.members {
            for k in member.knots.clone() {
                let (v, l) = member.max_violation_at(model, ir, xs, us, ts, k);
                if v > worst {
                    worst = v;
                    label = Some(l);
                }
            }
        }
        (worst, label)
    }
}

fn expect_dim(what: &str, expected: usize, actual: usize) -> Result<(), TrajError> {
    if expected == actual {
        Ok(())
    } else {
        Err(TrajError::dims(what, expected, actual))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::models::DoubleIntegrator;
    use approx::assert_relative_eq;

    fn goal() -> Constraint {
        Constraint::Goal(GoalConstraint::new(DVector::zeros(2), vec![0, 1]).unwrap())
    }

    #[test]
    fn test_descriptors() {
        let g = goal();
        assert_eq!(g.sense(), ConstraintSense::Equality);
        assert!(g.const_jac());
        assert!(g.state_expansion());
        assert!(!g.control_expansion());
        assert!(!g.coupled_expansion());
        assert!(g.direct());

        let d = Constraint::Dynamics(DynamicsConstraint::new(2, 1));
        assert!(d.coupled_expansion());
        assert!(!d.const_jac());

        let b = Constraint::Bound(
            BoundConstraint::on_controls(2, &[-1.0], &[1.0]).unwrap(),
        );
        assert_eq!(b.sense(), ConstraintSense::Inequality);
        assert!(!b.state_expansion());
        assert!(b.control_expansion());
    }

    #[test]
    fn test_stage_jacobian_unsupported_for_coupled() {
        let con = Constraint::Dynamics(DynamicsConstraint::new(2, 1));
        let mut cx = DMatrix::zeros(2, 2);
        let mut cu = DMatrix::zeros(2, 1);
        let err = con.jacobian(&mut cx, &mut cu, &[], &[], 1).unwrap_err();
        assert!(err.is_unsupported());
        assert!(con.init_jacobian(&mut cx, &mut cu).unwrap_err().is_unsupported());
    }

    #[test]
    fn test_attach_validation() {
        let mut set = ConstraintSet::new(2, 1, 11);
        // coupled at knot 0 rejected
        let err = set
            .attach(
                Constraint::Dynamics(DynamicsConstraint::new(2, 1)),
                0..11,
                ConstraintParams::default(),
            )
            .unwrap_err();
        assert!(matches!(err, TrajError::InvalidConfig { .. }));
        set.attach(
            Constraint::Dynamics(DynamicsConstraint::new(2, 1)),
            1..11,
            ConstraintParams::default(),
        )
        .unwrap();

        // control bound cannot cover the terminal knot
        let bound = Constraint::Bound(BoundConstraint::on_controls(2, &[-1.0], &[1.0]).unwrap());
        assert!(set
            .attach(bound.clone(), 0..11, ConstraintParams::default())
            .is_err());
        set.attach(bound, 0..10, ConstraintParams::default()).unwrap();

        // wrong dims rejected
        let wide_goal = Constraint::Goal(GoalConstraint::pin_all(DVector::zeros(3)));
        assert!(set.attach(wide_goal, 10..11, ConstraintParams::default()).is_err());

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_set_max_violation() {
        let model = DoubleIntegrator::new(1);
        let mut set = ConstraintSet::new(2, 1, 3);
        set.attach(goal(), 2..3, ConstraintParams::default())
            .unwrap();
        set.attach(
            Constraint::Bound(BoundConstraint::on_controls(2, &[-1.0], &[1.0]).unwrap()),
            0..2,
            ConstraintParams::default(),
        )
        .unwrap();

        let ts = vec![0.0, 0.1, 0.2];
        let xs = vec![
            DVector::zeros(2),
            DVector::zeros(2),
            DVector::from_vec(vec![0.3, -0.1]),
        ];
        let us = vec![
            DVector::from_vec(vec![1.5]),
            DVector::from_vec(vec![0.0]),
        ];

        let (worst, label) =
            set.max_violation(&model, Integrator::RungeKutta4, &xs, &us, &ts);
        // goal violation 0.3 vs control bound violation 0.5
        assert_relative_eq!(worst, 0.5);
        let label = label.unwrap();
        assert!(label.contains("u_max[0]"), "got label {label}");
        assert!(label.contains("knot 0"), "got label {label}");
    }

    #[test]
    fn test_satisfied_inequality_scores_zero() {
        let con = Constraint::Bound(BoundConstraint::on_controls(1, &[-1.0], &[1.0]).unwrap());
        let c = DVector::from_vec(vec![-0.2, -1.8]);
        let (v, _) = con.max_violation_info(&c, 4);
        assert_relative_eq!(v, 0.0);
    }
}

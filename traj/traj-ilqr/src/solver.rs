//! Solver state: the single owner of every buffer.
//!
//! [`IlqrSolver`] allocates all trajectories, per-knot matrix arrays, and
//! scratch workspaces once at construction. The backward pass and the
//! rollout mutate these buffers in place through borrowed references and
//! never allocate. The live trajectory `(xs, us)` and the scratch trajectory
//! `(xs_tmp, us_tmp)` never alias; acceptance swaps them wholesale.

use nalgebra::{DMatrix, DVector};
use traj_types::{IlqrConfig, SolveStatus, TrajError};

use crate::backward;
use crate::cost::CostExpansion;
use crate::problem::Problem;
use crate::regularization::Regularization;
use crate::rollout;

/// Per-knot cost-to-go diagnostics, persisted when `save_ctg` is enabled.
#[derive(Debug, Clone)]
pub struct SavedCostToGo {
    /// Cost-to-go Hessian `P_k` per knot (length N).
    pub hess: Vec<DMatrix<f64>>,
    /// Cost-to-go gradient `p_k` per knot (length N).
    pub grad: Vec<DVector<f64>>,
    /// Per-knot expected reduction contributions
    /// `(d_k . Qu_k, 0.5 d_k . Quu_k d_k)` (length N-1).
    pub dv: Vec<[f64; 2]>,
}

/// Iterative-LQR solver state.
///
/// Buffer fields are public for diagnostics and tests, matching the
/// convention that the state struct is an open record; resizing any of them
/// breaks the solver's shape invariants.
#[derive(Debug)]
pub struct IlqrSolver {
    pub(crate) problem: Problem,
    pub(crate) cfg: IlqrConfig,
    pub(crate) reg: Regularization,
    pub(crate) status: SolveStatus,

    /// Live state trajectory (length N).
    pub xs: Vec<DVector<f64>>,
    /// Live control trajectory (length N-1).
    pub us: Vec<DVector<f64>>,
    /// Scratch state trajectory for line-search rollouts (length N).
    pub xs_tmp: Vec<DVector<f64>>,
    /// Scratch control trajectory (length N-1).
    pub us_tmp: Vec<DVector<f64>>,

    /// Dynamics Jacobians `A_k` (n x n, length N-1).
    pub a_jac: Vec<DMatrix<f64>>,
    /// Dynamics Jacobians `B_k` (n x m, length N-1).
    pub b_jac: Vec<DMatrix<f64>>,

    /// Feedback gains `K_k` (m x n, length N-1).
    pub k_fb: Vec<DMatrix<f64>>,
    /// Feedforward terms `d_k` (m, length N-1).
    pub d_ff: Vec<DVector<f64>>,

    /// Cost expansions per knot (length N; the last holds the terminal
    /// expansion, of which only `qxx`/`qx` are meaningful).
    pub cost_exp: Vec<CostExpansion>,

    /// Action-value state Hessians `Qxx_k` (length N-1).
    pub qxx: Vec<DMatrix<f64>>,
    /// Action-value control Hessians `Quu_k` (length N-1).
    pub quu: Vec<DMatrix<f64>>,
    /// Action-value cross terms `Qux_k` (m x n, length N-1).
    pub qux: Vec<DMatrix<f64>>,
    /// Action-value state gradients `Qx_k` (length N-1).
    pub qx: Vec<DVector<f64>>,
    /// Action-value control gradients `Qu_k` (length N-1).
    pub qu: Vec<DVector<f64>>,
    /// Regularized `Quu_k` (length N-1). The Cholesky factor is taken of an
    /// owned copy, so this buffer always holds the unfactored matrix.
    pub quu_reg: Vec<DMatrix<f64>>,
    /// Regularized `Qux_k` (length N-1).
    pub qux_reg: Vec<DMatrix<f64>>,

    /// Cost-to-go Hessian accumulator `P` (kept symmetric).
    pub ctg_hess: DMatrix<f64>,
    /// Cost-to-go gradient accumulator `p`.
    pub ctg_grad: DVector<f64>,
    /// Expected cost reduction split into first/second-order parts:
    /// `dv[0] = sum d.Qu`, `dv[1] = 0.5 sum d.Quu.d`.
    pub dv: [f64; 2],

    /// Persisted per-knot cost-to-go, when `save_ctg` is set.
    pub saved: Option<SavedCostToGo>,

    // Hot-loop scratch: P*A (n x n), P*B (n x m), Quu*d (m), Quu*K (m x n),
    // and the rollout state difference (n).
    pub(crate) pa_tmp: DMatrix<f64>,
    pub(crate) pb_tmp: DMatrix<f64>,
    pub(crate) quu_d_tmp: DVector<f64>,
    pub(crate) quu_k_tmp: DMatrix<f64>,
    pub(crate) dx_tmp: DVector<f64>,
}

impl IlqrSolver {
    /// Allocate a solver for `problem`.
    ///
    /// Every buffer is sized here, once; `xs[0]` is seeded from the
    /// problem's initial state and the controls start at zero.
    ///
    /// # Errors
    ///
    /// Rejects an invalid [`IlqrConfig`].
    pub fn new(problem: Problem, cfg: IlqrConfig) -> Result<Self, TrajError> {
        cfg.validate().map_err(TrajError::invalid_config)?;

        let n = problem.state_dim();
        let m = problem.control_dim();
        let num_knots = problem.num_knots();
        let stages = num_knots - 1;

        let mut xs = vec![DVector::zeros(n); num_knots];
        xs[0].copy_from(problem.initial_state());

        let saved = cfg.save_ctg.then(|| SavedCostToGo {
            hess: vec![DMatrix::zeros(n, n); num_knots],
            grad: vec![DVector::zeros(n); num_knots],
            dv: vec![[0.0, 0.0]; stages],
        });

        let reg = Regularization::new(&cfg);

        Ok(Self {
            xs,
            us: vec![DVector::zeros(m); stages],
            xs_tmp: vec![DVector::zeros(n); num_knots],
            us_tmp: vec![DVector::zeros(m); stages],
            a_jac: vec![DMatrix::zeros(n, n); stages],
            b_jac: vec![DMatrix::zeros(n, m); stages],
            k_fb: vec![DMatrix::zeros(m, n); stages],
            d_ff: vec![DVector::zeros(m); stages],
            cost_exp: vec![CostExpansion::zeros(n, m); num_knots],
            qxx: vec![DMatrix::zeros(n, n); stages],
            quu: vec![DMatrix::zeros(m, m); stages],
            qux: vec![DMatrix::zeros(m, n); stages],
            qx: vec![DVector::zeros(n); stages],
            qu: vec![DVector::zeros(m); stages],
            quu_reg: vec![DMatrix::zeros(m, m); stages],
            qux_reg: vec![DMatrix::zeros(m, n); stages],
            ctg_hess: DMatrix::zeros(n, n),
            ctg_grad: DVector::zeros(n),
            dv: [0.0, 0.0],
            saved,
            pa_tmp: DMatrix::zeros(n, n),
            pb_tmp: DMatrix::zeros(n, m),
            quu_d_tmp: DVector::zeros(m),
            quu_k_tmp: DMatrix::zeros(m, n),
            dx_tmp: DVector::zeros(n),
            problem,
            cfg,
            reg,
            status: SolveStatus::Unsolved,
        })
    }

    /// The problem definition.
    #[must_use]
    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    /// The problem definition, mutably (e.g. for constraint parameter
    /// updates by the outer loop).
    pub fn problem_mut(&mut self) -> &mut Problem {
        &mut self.problem
    }

    /// The solver configuration.
    #[must_use]
    pub fn config(&self) -> &IlqrConfig {
        &self.cfg
    }

    /// Current solve status.
    #[must_use]
    pub fn status(&self) -> SolveStatus {
        self.status
    }

    /// Set the solve status (the outer loop marks acceptance/convergence).
    pub fn set_status(&mut self, status: SolveStatus) {
        self.status = status;
    }

    /// Current regularization value.
    #[must_use]
    pub fn rho(&self) -> f64 {
        self.reg.rho()
    }

    /// The regularization controller (value and adaptive rate).
    #[must_use]
    pub fn regularization(&self) -> &Regularization {
        &self.reg
    }

    /// Total cost of the live trajectory `(xs, us)`.
    #[must_use]
    pub fn cost(&self) -> f64 {
        let objective = self.problem.objective();
        let stages = self.us.len();
        let mut j = 0.0;
        for k in 0..stages {
            j += objective.stage_cost(&self.xs[k], &self.us[k], k);
        }
        j + objective.terminal_cost(&self.xs[stages])
    }

    /// Expected cost reduction for a step of size `alpha`:
    /// `alpha * dv[0] + alpha^2 * dv[1]`.
    #[must_use]
    pub fn expected_reduction(&self, alpha: f64) -> f64 {
        alpha * self.dv[0] + alpha * alpha * self.dv[1]
    }

    /// Overwrite the control trajectory (e.g. a warm start).
    ///
    /// # Errors
    ///
    /// Rejects a wrong number of controls or a mis-sized control vector.
    pub fn set_controls(&mut self, us: &[DVector<f64>]) -> Result<(), TrajError> {
        if us.len() != self.us.len() {
            return Err(TrajError::dims("control trajectory", self.us.len(), us.len()));
        }
        let m = self.problem.control_dim();
        for (k, u) in us.iter().enumerate() {
            if u.len() != m {
                return Err(TrajError::dims(format!("control at knot {k}"), m, u.len()));
            }
        }
        for (dst, src) in self.us.iter_mut().zip(us) {
            dst.copy_from(src);
        }
        Ok(())
    }

    /// Swap the accepted candidate trajectory `(xs_tmp, us_tmp)` into place.
    ///
    /// Constant time: the buffers exchange roles, no copying.
    pub fn accept_rollout(&mut self) {
        std::mem::swap(&mut self.xs, &mut self.xs_tmp);
        std::mem::swap(&mut self.us, &mut self.us_tmp);
    }

    /// Run the backward pass. See [`backward::backward_pass`].
    ///
    /// # Errors
    ///
    /// `RegularizationMax` when regularization is exhausted.
    pub fn backward_pass(&mut self) -> Result<[f64; 2], TrajError> {
        backward::backward_pass(self)
    }

    /// Simulate the feedback law at step size `alpha`. See
    /// [`rollout::rollout`].
    pub fn rollout(&mut self, alpha: f64) -> (f64, bool) {
        rollout::rollout(self, alpha)
    }
}

//! Cost oracle and quadratic expansion records.
//!
//! The backward pass consumes second-order models of the running cost through
//! the [`Objective`] trait. Expansions are written into a caller-owned
//! [`CostExpansion`] record; the oracle never allocates.

use nalgebra::{DMatrix, DVector};
use traj_types::TrajError;

/// Per-knot quadratic model of the running cost.
///
/// At stage knots all five fields are meaningful; at the terminal knot only
/// `qxx` and `qx` are read. The cross term `rux` is stored action-major
/// (m x n) so it adds directly into the `Qux` block of the action-value
/// expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct CostExpansion {
    /// State Hessian `d2l/dx2` (n x n).
    pub qxx: DMatrix<f64>,
    /// Control Hessian `d2l/du2` (m x m).
    pub ruu: DMatrix<f64>,
    /// Cross term `d2l/dudx` (m x n); zero for separable costs.
    pub rux: DMatrix<f64>,
    /// State gradient `dl/dx` (n).
    pub qx: DVector<f64>,
    /// Control gradient `dl/du` (m).
    pub ru: DVector<f64>,
}

impl CostExpansion {
    /// Allocate a zeroed expansion record for dimensions `(n, m)`.
    #[must_use]
    pub fn zeros(n: usize, m: usize) -> Self {
        Self {
            qxx: DMatrix::zeros(n, n),
            ruu: DMatrix::zeros(m, m),
            rux: DMatrix::zeros(m, n),
            qx: DVector::zeros(n),
            ru: DVector::zeros(m),
        }
    }

    /// Reset every field to zero.
    pub fn set_zero(&mut self) {
        self.qxx.fill(0.0);
        self.ruu.fill(0.0);
        self.rux.fill(0.0);
        self.qx.fill(0.0);
        self.ru.fill(0.0);
    }
}

/// Cost oracle: stage/terminal cost values and their quadratic expansions.
pub trait Objective {
    /// State dimension the objective was built for.
    fn state_dim(&self) -> usize;

    /// Control dimension the objective was built for.
    fn control_dim(&self) -> usize;

    /// Running cost at stage knot `k`.
    fn stage_cost(&self, x: &DVector<f64>, u: &DVector<f64>, k: usize) -> f64;

    /// Terminal cost.
    fn terminal_cost(&self, x: &DVector<f64>) -> f64;

    /// Write the quadratic expansion of the stage cost at knot `k` into `e`.
    fn stage_expansion(&self, e: &mut CostExpansion, x: &DVector<f64>, u: &DVector<f64>, k: usize);

    /// Write the quadratic expansion of the terminal cost into `e`
    /// (only `e.qxx` and `e.qx` need be set).
    fn terminal_expansion(&self, e: &mut CostExpansion, x: &DVector<f64>);
}

/// Time-invariant quadratic tracking objective.
///
/// Stage cost `0.5 (x - x_ref)' Q (x - x_ref) + 0.5 (u - u_ref)' R (u - u_ref)`
/// and terminal cost `0.5 (x - x_ref)' Qf (x - x_ref)`.
#[derive(Debug, Clone)]
pub struct QuadraticCost {
    q: DMatrix<f64>,
    r: DMatrix<f64>,
    qf: DMatrix<f64>,
    x_ref: DVector<f64>,
    u_ref: DVector<f64>,
}

impl QuadraticCost {
    /// Build a tracking objective.
    ///
    /// # Errors
    ///
    /// Rejects non-square or mis-sized weight matrices, reference vectors
    /// that disagree with the weights, and weights that are not symmetric.
    pub fn new(
        q: DMatrix<f64>,
        r: DMatrix<f64>,
        qf: DMatrix<f64>,
        x_ref: DVector<f64>,
        u_ref: DVector<f64>,
    ) -> Result<Self, TrajError> {
        let n = x_ref.len();
        let m = u_ref.len();
        check_weight("Q", &q, n)?;
        check_weight("R", &r, m)?;
        check_weight("Qf", &qf, n)?;
        Ok(Self {
            q,
            r,
            qf,
            x_ref,
            u_ref,
        })
    }

    /// Build a regulator objective (zero references).
    ///
    /// # Errors
    ///
    /// Same validation as [`QuadraticCost::new`].
    pub fn regulator(
        q: DMatrix<f64>,
        r: DMatrix<f64>,
        qf: DMatrix<f64>,
    ) -> Result<Self, TrajError> {
        let n = q.nrows();
        let m = r.nrows();
        Self::new(q, r, qf, DVector::zeros(n), DVector::zeros(m))
    }
}

/// `(v - v_ref)' W (v - v_ref)` without temporaries.
fn quadratic_form(w: &DMatrix<f64>, v: &DVector<f64>, v_ref: &DVector<f64>) -> f64 {
    let dim = v.len();
    let mut acc = 0.0;
    for i in 0..dim {
        let di = v[i] - v_ref[i];
        for j in 0..dim {
            acc += di * w[(i, j)] * (v[j] - v_ref[j]);
        }
    }
    acc
}

fn check_weight(name: &str, w: &DMatrix<f64>, dim: usize) -> Result<(), TrajError> {
    if w.nrows() != dim || w.ncols() != dim {
        return Err(TrajError::dims(name, dim, w.nrows().max(w.ncols())));
    }
    for i in 0..dim {
        for j in (i + 1)..dim {
            if (w[(i, j)] - w[(j, i)]).abs() > 1e-10 * w[(i, j)].abs().max(1.0) {
                return Err(TrajError::invalid_config(format!(
                    "{name} is not symmetric at ({i}, {j})"
                )));
            }
        }
    }
    Ok(())
}

impl Objective for QuadraticCost {
    fn state_dim(&self) -> usize {
        self.x_ref.len()
    }

    fn control_dim(&self) -> usize {
        self.u_ref.len()
    }

    fn stage_cost(&self, x: &DVector<f64>, u: &DVector<f64>, _k: usize) -> f64 {
        0.5 * quadratic_form(&self.q, x, &self.x_ref) + 0.5 * quadratic_form(&self.r, u, &self.u_ref)
    }

    fn terminal_cost(&self, x: &DVector<f64>) -> f64 {
        0.5 * quadratic_form(&self.qf, x, &self.x_ref)
    }

    fn stage_expansion(
        &self,
        e: &mut CostExpansion,
        x: &DVector<f64>,
        u: &DVector<f64>,
        _k: usize,
    ) {
        e.qxx.copy_from(&self.q);
        e.ruu.copy_from(&self.r);
        e.rux.fill(0.0);
        // qx = Q (x - x_ref), without a temporary
        e.qx.gemv(1.0, &self.q, x, 0.0);
        e.qx.gemv(-1.0, &self.q, &self.x_ref, 1.0);
        e.ru.gemv(1.0, &self.r, u, 0.0);
        e.ru.gemv(-1.0, &self.r, &self.u_ref, 1.0);
    }

    fn terminal_expansion(&self, e: &mut CostExpansion, x: &DVector<f64>) {
        e.qxx.copy_from(&self.qf);
        e.qx.gemv(1.0, &self.qf, x, 0.0);
        e.qx.gemv(-1.0, &self.qf, &self.x_ref, 1.0);
    }
}
